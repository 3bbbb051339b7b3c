use crate::helpers::{photo_part, valid_upload_form, TestApp};
use reqwest::multipart;
use sqlx::Row;

#[tokio::test]
async fn a_valid_upload_is_staged() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = app.post_upload(valid_upload_form("premium")).await;

    // then
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    let upload_id = body["upload_id"].as_str().expect("No upload id");
    assert!(body["expires_at"].is_string());

    let saved = sqlx::query("SELECT status, photo_files, audio_file, plan FROM staged_uploads")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch the staged upload");
    assert_eq!(saved.get::<String, _>("status"), "staged");
    assert_eq!(saved.get::<Vec<String>, _>("photo_files").len(), 2);
    assert!(saved.get::<Option<String>, _>("audio_file").is_some());
    assert_eq!(saved.get::<String, _>("plan"), "premium");

    let staged_dir = app.media_root.path().join("staged").join(upload_id);
    assert!(staged_dir.exists());
    assert_eq!(std::fs::read_dir(staged_dir).unwrap().count(), 3);
}

#[tokio::test]
async fn an_upload_with_a_missing_required_field_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let test_cases = vec![
        ("couple_names", "missing the couple names"),
        ("message", "missing the message"),
        ("plan", "missing the plan"),
        ("payer_email", "missing the payer email"),
        ("payer_name", "missing the payer name"),
        ("relationship_started_at", "missing the relationship start"),
    ];

    for (omitted, description) in test_cases {
        // when
        let response = app.post_upload(form_without(omitted)).await;

        // then
        assert_eq!(
            response.status(),
            400,
            "The API did not return a 400 when the payload was {description}"
        );
    }

    let saved = sqlx::query("SELECT id FROM staged_uploads")
        .fetch_optional(&app.db_pool)
        .await
        .expect("Failed to query staged uploads");
    assert!(saved.is_none());
}

#[tokio::test]
async fn an_upload_without_photos_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let form = text_fields("basic");

    // when
    let response = app.post_upload(form).await;

    // then
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn the_basic_plan_caps_photos_at_three() {
    // given
    let app = TestApp::spawn().await;
    let mut form = text_fields("basic");
    for i in 0..4 {
        form = form.part("photo", photo_part(&format!("foto-{i}.jpg")));
    }

    // when
    let response = app.post_upload(form).await;

    // then
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn a_music_link_on_the_basic_plan_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let form = text_fields("basic")
        .part("photo", photo_part("foto.jpg"))
        .text("music_link", "https://open.spotify.com/track/abc");

    // when
    let response = app.post_upload(form).await;

    // then
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn a_photo_with_a_non_image_content_type_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let form = text_fields("basic").part(
        "photo",
        multipart::Part::bytes(b"#!/bin/sh".to_vec())
            .file_name("foto.jpg")
            .mime_str("text/plain")
            .unwrap(),
    );

    // when
    let response = app.post_upload(form).await;

    // then
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn a_relationship_start_in_the_future_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let form = text_fields_with_start("basic", "2107-02-14T20:30:00Z")
        .part("photo", photo_part("foto.jpg"));

    // when
    let response = app.post_upload(form).await;

    // then
    assert_eq!(response.status(), 400);
}

fn text_fields(plan: &str) -> multipart::Form {
    text_fields_with_start(plan, "2019-02-14T20:30:00Z")
}

fn text_fields_with_start(plan: &str, started_at: &str) -> multipart::Form {
    multipart::Form::new()
        .text("couple_names", "Ana & João")
        .text("relationship_started_at", started_at.to_string())
        .text("message", "Te amo desde o primeiro dia.")
        .text("plan", plan.to_string())
        .text("payer_email", "ana.silva@example.com")
        .text("payer_name", "Ana Silva")
}

fn form_without(omitted: &str) -> multipart::Form {
    let fields = [
        ("couple_names", "Ana & João"),
        ("relationship_started_at", "2019-02-14T20:30:00Z"),
        ("message", "Te amo desde o primeiro dia."),
        ("plan", "basic"),
        ("payer_email", "ana.silva@example.com"),
        ("payer_name", "Ana Silva"),
    ];

    let mut form = multipart::Form::new().part("photo", photo_part("foto.jpg"));
    for (name, value) in fields {
        if name != omitted {
            form = form.text(name, value);
        }
    }

    form
}
