use crate::helpers::TestApp;
use loveyuu::{
    email_delivery_worker::{try_execute_task, ExecutionOutcome},
    media_store::MediaStore,
    upload_expiry_worker::sweep_expired_uploads,
};
use sqlx::Row;
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

async fn enqueue_email(app: &TestApp, recipient: &str, slug: &str) {
    sqlx::query(
        r#"
        INSERT INTO email_outbox (id, recipient, recipient_name, letter_slug, created_at)
        VALUES ($1, $2, 'Ana', $3, now())
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(recipient)
    .bind(slug)
    .execute(&app.db_pool)
    .await
    .expect("Failed to enqueue the email");
}

#[tokio::test]
async fn the_delivery_worker_sends_queued_emails() {
    // given
    let app = TestApp::spawn().await;
    enqueue_email(&app, "ana.silva@example.com", "aB3dE5fG7h").await;

    Mock::given(path("/emails"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let email_client = app.settings.email_client.client();
    let base_url = &app.settings.application.base_url;

    // when
    let outcome = try_execute_task(&app.db_pool, &email_client, base_url)
        .await
        .expect("Failed to execute the delivery task");

    // then
    assert!(matches!(outcome, ExecutionOutcome::TaskCompleted));

    let requests = app
        .email_server
        .received_requests()
        .await
        .expect("Failed to read received requests");
    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("Failed to parse the email request");
    assert_eq!(body["to"].as_str(), Some("ana.silva@example.com"));

    let links: Vec<_> = linkify::LinkFinder::new()
        .links(body["html"].as_str().unwrap())
        .collect();
    assert_eq!(links.len(), 1);
    assert_eq!(
        links[0].as_str(),
        format!("{base_url}/love/aB3dE5fG7h")
    );

    let queued = sqlx::query("SELECT id FROM email_outbox")
        .fetch_all(&app.db_pool)
        .await
        .expect("Failed to query the outbox");
    assert!(queued.is_empty());
}

#[tokio::test]
async fn the_delivery_worker_reports_an_empty_queue() {
    // given
    let app = TestApp::spawn().await;
    let email_client = app.settings.email_client.client();

    // when
    let outcome = try_execute_task(&app.db_pool, &email_client, &app.settings.application.base_url)
        .await
        .expect("Failed to execute the delivery task");

    // then
    assert!(matches!(outcome, ExecutionOutcome::EmptyQueue));
}

#[tokio::test]
async fn a_failed_delivery_consumes_the_task() {
    // given
    let app = TestApp::spawn().await;
    enqueue_email(&app, "ana.silva@example.com", "aB3dE5fG7h").await;

    Mock::given(path("/emails"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let email_client = app.settings.email_client.client();

    // when
    let outcome = try_execute_task(&app.db_pool, &email_client, &app.settings.application.base_url)
        .await
        .expect("Failed to execute the delivery task");

    // then
    assert!(matches!(outcome, ExecutionOutcome::TaskCompleted));
    let queued = sqlx::query("SELECT id FROM email_outbox")
        .fetch_all(&app.db_pool)
        .await
        .expect("Failed to query the outbox");
    assert!(queued.is_empty());
}

#[tokio::test]
async fn the_expiry_sweeper_discards_overdue_uploads() {
    // given
    let app = TestApp::spawn().await;
    let upload_id = app.stage_upload("premium").await;
    sqlx::query("UPDATE staged_uploads SET expires_at = now() - interval '1 hour' WHERE id = $1")
        .bind(upload_id)
        .execute(&app.db_pool)
        .await
        .expect("Failed to back-date the upload");

    let media_store = MediaStore::new(app.media_root.path().to_path_buf());

    // when
    let swept = sweep_expired_uploads(&app.db_pool, &media_store)
        .await
        .expect("Failed to sweep");

    // then
    assert_eq!(swept, 1);
    let upload = sqlx::query("SELECT status FROM staged_uploads WHERE id = $1")
        .bind(upload_id)
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch the upload");
    assert_eq!(upload.get::<String, _>("status"), "expired");
    let staged_dir = app
        .media_root
        .path()
        .join("staged")
        .join(upload_id.to_string());
    assert!(!staged_dir.exists());
}

#[tokio::test]
async fn the_expiry_sweeper_leaves_fresh_uploads_alone() {
    // given
    let app = TestApp::spawn().await;
    let upload_id = app.stage_upload("premium").await;
    let media_store = MediaStore::new(app.media_root.path().to_path_buf());

    // when
    let swept = sweep_expired_uploads(&app.db_pool, &media_store)
        .await
        .expect("Failed to sweep");

    // then
    assert_eq!(swept, 0);
    let upload = sqlx::query("SELECT status FROM staged_uploads WHERE id = $1")
        .bind(upload_id)
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch the upload");
    assert_eq!(upload.get::<String, _>("status"), "staged");
}

#[tokio::test]
async fn an_expired_upload_cannot_be_promoted() {
    // given
    let app = TestApp::spawn().await;
    let upload_id = app.stage_upload("premium").await;
    sqlx::query("UPDATE staged_uploads SET expires_at = now() - interval '1 hour' WHERE id = $1")
        .bind(upload_id)
        .execute(&app.db_pool)
        .await
        .expect("Failed to back-date the upload");

    // when
    let response = app
        .post_letter(serde_json::json!({ "upload_id": upload_id }))
        .await;

    // then
    assert_eq!(response.status(), 410);
}
