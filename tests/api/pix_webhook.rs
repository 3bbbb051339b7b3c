use crate::helpers::{pix_signature, TestApp};
use sqlx::Row;

fn payment_notification(payment_id: i64) -> Vec<u8> {
    serde_json::json!({
        "type": "payment",
        "data": { "id": payment_id }
    })
    .to_string()
    .into_bytes()
}

/// Creates a pending letter with a PIX payment against it and mounts the
/// provider status mock. Returns the letter slug.
async fn pix_flow(app: &TestApp, payment_id: i64, provider_status: &str) -> String {
    let slug = app.create_pending_letter().await;
    app.mock_pix_payment_creation(payment_id).await;
    let response = app.post_pix_payment(serde_json::json!({ "slug": slug })).await;
    assert_eq!(response.status(), 200, "Failed to create the test payment");
    app.mock_pix_payment_status(payment_id, provider_status, &slug)
        .await;
    slug
}

#[tokio::test]
async fn an_approved_payment_notification_marks_the_letter_paid() {
    // given
    let app = TestApp::spawn().await;
    let slug = pix_flow(&app, 123456789, "approved").await;
    let body = payment_notification(123456789);
    let signature = pix_signature(&app.pix_webhook_secret, "123456789", "req-1");

    // when
    let response = app.post_pix_webhook(&body, Some(&signature), "req-1").await;

    // then
    assert_eq!(response.status(), 200);

    let letter = sqlx::query("SELECT status, paid_at FROM letters WHERE slug = $1")
        .bind(&slug)
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch the letter");
    assert_eq!(letter.get::<String, _>("status"), "paid");
    assert!(letter
        .get::<Option<time::OffsetDateTime>, _>("paid_at")
        .is_some());

    let payment = sqlx::query("SELECT status, status_detail FROM payments WHERE id = $1")
        .bind("123456789")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch the payment");
    assert_eq!(payment.get::<String, _>("status"), "approved");

    let queued = sqlx::query("SELECT recipient FROM email_outbox")
        .fetch_all(&app.db_pool)
        .await
        .expect("Failed to query the outbox");
    assert_eq!(queued.len(), 1);
}

#[tokio::test]
async fn a_rejected_payment_notification_cancels_the_letter() {
    // given
    let app = TestApp::spawn().await;
    let slug = pix_flow(&app, 123456789, "rejected").await;
    let body = payment_notification(123456789);
    let signature = pix_signature(&app.pix_webhook_secret, "123456789", "req-1");

    // when
    let response = app.post_pix_webhook(&body, Some(&signature), "req-1").await;

    // then
    assert_eq!(response.status(), 200);
    let letter = sqlx::query("SELECT status FROM letters WHERE slug = $1")
        .bind(&slug)
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch the letter");
    assert_eq!(letter.get::<String, _>("status"), "cancelled");

    let queued = sqlx::query("SELECT id FROM email_outbox")
        .fetch_all(&app.db_pool)
        .await
        .expect("Failed to query the outbox");
    assert!(queued.is_empty());
}

#[tokio::test]
async fn a_notification_without_a_signature_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let body = payment_notification(123456789);

    // when
    let response = app.post_pix_webhook(&body, None, "req-1").await;

    // then
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn a_notification_with_a_forged_signature_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let slug = pix_flow(&app, 123456789, "approved").await;
    let body = payment_notification(123456789);
    let signature = pix_signature("not-the-secret", "123456789", "req-1");

    // when
    let response = app.post_pix_webhook(&body, Some(&signature), "req-1").await;

    // then
    assert_eq!(response.status(), 401);
    let letter = sqlx::query("SELECT status FROM letters WHERE slug = $1")
        .bind(&slug)
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch the letter");
    assert_eq!(letter.get::<String, _>("status"), "pending");
}

#[tokio::test]
async fn a_redelivered_notification_is_processed_once() {
    // given
    let app = TestApp::spawn().await;
    pix_flow(&app, 123456789, "approved").await;
    let body = payment_notification(123456789);
    let signature = pix_signature(&app.pix_webhook_secret, "123456789", "req-1");

    // when
    let first = app.post_pix_webhook(&body, Some(&signature), "req-1").await;
    let second = app.post_pix_webhook(&body, Some(&signature), "req-1").await;

    // then
    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);
    let queued = sqlx::query("SELECT id FROM email_outbox")
        .fetch_all(&app.db_pool)
        .await
        .expect("Failed to query the outbox");
    assert_eq!(queued.len(), 1);
}

#[tokio::test]
async fn non_payment_notifications_are_acknowledged_without_processing() {
    // given
    let app = TestApp::spawn().await;
    let body = serde_json::json!({
        "type": "plan",
        "data": { "id": "42" }
    })
    .to_string()
    .into_bytes();
    let signature = pix_signature(&app.pix_webhook_secret, "42", "req-1");

    // when
    let response = app.post_pix_webhook(&body, Some(&signature), "req-1").await;

    // then
    assert_eq!(response.status(), 200);
}
