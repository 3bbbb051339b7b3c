use crate::{
    app_state::AppState,
    domain::LetterSlug,
    idempotency::try_claim_event,
    payment_processing::{apply_payment_to_letter, record_payment_status},
    signature::{PixSignature, SignatureError},
};
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Deserializer};
use sqlx::Row;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/pix", post(handle_webhook))
}

/// Raw-body receiver for the PIX provider. The notification only names the
/// payment; the authoritative status is fetched back from the provider, as
/// the notification body is not trusted beyond its signature.
#[tracing::instrument(name = "Handle a PIX webhook", skip(app_state, headers, body))]
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookRejection> {
    let signature = headers
        .get("X-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookRejection::MissingSignature)?;
    let request_id = headers
        .get("X-Request-Id")
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookRejection::MissingRequestId)?;

    let notification: PixNotification = serde_json::from_slice(&body)
        .map_err(|e| WebhookRejection::MalformedPayload(e.to_string()))?;

    PixSignature::verify(
        &app_state.pix_webhook_secret,
        signature,
        &notification.data.id,
        request_id,
    )?;

    if notification.notification_type != "payment" {
        tracing::info!(
            "Ignoring notification of type `{}`",
            notification.notification_type
        );
        return Ok(StatusCode::OK);
    }

    if let Err(e) = process_payment_notification(&app_state, &notification.data.id).await {
        tracing::error!(
            error_cause_chain = ?e,
            error.message = %e,
            "Failed to process a PIX webhook. Acknowledging anyway."
        );
    }

    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(app_state))]
async fn process_payment_notification(
    app_state: &AppState,
    payment_id: &str,
) -> Result<(), anyhow::Error> {
    let lookup = app_state
        .pix_client
        .get_payment(payment_id)
        .await
        .context("Failed to fetch the payment from the provider")?;

    let stored_slug: Option<String> =
        sqlx::query(r#"SELECT letter_slug FROM payments WHERE id = $1"#)
            .bind(payment_id)
            .fetch_optional(&app_state.db_pool)
            .await
            .context("Failed to fetch the stored payment")?
            .map(|row| row.try_get("letter_slug"))
            .transpose()
            .context("Failed to decode the stored payment")?
            .flatten();

    let slug = stored_slug
        .or(lookup.external_reference.clone())
        .map(LetterSlug::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Payment carries an invalid letter slug")?;

    let mut transaction = app_state
        .db_pool
        .begin()
        .await
        .context("Failed to begin transaction")?;

    // one claim per status transition; a redelivered notification for the
    // same transition is a retry
    let event_id = format!("{payment_id}:{}", lookup.status.as_ref());
    if !try_claim_event(&mut transaction, "pix", &event_id)
        .await
        .context("Failed to claim the event")?
    {
        tracing::info!("Notification `{event_id}` was already processed");
        return Ok(());
    }

    if !record_payment_status(
        &mut transaction,
        payment_id,
        lookup.status,
        lookup.status_detail.as_deref(),
    )
    .await?
    {
        tracing::warn!("Notification for unknown payment `{payment_id}`");
    }

    if let Some(slug) = &slug {
        apply_payment_to_letter(&mut transaction, slug, lookup.status).await?;
    }

    transaction
        .commit()
        .await
        .context("Failed to commit transaction")?;

    Ok(())
}

#[derive(Deserialize)]
struct PixNotification {
    #[serde(rename = "type")]
    notification_type: String,
    data: NotificationData,
}

#[derive(Deserialize)]
struct NotificationData {
    #[serde(deserialize_with = "deserialize_payment_id")]
    id: String,
}

/// The provider sends the payment id as a JSON number in some notification
/// variants and as a string in others.
fn deserialize_payment_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "payment id must be a string or number, got {other}"
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
enum WebhookRejection {
    #[error("Missing signature header")]
    MissingSignature,
    #[error("Missing request id header")]
    MissingRequestId,
    #[error(transparent)]
    InvalidSignature(#[from] SignatureError),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::MissingSignature | Self::MissingRequestId | Self::MalformedPayload(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            Self::InvalidSignature(SignatureError::Malformed(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            Self::InvalidSignature(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
        }
    }
}
