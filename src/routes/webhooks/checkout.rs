use crate::{
    app_state::AppState,
    email_outbox::enqueue_confirmation_email,
    idempotency::try_claim_event,
    promotion::{promote_staged_upload, PromotionKind},
    signature::{CheckoutSignature, SignatureError},
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
use serde::Deserialize;
use sqlx::Executor;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/checkout", post(handle_webhook))
}

/// Raw-body receiver for the checkout provider. Unauthenticated deliveries
/// are rejected; once the signature checks out, internal failures are logged
/// and still acknowledged with 200 so the provider does not retry forever.
#[tracing::instrument(name = "Handle a checkout webhook", skip(app_state, headers, body))]
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookRejection> {
    let signature = headers
        .get("Checkout-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookRejection::MissingSignature)?;

    CheckoutSignature::verify(&app_state.checkout_webhook_secret, signature, &body)?;

    let event: CheckoutEvent = serde_json::from_slice(&body)
        .map_err(|e| WebhookRejection::MalformedPayload(e.to_string()))?;

    if event.event_type != "checkout.session.completed" {
        tracing::info!("Ignoring event of type `{}`", event.event_type);
        return Ok(StatusCode::OK);
    }

    if let Err(e) = process_completed_session(&app_state, &event).await {
        tracing::error!(
            error_cause_chain = ?e,
            error.message = %e,
            "Failed to process a checkout webhook. Acknowledging anyway."
        );
    }

    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(app_state, event), fields(event_id = %event.id))]
async fn process_completed_session(
    app_state: &AppState,
    event: &CheckoutEvent,
) -> Result<(), anyhow::Error> {
    let session = &event.data.object;
    let upload_id = session
        .metadata
        .upload_id
        .as_deref()
        .context("Session metadata carries no upload id")?;
    let upload_id = Uuid::parse_str(upload_id).context("Session upload id is not a uuid")?;

    let mut transaction = app_state
        .db_pool
        .begin()
        .await
        .context("Failed to begin transaction")?;

    if !try_claim_event(&mut transaction, "checkout", &event.id)
        .await
        .context("Failed to claim the event")?
    {
        tracing::info!("Event `{}` was already processed", event.id);
        return Ok(());
    }

    let letter = promote_staged_upload(
        &mut transaction,
        &app_state.media_store,
        &app_state.base_url,
        upload_id,
        PromotionKind::Paid {
            checkout_session_id: &session.id,
        },
    )
    .await
    .context("Failed to promote the staged upload")?;

    settle_payment(&mut transaction, &session.id, letter.slug.as_ref()).await?;
    enqueue_confirmation_email(
        &mut transaction,
        &letter.payer_email,
        letter.payer_name.first_name(),
        &letter.slug,
    )
    .await?;

    transaction
        .commit()
        .await
        .context("Failed to commit transaction")?;

    tracing::info!("Created letter `{}` for session `{}`", letter.slug, session.id);

    Ok(())
}

#[tracing::instrument(skip(transaction))]
async fn settle_payment(
    transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_id: &str,
    slug: &str,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        UPDATE payments SET status = 'approved', letter_slug = $1, updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(slug)
    .bind(session_id);

    let result = transaction
        .execute(query)
        .await
        .context("Failed to settle the payment")?;

    if result.rows_affected() == 0 {
        tracing::warn!("No stored payment for session `{session_id}`");
    }

    Ok(())
}

#[derive(Deserialize)]
struct CheckoutEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: SessionObject,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    metadata: SessionMetadata,
}

#[derive(Default, Deserialize)]
struct SessionMetadata {
    upload_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum WebhookRejection {
    #[error("Missing signature header")]
    MissingSignature,
    #[error(transparent)]
    InvalidSignature(#[from] SignatureError),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::MissingSignature | Self::MalformedPayload(_) => {
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
