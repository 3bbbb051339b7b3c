use crate::{
    app_state::AppState,
    domain::{Letter, Plan, StagedUploadStatus},
    routes::letters::LetterResponse,
};
use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout/sessions", post(create_session))
        .route(
            "/checkout/sessions/:session_id/letter",
            get(get_session_letter),
        )
}

#[tracing::instrument(name = "Create a checkout session", skip(app_state, body))]
async fn create_session(
    State(app_state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<SessionCreated>, CheckoutError> {
    let upload = get_staged_upload_summary(&app_state, body.upload_id)
        .await?
        .ok_or(CheckoutError::UploadNotFound(body.upload_id))?;

    if upload.expires_at < OffsetDateTime::now_utc() {
        return Err(CheckoutError::UploadExpired(body.upload_id));
    }

    let success_url = format!(
        "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
        app_state.base_url
    );
    let cancel_url = format!("{}/create", app_state.base_url);

    let session = app_state
        .checkout_client
        .create_session(upload.plan, body.upload_id, &success_url, &cancel_url)
        .await
        .map_err(CheckoutError::Provider)?;

    insert_payment(&app_state, &session.id, body.upload_id, &upload).await?;

    Ok(Json(SessionCreated {
        session_id: session.id,
        url: session.url,
    }))
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    upload_id: Uuid,
}

#[derive(Serialize)]
struct SessionCreated {
    session_id: String,
    url: String,
}

/// Success-page polling: 404 until the webhook has promoted the upload into
/// a letter, then the letter document.
#[tracing::instrument(name = "Look up the letter of a checkout session", skip(app_state))]
async fn get_session_letter(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<LetterResponse>, CheckoutError> {
    let letter = sqlx::query(
        r#"
        SELECT slug, couple_names, relationship_started_at, message, music_link,
               photo_urls, audio_url, plan, status, payer_email, payer_name,
               view_count, checkout_session_id, created_at, paid_at, valid_until
        FROM letters
        WHERE checkout_session_id = $1
        "#,
    )
    .bind(&session_id)
    .fetch_optional(&app_state.db_pool)
    .await
        .context("Failed to look up the letter for the session")?
        .map(|row: PgRow| Letter::from_row(&row))
        .transpose()
        .context("Failed to decode the letter")?
        .ok_or(CheckoutError::LetterNotReady)?;

    Ok(Json(letter.into()))
}

struct StagedUploadSummary {
    plan: Plan,
    payer_email: String,
    payer_name: String,
    expires_at: OffsetDateTime,
}

#[tracing::instrument(skip(app_state))]
async fn get_staged_upload_summary(
    app_state: &AppState,
    upload_id: Uuid,
) -> Result<Option<StagedUploadSummary>, anyhow::Error> {
    let row = sqlx::query(
        r#"
        SELECT plan, payer_email, payer_name, expires_at
        FROM staged_uploads
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(upload_id)
    .bind(StagedUploadStatus::Staged.as_ref())
    .fetch_optional(&app_state.db_pool)
    .await
    .context("Failed to fetch the staged upload")?;

    row.map(|row| -> Result<StagedUploadSummary, anyhow::Error> {
        Ok(StagedUploadSummary {
            plan: row.try_get::<Plan, _>("plan")?,
            payer_email: row.try_get::<String, _>("payer_email")?,
            payer_name: row.try_get::<String, _>("payer_name")?,
            expires_at: row.try_get::<OffsetDateTime, _>("expires_at")?,
        })
    })
    .transpose()
    .context("Failed to decode the staged upload")
}

#[tracing::instrument(skip(app_state, upload))]
async fn insert_payment(
    app_state: &AppState,
    session_id: &str,
    upload_id: Uuid,
    upload: &StagedUploadSummary,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, provider, upload_id, amount_cents, payer_email, payer_name,
            status, created_at, updated_at
        )
        VALUES ($1, 'checkout', $2, $3, $4, $5, 'pending', now(), now())
        "#,
    )
    .bind(session_id)
    .bind(upload_id)
    .bind(upload.plan.amount_cents())
    .bind(&upload.payer_email)
    .bind(&upload.payer_name)
    .execute(&app_state.db_pool)
    .await
    .context("Failed to record the payment")?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum CheckoutError {
    #[error("No staged upload found for id `{0}`")]
    UploadNotFound(Uuid),
    #[error("Staged upload `{0}` has expired")]
    UploadExpired(Uuid),
    #[error("The letter for this session is not ready yet")]
    LetterNotReady,
    #[error("Failed to create the checkout session")]
    Provider(#[source] reqwest::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::UploadNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            Self::UploadExpired(_) => (StatusCode::GONE, self.to_string()).into_response(),
            Self::LetterNotReady => StatusCode::NOT_FOUND.into_response(),
            Self::Provider(_) | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
