use crate::{
    app_state::AppState,
    captcha::CaptchaError,
    domain::{Letter, LetterSlug},
    promotion::{promote_staged_upload, PromotionError, PromotionKind},
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
use sqlx::{postgres::PgRow, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/letters", post(create_letter))
        .route("/letters/:slug", get(get_letter))
}

#[tracing::instrument(name = "Create a letter", skip(app_state, body))]
async fn create_letter(
    State(app_state): State<AppState>,
    Json(body): Json<CreateLetterRequest>,
) -> Result<Json<LetterCreated>, LetterCreationError> {
    app_state
        .captcha_verifier
        .verify(body.captcha_token.as_deref())
        .await?;

    let mut transaction = app_state
        .db_pool
        .begin()
        .await
        .context("Failed to begin transaction")?;

    let letter = promote_staged_upload(
        &mut transaction,
        &app_state.media_store,
        &app_state.base_url,
        body.upload_id,
        PromotionKind::Pending,
    )
    .await?;

    transaction
        .commit()
        .await
        .context("Failed to commit transaction")?;

    let share_url = app_state.share_url(letter.slug.as_ref());

    Ok(Json(LetterCreated {
        slug: letter.slug.to_string(),
        share_url,
    }))
}

#[derive(Deserialize)]
struct CreateLetterRequest {
    upload_id: Uuid,
    captcha_token: Option<String>,
}

#[derive(Serialize)]
struct LetterCreated {
    slug: String,
    share_url: String,
}

#[tracing::instrument(name = "Fetch a letter", skip(app_state))]
async fn get_letter(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<LetterResponse>, LetterFetchError> {
    let slug = LetterSlug::parse(slug).map_err(LetterFetchError::InvalidSlug)?;

    let letter = fetch_and_count_view(&app_state, &slug)
        .await?
        .ok_or(LetterFetchError::NotFound)?;

    Ok(Json(letter.into()))
}

/// The view counter moves with the fetch itself, in one statement, so
/// concurrent viewers never lose counts.
#[tracing::instrument(skip(app_state))]
async fn fetch_and_count_view(
    app_state: &AppState,
    slug: &LetterSlug,
) -> Result<Option<Letter>, anyhow::Error> {
    let letter = sqlx::query(
        r#"
        UPDATE letters SET view_count = view_count + 1
        WHERE slug = $1
        RETURNING slug, couple_names, relationship_started_at, message, music_link,
                  photo_urls, audio_url, plan, status, payer_email, payer_name,
                  view_count, checkout_session_id, created_at, paid_at, valid_until
        "#,
    )
    .bind(slug.as_ref())
    .fetch_optional(&app_state.db_pool)
    .await
    .context("Failed to fetch the letter")?
    .map(|row: PgRow| Letter::from_row(&row))
    .transpose()
    .context("Failed to decode the letter")?;

    Ok(letter)
}

#[derive(Serialize)]
pub struct LetterResponse {
    pub slug: String,
    pub couple_names: String,
    #[serde(with = "time::serde::rfc3339")]
    pub relationship_started_at: OffsetDateTime,
    pub message: String,
    pub music_link: Option<String>,
    pub photo_urls: Vec<String>,
    pub audio_url: Option<String>,
    pub plan: String,
    pub status: String,
    pub view_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
}

impl From<Letter> for LetterResponse {
    fn from(letter: Letter) -> Self {
        Self {
            slug: letter.slug.to_string(),
            couple_names: letter.couple_names.as_ref().to_string(),
            relationship_started_at: letter.relationship_started_at.as_datetime(),
            message: letter.message.as_ref().to_string(),
            music_link: letter.music_link.map(|l| l.as_ref().to_string()),
            photo_urls: letter.photo_urls,
            audio_url: letter.audio_url,
            plan: letter.plan.as_ref().to_string(),
            status: letter.status.as_ref().to_string(),
            view_count: letter.view_count,
            created_at: letter.created_at,
            paid_at: letter.paid_at,
            valid_until: letter.valid_until,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum LetterCreationError {
    #[error(transparent)]
    Captcha(#[from] CaptchaError),
    #[error(transparent)]
    Promotion(#[from] PromotionError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl IntoResponse for LetterCreationError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::Captcha(CaptchaError::Unreachable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::Captcha(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            Self::Promotion(PromotionError::UploadNotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            Self::Promotion(PromotionError::UploadExpired(_)) => {
                (StatusCode::GONE, self.to_string()).into_response()
            }
            Self::Promotion(PromotionError::Unexpected(_)) | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum LetterFetchError {
    #[error("{0}")]
    InvalidSlug(String),
    #[error("No letter found for this slug")]
    NotFound,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl IntoResponse for LetterFetchError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::InvalidSlug(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
