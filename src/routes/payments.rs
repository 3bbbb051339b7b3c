use crate::{
    app_state::AppState,
    domain::{LetterSlug, LetterStatus},
    payment_processing::{apply_payment_to_letter, record_payment_status},
    promotion::get_letter,
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
use sqlx::Row;
use time::OffsetDateTime;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/pix", post(create_pix_payment))
        .route("/payments/:payment_id", get(refresh_payment))
}

#[tracing::instrument(name = "Create a PIX payment", skip(app_state, body))]
async fn create_pix_payment(
    State(app_state): State<AppState>,
    Json(body): Json<CreatePixPaymentRequest>,
) -> Result<Json<PixPaymentCreated>, PaymentError> {
    let slug = LetterSlug::parse(body.slug).map_err(PaymentError::Validation)?;

    let letter = get_letter(&app_state.db_pool, &slug)
        .await?
        .ok_or(PaymentError::LetterNotFound)?;

    if letter.status != LetterStatus::Pending {
        return Err(PaymentError::LetterNotPayable(letter.status));
    }

    let description = format!("Carta de amor - {slug}");
    let payment = app_state
        .pix_client
        .create_payment(
            letter.plan.amount_cents(),
            &description,
            &letter.payer_email,
            &letter.payer_name,
            &slug,
        )
        .await
        .map_err(PaymentError::Provider)?;

    insert_pix_payment(&app_state, &payment, &letter, &slug).await?;

    Ok(Json(PixPaymentCreated {
        payment_id: payment.id.to_string(),
        status: payment.status.as_ref().to_string(),
        qr_code: payment.point_of_interaction.transaction_data.qr_code,
        qr_code_base64: payment.point_of_interaction.transaction_data.qr_code_base64,
        expires_at: payment.date_of_expiration,
    }))
}

#[derive(Deserialize)]
struct CreatePixPaymentRequest {
    slug: String,
}

#[derive(Serialize)]
struct PixPaymentCreated {
    payment_id: String,
    status: String,
    qr_code: String,
    qr_code_base64: String,
    #[serde(with = "time::serde::rfc3339::option")]
    expires_at: Option<OffsetDateTime>,
}

#[tracing::instrument(skip(app_state, payment, letter))]
async fn insert_pix_payment(
    app_state: &AppState,
    payment: &crate::pix_client::PixPayment,
    letter: &crate::domain::Letter,
    slug: &LetterSlug,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, provider, letter_slug, amount_cents, payer_email, payer_name,
            status, status_detail, created_at, updated_at, expires_at
        )
        VALUES ($1, 'pix', $2, $3, $4, $5, $6, $7, now(), now(), $8)
        "#,
    )
    .bind(payment.id.to_string())
    .bind(slug.as_ref())
    .bind(letter.plan.amount_cents())
    .bind(letter.payer_email.as_ref())
    .bind(letter.payer_name.as_ref())
    .bind(payment.status.as_ref())
    .bind(payment.status_detail.as_deref())
    .bind(payment.date_of_expiration)
    .execute(&app_state.db_pool)
    .await
    .context("Failed to record the payment")?;

    Ok(())
}

/// Pulls the authoritative status from the provider and folds it into the
/// stored payment and, when terminal, into the letter. The success page
/// falls back to this when the webhook is late.
#[tracing::instrument(name = "Refresh a payment", skip(app_state))]
async fn refresh_payment(
    State(app_state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentRefreshed>, PaymentError> {
    let stored = sqlx::query(r#"SELECT provider, letter_slug FROM payments WHERE id = $1"#)
        .bind(&payment_id)
        .fetch_optional(&app_state.db_pool)
        .await
        .context("Failed to fetch the payment")?
        .ok_or(PaymentError::PaymentNotFound)?;

    let provider: String = stored
        .try_get("provider")
        .context("Failed to decode provider")?;
    if provider != "pix" {
        return Err(PaymentError::Validation(
            "Only PIX payments can be refreshed".to_string(),
        ));
    }

    let lookup = app_state
        .pix_client
        .get_payment(&payment_id)
        .await
        .map_err(PaymentError::Provider)?;

    let letter_slug: Option<String> = stored
        .try_get("letter_slug")
        .context("Failed to decode letter slug")?;
    let letter_slug = letter_slug
        .or(lookup.external_reference.clone())
        .map(LetterSlug::parse)
        .transpose()
        .map_err(PaymentError::Validation)?;

    let mut transaction = app_state
        .db_pool
        .begin()
        .await
        .context("Failed to begin transaction")?;

    record_payment_status(
        &mut transaction,
        &payment_id,
        lookup.status,
        lookup.status_detail.as_deref(),
    )
    .await?;

    if let Some(slug) = &letter_slug {
        apply_payment_to_letter(&mut transaction, slug, lookup.status).await?;
    }

    transaction
        .commit()
        .await
        .context("Failed to commit transaction")?;

    Ok(Json(PaymentRefreshed {
        payment_id,
        status: lookup.status.as_ref().to_string(),
        status_detail: lookup.status_detail,
    }))
}

#[derive(Serialize)]
struct PaymentRefreshed {
    payment_id: String,
    status: String,
    status_detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum PaymentError {
    #[error("{0}")]
    Validation(String),
    #[error("No letter found for this slug")]
    LetterNotFound,
    #[error("The letter is already {}", .0.as_ref())]
    LetterNotPayable(LetterStatus),
    #[error("No payment found for this id")]
    PaymentNotFound,
    #[error("The payment provider request failed")]
    Provider(#[source] reqwest::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::LetterNotFound | Self::PaymentNotFound => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            Self::LetterNotPayable(_) => (StatusCode::CONFLICT, self.to_string()).into_response(),
            Self::Provider(_) | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
