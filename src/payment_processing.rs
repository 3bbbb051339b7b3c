use crate::{
    domain::{LetterSlug, LetterStatus, PayerEmail, PayerName, PaymentStatus, Plan},
    email_outbox::enqueue_confirmation_email,
};
use anyhow::Context;
use sqlx::{Executor, Postgres, Row, Transaction};
use time::OffsetDateTime;

/// Writes the provider-reported status onto the stored payment row. Returns
/// `false` when no payment with that id is known.
#[tracing::instrument(skip(transaction))]
pub async fn record_payment_status(
    transaction: &mut Transaction<'_, Postgres>,
    payment_id: &str,
    status: PaymentStatus,
    status_detail: Option<&str>,
) -> Result<bool, anyhow::Error> {
    let query = sqlx::query(
        r#"
        UPDATE payments SET status = $1, status_detail = $2, updated_at = now()
        WHERE id = $3
        "#,
    )
    .bind(status.as_ref())
    .bind(status_detail)
    .bind(payment_id);

    let result = transaction
        .execute(query)
        .await
        .context("Failed to update the payment")?;

    Ok(result.rows_affected() == 1)
}

/// Maps a terminal payment status onto the referenced letter: approval marks
/// it paid (stamping `paid_at`/`valid_until` and queueing the confirmation
/// email), rejection or cancellation cancels it. In-flight statuses and
/// letters that already left `pending` are left untouched.
#[tracing::instrument(skip(transaction))]
pub async fn apply_payment_to_letter(
    transaction: &mut Transaction<'_, Postgres>,
    slug: &LetterSlug,
    payment_status: PaymentStatus,
) -> Result<Option<LetterStatus>, anyhow::Error> {
    let Some(new_status) = payment_status.letter_status() else {
        return Ok(None);
    };

    let query = sqlx::query(
        r#"
        SELECT plan, payer_email, payer_name, status
        FROM letters
        WHERE slug = $1
        FOR UPDATE
        "#,
    )
    .bind(slug.as_ref());

    let Some(row) = transaction
        .fetch_optional(query)
        .await
        .context("Failed to fetch the letter")?
    else {
        tracing::warn!("Payment references unknown letter `{slug}`");
        return Ok(None);
    };

    let current: LetterStatus = row.try_get("status").context("Failed to decode status")?;
    if current != LetterStatus::Pending {
        tracing::info!("Letter `{slug}` already left pending, nothing to apply");
        return Ok(None);
    }

    match new_status {
        LetterStatus::Paid => {
            let plan: Plan = row.try_get("plan").context("Failed to decode plan")?;
            let payer_email: PayerEmail = row
                .try_get("payer_email")
                .context("Failed to decode payer email")?;
            let payer_name: PayerName = row
                .try_get("payer_name")
                .context("Failed to decode payer name")?;

            let paid_at = OffsetDateTime::now_utc();
            let valid_until = plan.validity().map(|validity| paid_at + validity);

            mark_letter_paid(transaction, slug, paid_at, valid_until).await?;
            enqueue_confirmation_email(transaction, &payer_email, payer_name.first_name(), slug)
                .await?;
        }
        LetterStatus::Cancelled => mark_letter_cancelled(transaction, slug).await?,
        LetterStatus::Pending => unreachable!("payment statuses never map back to pending"),
    }

    Ok(Some(new_status))
}

#[tracing::instrument(skip(transaction))]
async fn mark_letter_paid(
    transaction: &mut Transaction<'_, Postgres>,
    slug: &LetterSlug,
    paid_at: OffsetDateTime,
    valid_until: Option<OffsetDateTime>,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        UPDATE letters SET status = $1, paid_at = $2, valid_until = $3
        WHERE slug = $4
        "#,
    )
    .bind(LetterStatus::Paid.as_ref())
    .bind(paid_at)
    .bind(valid_until)
    .bind(slug.as_ref());

    transaction
        .execute(query)
        .await
        .context("Failed to mark the letter paid")?;

    Ok(())
}

#[tracing::instrument(skip(transaction))]
async fn mark_letter_cancelled(
    transaction: &mut Transaction<'_, Postgres>,
    slug: &LetterSlug,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        UPDATE letters SET status = $1
        WHERE slug = $2
        "#,
    )
    .bind(LetterStatus::Cancelled.as_ref())
    .bind(slug.as_ref());

    transaction
        .execute(query)
        .await
        .context("Failed to mark the letter cancelled")?;

    Ok(())
}
