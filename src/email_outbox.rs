use crate::domain::{LetterSlug, PayerEmail};
use anyhow::Context;
use sqlx::{Executor, Postgres, Transaction};
use uuid::Uuid;

/// Queues the payment-confirmation email inside the webhook's transaction.
/// Actual delivery happens in the background worker, so a slow or failing
/// email API can never fail payment processing.
#[tracing::instrument(skip(transaction, recipient))]
pub async fn enqueue_confirmation_email(
    transaction: &mut Transaction<'_, Postgres>,
    recipient: &PayerEmail,
    recipient_name: &str,
    letter_slug: &LetterSlug,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        INSERT INTO email_outbox (id, recipient, recipient_name, letter_slug, created_at)
        VALUES ($1, $2, $3, $4, now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(recipient.as_ref())
    .bind(recipient_name)
    .bind(letter_slug.as_ref());

    transaction
        .execute(query)
        .await
        .context("Failed to enqueue the confirmation email")?;

    Ok(())
}
