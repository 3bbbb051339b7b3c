use sqlx::{Executor, Postgres, Transaction};

/// Claims a webhook event inside the processing transaction. Returns `false`
/// when the event was already processed, in which case the delivery is a
/// retry and must be acknowledged without reprocessing.
#[tracing::instrument(skip(transaction))]
pub async fn try_claim_event(
    transaction: &mut Transaction<'_, Postgres>,
    provider: &str,
    event_id: &str,
) -> Result<bool, sqlx::Error> {
    let query = sqlx::query(
        r#"
        INSERT INTO processed_webhook_events (provider, event_id, received_at)
        VALUES ($1, $2, now())
        ON CONFLICT (provider, event_id) DO NOTHING
        "#,
    )
    .bind(provider)
    .bind(event_id);

    let result = transaction.execute(query).await?;

    Ok(result.rows_affected() == 1)
}
