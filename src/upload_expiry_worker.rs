use crate::{
    configuration::Settings, domain::StagedUploadStatus, media_store::MediaStore,
    startup::get_pg_connection_pool,
};
use anyhow::Context;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run_expiry_worker_until_stopped(config: Settings) -> Result<(), anyhow::Error> {
    let connection_pool = get_pg_connection_pool(&config.database);
    let media_store = MediaStore::new(config.media_store.root.clone());
    worker_loop(&connection_pool, &media_store).await
}

async fn worker_loop(db_pool: &PgPool, media_store: &MediaStore) -> Result<(), anyhow::Error> {
    loop {
        match sweep_expired_uploads(db_pool, media_store).await {
            Ok(0) => tokio::time::sleep(SWEEP_INTERVAL).await,
            Ok(swept) => tracing::info!("Discarded {swept} expired staged uploads"),
            Err(e) => {
                tracing::error!(
                    error_cause_chain = ?e,
                    error.message = %e,
                    "Failed to sweep expired staged uploads"
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Marks every overdue staged upload `expired` and removes its staged
/// files. The row flips first; a crash between the two leaves files for a
/// later manual cleanup rather than a dangling row.
#[tracing::instrument(skip_all)]
pub async fn sweep_expired_uploads(
    db_pool: &PgPool,
    media_store: &MediaStore,
) -> Result<usize, anyhow::Error> {
    let expired = sqlx::query(
        r#"
        UPDATE staged_uploads SET status = $1
        WHERE status = $2 AND expires_at < now()
        RETURNING id
        "#,
    )
    .bind(StagedUploadStatus::Expired.as_ref())
    .bind(StagedUploadStatus::Staged.as_ref())
    .fetch_all(db_pool)
    .await
    .context("Failed to expire overdue staged uploads")?;

    for row in &expired {
        let upload_id: Uuid = row.try_get("id").context("Failed to decode upload id")?;
        if let Err(e) = media_store.discard(upload_id).await {
            tracing::warn!("Failed to discard staged files of `{upload_id}`: {e:?}");
        }
    }

    Ok(expired.len())
}
