use crate::{
    domain::{Letter, LetterSlug, LetterStatus, NewLetter, StagedUpload, StagedUploadStatus},
    media_store::MediaStore,
};
use anyhow::Context;
use sqlx::{postgres::PgRow, Executor, FromRow, Postgres, Row, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_SLUG_ATTEMPTS: usize = 5;

/// How a staged upload becomes a letter: before payment (PIX flow, the
/// letter starts `pending`) or on a completed checkout (the letter is born
/// `paid`).
pub enum PromotionKind<'a> {
    Pending,
    Paid { checkout_session_id: &'a str },
}

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("No staged upload found for id `{0}`")]
    UploadNotFound(Uuid),
    #[error("Staged upload `{0}` has expired")]
    UploadExpired(Uuid),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Turns a staged upload into a letter: picks a free slug, moves the staged
/// media into the letter's public directory, inserts the letter row and
/// marks the upload completed. Runs inside the caller's transaction; the
/// caller commits.
#[tracing::instrument(skip(transaction, media_store, base_url, kind))]
pub async fn promote_staged_upload(
    transaction: &mut Transaction<'_, Postgres>,
    media_store: &MediaStore,
    base_url: &str,
    upload_id: Uuid,
    kind: PromotionKind<'_>,
) -> Result<NewLetter, PromotionError> {
    let upload = get_staged_upload(transaction, upload_id)
        .await?
        .ok_or(PromotionError::UploadNotFound(upload_id))?;

    if upload.expires_at < OffsetDateTime::now_utc() {
        return Err(PromotionError::UploadExpired(upload_id));
    }

    let slug = generate_unique_slug(transaction).await?;

    let mut file_names = upload.photo_files.clone();
    if let Some(audio) = &upload.audio_file {
        file_names.push(audio.clone());
    }
    media_store
        .promote(upload_id, &slug, &file_names)
        .await
        .context("Failed to move staged media to the letter directory")?;

    let letter = NewLetter {
        photo_urls: upload
            .photo_files
            .iter()
            .map(|f| MediaStore::public_url(base_url, &slug, f))
            .collect(),
        audio_url: upload
            .audio_file
            .as_ref()
            .map(|f| MediaStore::public_url(base_url, &slug, f)),
        slug,
        couple_names: upload.couple_names,
        relationship_started_at: upload.relationship_started_at,
        message: upload.message,
        music_link: upload.music_link,
        plan: upload.plan,
        payer_email: upload.payer_email,
        payer_name: upload.payer_name,
    };

    insert_letter(transaction, &letter, &kind).await?;
    complete_staged_upload(transaction, upload_id, &letter.slug).await?;

    Ok(letter)
}

/// Locks the staged row so a concurrent promotion of the same upload (a
/// webhook retry racing the PIX flow) blocks and then sees `completed`.
#[tracing::instrument(skip(transaction))]
async fn get_staged_upload(
    transaction: &mut Transaction<'_, Postgres>,
    upload_id: Uuid,
) -> Result<Option<StagedUpload>, anyhow::Error> {
    let query = sqlx::query(
        r#"
        SELECT id, couple_names, relationship_started_at, message, music_link,
               plan, payer_email, payer_name, photo_files, audio_file,
               status, final_slug, created_at, expires_at
        FROM staged_uploads
        WHERE id = $1 AND status = $2
        FOR UPDATE
        "#,
    )
    .bind(upload_id)
    .bind(StagedUploadStatus::Staged.as_ref());

    let upload = transaction
        .fetch_optional(query)
        .await
        .context("Failed to fetch the staged upload")?
        .map(|row: PgRow| StagedUpload::from_row(&row))
        .transpose()
        .context("Failed to decode the staged upload")?;

    Ok(upload)
}

#[tracing::instrument(skip(transaction))]
async fn generate_unique_slug(
    transaction: &mut Transaction<'_, Postgres>,
) -> Result<LetterSlug, anyhow::Error> {
    for _ in 0..MAX_SLUG_ATTEMPTS {
        let slug = LetterSlug::generate();
        let query = sqlx::query(r#"SELECT EXISTS(SELECT 1 FROM letters WHERE slug = $1)"#)
            .bind(slug.as_ref());

        let exists: bool = transaction
            .fetch_one(query)
            .await
            .context("Failed to check slug availability")?
            .try_get(0)
            .context("Failed to decode slug availability")?;

        if !exists {
            return Ok(slug);
        }
    }

    Err(anyhow::anyhow!(
        "Failed to find a free slug in {MAX_SLUG_ATTEMPTS} attempts"
    ))
}

#[tracing::instrument(skip(transaction, letter, kind))]
async fn insert_letter(
    transaction: &mut Transaction<'_, Postgres>,
    letter: &NewLetter,
    kind: &PromotionKind<'_>,
) -> Result<(), anyhow::Error> {
    let (status, checkout_session_id, paid_at) = match kind {
        PromotionKind::Pending => (LetterStatus::Pending, None, None),
        PromotionKind::Paid {
            checkout_session_id,
        } => (
            LetterStatus::Paid,
            Some(*checkout_session_id),
            Some(OffsetDateTime::now_utc()),
        ),
    };
    let valid_until = paid_at.and_then(|at| letter.plan.validity().map(|validity| at + validity));

    let query = sqlx::query(
        r#"
        INSERT INTO letters (
            slug, couple_names, relationship_started_at, message, music_link,
            photo_urls, audio_url, plan, status, payer_email, payer_name,
            view_count, checkout_session_id, created_at, paid_at, valid_until
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, now(), $13, $14)
        "#,
    )
    .bind(letter.slug.as_ref())
    .bind(letter.couple_names.as_ref())
    .bind(letter.relationship_started_at.as_datetime())
    .bind(letter.message.as_ref())
    .bind(letter.music_link.as_ref().map(|l| l.as_ref()))
    .bind(&letter.photo_urls)
    .bind(letter.audio_url.as_deref())
    .bind(letter.plan.as_ref())
    .bind(status.as_ref())
    .bind(letter.payer_email.as_ref())
    .bind(letter.payer_name.as_ref())
    .bind(checkout_session_id)
    .bind(paid_at)
    .bind(valid_until);

    transaction
        .execute(query)
        .await
        .context("Failed to insert the letter")?;

    Ok(())
}

#[tracing::instrument(skip(transaction))]
async fn complete_staged_upload(
    transaction: &mut Transaction<'_, Postgres>,
    upload_id: Uuid,
    final_slug: &LetterSlug,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        UPDATE staged_uploads SET status = $1, final_slug = $2
        WHERE id = $3
        "#,
    )
    .bind(StagedUploadStatus::Completed.as_ref())
    .bind(final_slug.as_ref())
    .bind(upload_id);

    transaction
        .execute(query)
        .await
        .context("Failed to mark the staged upload completed")?;

    Ok(())
}

/// Fetches a letter by slug without touching the view counter.
#[tracing::instrument(skip(executor))]
pub async fn get_letter<'e, E>(executor: E, slug: &LetterSlug) -> Result<Option<Letter>, anyhow::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = sqlx::query(
        r#"
        SELECT slug, couple_names, relationship_started_at, message, music_link,
               photo_urls, audio_url, plan, status, payer_email, payer_name,
               view_count, checkout_session_id, created_at, paid_at, valid_until
        FROM letters
        WHERE slug = $1
        "#,
    )
    .bind(slug.as_ref());

    let letter = executor
        .fetch_optional(query)
        .await
        .context("Failed to fetch the letter")?
        .map(|row: PgRow| Letter::from_row(&row))
        .transpose()
        .context("Failed to decode the letter")?;

    Ok(letter)
}
