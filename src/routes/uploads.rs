use crate::{
    app_state::AppState,
    domain::{
        CoupleNames, LetterMessage, MusicLink, PayerEmail, PayerName, Plan, RelationshipStart,
        StagedUploadStatus,
    },
    media_store::MediaStore,
};
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

/// Per-file cap, the same 10 MiB the product has always enforced.
const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Seven photos plus an audio message at the per-file cap, with headroom
/// for the text fields and multipart framing.
const MAX_BODY_BYTES: usize = 96 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(create_upload))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[tracing::instrument(name = "Stage an upload", skip(app_state, multipart))]
async fn create_upload(
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadCreated>, UploadError> {
    let form = UploadForm::from_multipart(multipart).await?;
    let upload = form.validate()?;

    let upload_id = Uuid::new_v4();
    let expires_at = OffsetDateTime::now_utc() + app_state.staged_upload_ttl;

    for file in upload
        .photos
        .iter()
        .chain(upload.audio.as_ref().into_iter())
    {
        app_state
            .media_store
            .stage(upload_id, &file.name, &file.contents)
            .await
            .context("Failed to stage an uploaded file")?;
    }

    if let Err(e) = insert_staged_upload(&app_state, upload_id, &upload, expires_at).await {
        // do not leave orphaned files behind a failed insert
        if let Err(discard_error) = app_state.media_store.discard(upload_id).await {
            tracing::warn!("Failed to discard staged files: {discard_error:?}");
        }
        return Err(e.into());
    }

    Ok(Json(UploadCreated {
        upload_id,
        expires_at,
    }))
}

#[derive(Serialize)]
struct UploadCreated {
    upload_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
}

#[tracing::instrument(skip(app_state, upload))]
async fn insert_staged_upload(
    app_state: &AppState,
    upload_id: Uuid,
    upload: &ValidatedUpload,
    expires_at: OffsetDateTime,
) -> Result<(), anyhow::Error> {
    let photo_files: Vec<String> = upload.photos.iter().map(|f| f.name.clone()).collect();

    sqlx::query(
        r#"
        INSERT INTO staged_uploads (
            id, couple_names, relationship_started_at, message, music_link,
            plan, payer_email, payer_name, photo_files, audio_file,
            status, created_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now(), $12)
        "#,
    )
    .bind(upload_id)
    .bind(upload.couple_names.as_ref())
    .bind(upload.relationship_started_at.as_datetime())
    .bind(upload.message.as_ref())
    .bind(upload.music_link.as_ref().map(|l| l.as_ref()))
    .bind(upload.plan.as_ref())
    .bind(upload.payer_email.as_ref())
    .bind(upload.payer_name.as_ref())
    .bind(&photo_files)
    .bind(upload.audio.as_ref().map(|f| f.name.as_str()))
    .bind(StagedUploadStatus::Staged.as_ref())
    .bind(expires_at)
    .execute(&app_state.db_pool)
    .await
    .context("Failed to insert the staged upload")?;

    Ok(())
}

struct UploadedFile {
    name: String,
    contents: Bytes,
}

#[derive(Default)]
struct UploadForm {
    couple_names: Option<String>,
    relationship_started_at: Option<String>,
    message: Option<String>,
    music_link: Option<String>,
    plan: Option<String>,
    payer_email: Option<String>,
    payer_name: Option<String>,
    photos: Vec<UploadedFile>,
    audio: Option<UploadedFile>,
}

struct ValidatedUpload {
    couple_names: CoupleNames,
    relationship_started_at: RelationshipStart,
    message: LetterMessage,
    music_link: Option<MusicLink>,
    plan: Plan,
    payer_email: PayerEmail,
    payer_name: PayerName,
    photos: Vec<UploadedFile>,
    audio: Option<UploadedFile>,
}

impl UploadForm {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, UploadError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| UploadError::Validation(format!("Malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(|n| n.to_string()) else {
                continue;
            };

            match name.as_str() {
                "photo" => form.photos.push(Self::file(field, "image/").await?),
                "audio" => form.audio = Some(Self::file(field, "audio/").await?),
                "couple_names" => form.couple_names = Some(Self::text(field, &name).await?),
                "relationship_started_at" => {
                    form.relationship_started_at = Some(Self::text(field, &name).await?)
                }
                "message" => form.message = Some(Self::text(field, &name).await?),
                "music_link" => form.music_link = Some(Self::text(field, &name).await?),
                "plan" => form.plan = Some(Self::text(field, &name).await?),
                "payer_email" => form.payer_email = Some(Self::text(field, &name).await?),
                "payer_name" => form.payer_name = Some(Self::text(field, &name).await?),
                _ => {}
            }
        }

        Ok(form)
    }

    async fn text(
        field: axum::extract::multipart::Field<'_>,
        name: &str,
    ) -> Result<String, UploadError> {
        field
            .text()
            .await
            .map_err(|e| UploadError::Validation(format!("Failed to read field `{name}`: {e}")))
    }

    async fn file(
        field: axum::extract::multipart::Field<'_>,
        expected_content_type: &str,
    ) -> Result<UploadedFile, UploadError> {
        let field_name = field.name().unwrap_or_default().to_string();

        match field.content_type() {
            Some(content_type) if content_type.starts_with(expected_content_type) => {}
            other => {
                return Err(UploadError::Validation(format!(
                    "Field `{field_name}` must have a `{expected_content_type}*` content type, \
                     got `{}`",
                    other.unwrap_or("none")
                )))
            }
        }

        let name = MediaStore::sanitized_file_name(field.file_name().unwrap_or_default());
        let contents = field.bytes().await.map_err(|e| {
            UploadError::Validation(format!("Failed to read field `{field_name}`: {e}"))
        })?;

        if contents.len() > MAX_FILE_BYTES {
            return Err(UploadError::Validation(format!(
                "File `{field_name}` exceeds the {} MiB limit",
                MAX_FILE_BYTES / (1024 * 1024)
            )));
        }

        Ok(UploadedFile { name, contents })
    }

    fn validate(self) -> Result<ValidatedUpload, UploadError> {
        let couple_names = CoupleNames::parse(self.required("couple_names", self.couple_names.clone())?)
            .map_err(UploadError::Validation)?;
        let message = LetterMessage::parse(self.required("message", self.message.clone())?)
            .map_err(UploadError::Validation)?;
        let plan = Plan::try_from(self.required("plan", self.plan.clone())?)
            .map_err(UploadError::Validation)?;
        let payer_email = PayerEmail::parse(self.required("payer_email", self.payer_email.clone())?)
            .map_err(UploadError::Validation)?;
        let payer_name = PayerName::parse(self.required("payer_name", self.payer_name.clone())?)
            .map_err(UploadError::Validation)?;

        let started_at =
            self.required("relationship_started_at", self.relationship_started_at.clone())?;
        let started_at = OffsetDateTime::parse(&started_at, &Rfc3339).map_err(|_| {
            UploadError::Validation(format!(
                "`{started_at}` is not an RFC 3339 date-time"
            ))
        })?;
        let relationship_started_at =
            RelationshipStart::parse(started_at).map_err(UploadError::Validation)?;

        let music_link = match self.music_link.as_deref() {
            Some(link) if !link.is_empty() => {
                if !plan.allows_music() {
                    return Err(UploadError::Validation(
                        "Music links are only available on the premium plan".to_string(),
                    ));
                }
                Some(MusicLink::parse(link.to_string()).map_err(UploadError::Validation)?)
            }
            _ => None,
        };

        if self.photos.is_empty() {
            return Err(UploadError::Validation(
                "At least one photo is required".to_string(),
            ));
        }

        if self.photos.len() > plan.max_photos() {
            return Err(UploadError::Validation(format!(
                "The {} plan allows at most {} photos",
                plan.as_ref(),
                plan.max_photos()
            )));
        }

        Ok(ValidatedUpload {
            couple_names,
            relationship_started_at,
            message,
            music_link,
            plan,
            payer_email,
            payer_name,
            photos: self.photos,
            audio: self.audio,
        })
    }

    fn required(&self, name: &str, value: Option<String>) -> Result<String, UploadError> {
        value.ok_or_else(|| UploadError::Validation(format!("Field `{name}` is required")))
    }
}

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
