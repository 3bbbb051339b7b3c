use super::{
    CoupleNames, LetterMessage, LetterSlug, MusicLink, PayerEmail, PayerName, Plan,
    RelationshipStart,
};
use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, FromRow, Postgres, Type,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// Pre-payment staging record: the letter form data plus the staged media
/// file names, waiting to be promoted into a letter or swept away after
/// `expires_at`.
#[derive(FromRow)]
pub struct StagedUpload {
    pub id: Uuid,
    pub couple_names: CoupleNames,
    pub relationship_started_at: RelationshipStart,
    pub message: LetterMessage,
    pub music_link: Option<MusicLink>,
    pub plan: Plan,
    pub payer_email: PayerEmail,
    pub payer_name: PayerName,
    pub photo_files: Vec<String>,
    pub audio_file: Option<String>,
    pub status: StagedUploadStatus,
    pub final_slug: Option<LetterSlug>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StagedUploadStatus {
    Staged,
    Completed,
    Expired,
}

impl AsRef<str> for StagedUploadStatus {
    fn as_ref(&self) -> &'static str {
        match self {
            StagedUploadStatus::Staged => "staged",
            StagedUploadStatus::Completed => "completed",
            StagedUploadStatus::Expired => "expired",
        }
    }
}

impl TryFrom<String> for StagedUploadStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "staged" => Ok(StagedUploadStatus::Staged),
            "completed" => Ok(StagedUploadStatus::Completed),
            "expired" => Ok(StagedUploadStatus::Expired),
            other => Err(format!(
                "`{other}` is not a valid variant of StagedUploadStatus"
            )),
        }
    }
}

impl Type<Postgres> for StagedUploadStatus {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for StagedUploadStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let status = String::decode(value)?;
        Self::try_from(status).map_err(|e| e.into())
    }
}
