use super::{
    CoupleNames, LetterMessage, LetterSlug, LetterStatus, MusicLink, PayerEmail, PayerName, Plan,
    RelationshipStart,
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(FromRow)]
pub struct Letter {
    pub slug: LetterSlug,
    pub couple_names: CoupleNames,
    pub relationship_started_at: RelationshipStart,
    pub message: LetterMessage,
    pub music_link: Option<MusicLink>,
    pub photo_urls: Vec<String>,
    pub audio_url: Option<String>,
    pub plan: Plan,
    pub status: LetterStatus,
    pub payer_email: PayerEmail,
    pub payer_name: PayerName,
    pub view_count: i64,
    pub checkout_session_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub paid_at: Option<OffsetDateTime>,
    pub valid_until: Option<OffsetDateTime>,
}
