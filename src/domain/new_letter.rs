use super::{
    CoupleNames, LetterMessage, LetterSlug, MusicLink, PayerEmail, PayerName, Plan,
    RelationshipStart,
};

/// A letter ready to be persisted: a promoted staged upload together with
/// its freshly generated slug and the public URLs of its media.
pub struct NewLetter {
    pub slug: LetterSlug,
    pub couple_names: CoupleNames,
    pub relationship_started_at: RelationshipStart,
    pub message: LetterMessage,
    pub music_link: Option<MusicLink>,
    pub plan: Plan,
    pub payer_email: PayerEmail,
    pub payer_name: PayerName,
    pub photo_urls: Vec<String>,
    pub audio_url: Option<String>,
}
