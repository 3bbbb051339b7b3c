use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use validator::validate_url;

/// Link to the couple's song (Spotify, YouTube, …). Premium plan only; the
/// plan gate lives with the upload validation, this type only vouches for
/// the URL itself.
#[derive(Clone, Debug)]
pub struct MusicLink(String);

impl MusicLink {
    pub fn parse(s: String) -> Result<MusicLink, String> {
        let is_http = s.starts_with("http://") || s.starts_with("https://");

        if is_http && validate_url(&s) {
            Ok(Self(s))
        } else {
            Err(format!("`{s}` is not a valid http(s) URL"))
        }
    }
}

impl AsRef<str> for MusicLink {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Type<Postgres> for MusicLink {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for MusicLink {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let link = String::decode(value)?;
        Self::parse(link).map_err(|e| e.into())
    }
}
