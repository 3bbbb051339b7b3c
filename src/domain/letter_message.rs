use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use unicode_segmentation::UnicodeSegmentation;

const MAX_MESSAGE_GRAPHEMES: usize = 5000;

/// The free-form message shown on the love page. Unlike names, the message
/// may legitimately contain quotes and brackets, so only emptiness and
/// length are enforced.
#[derive(Clone, Debug)]
pub struct LetterMessage(String);

impl LetterMessage {
    pub fn parse(s: String) -> Result<LetterMessage, String> {
        match s {
            _ if s.trim().is_empty() => Err("Message is empty".to_string()),
            _ if s.graphemes(true).count() > MAX_MESSAGE_GRAPHEMES => Err(format!(
                "Message is longer than {MAX_MESSAGE_GRAPHEMES} graphemes"
            )),
            _ => Ok(Self(s)),
        }
    }
}

impl AsRef<str> for LetterMessage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Type<Postgres> for LetterMessage {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LetterMessage {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let message = String::decode(value)?;
        Self::parse(message).map_err(|e| e.into())
    }
}
