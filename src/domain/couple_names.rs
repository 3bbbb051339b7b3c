use once_cell::sync::Lazy;
use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use unicode_segmentation::UnicodeSegmentation;

/// The couple names displayed as the page title, e.g. "Ana & João".
#[derive(Clone, Debug)]
pub struct CoupleNames(String);

static FORBIDDEN_CHARS: [char; 10] = ['<', '>', '\'', '"', '\\', '(', ')', '{', '}', '/'];
static FORBIDDEN_CHARS_STRING: Lazy<String> = Lazy::new(|| String::from_iter(FORBIDDEN_CHARS));

impl CoupleNames {
    pub fn parse(s: String) -> Result<CoupleNames, String> {
        match s {
            _ if s.trim().is_empty() => Err(format!(
                "Couple names are empty or contain whitespace only: `{s}`"
            )),
            _ if s.graphemes(true).count() > 120 => {
                Err(format!("`{s}` is longer than 120 graphemes"))
            }
            _ if s.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) => Err(format!(
                "`{s}` contains at least one of forbidden characters: {}",
                *FORBIDDEN_CHARS_STRING
            )),
            _ => Ok(Self(s)),
        }
    }
}

impl AsRef<str> for CoupleNames {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Type<Postgres> for CoupleNames {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for CoupleNames {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let names = String::decode(value)?;
        Self::parse(names).map_err(|e| e.into())
    }
}
