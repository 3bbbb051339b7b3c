use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use regex::Regex;
use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use std::iter::repeat_with;

const SLUG_CHARS: &str = r"[[:alnum:]]";
const SLUG_LENGTH: usize = 10;

pub fn slug_regex() -> String {
    format!(r"{SLUG_CHARS}{{{SLUG_LENGTH}}}")
}

fn slug_regex_anchored() -> String {
    format!(r"^{}$", slug_regex())
}

/// Public identifier of a letter: the URL path segment and the primary key
/// of the letter document. Unlike a credential it is meant to be shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LetterSlug(String);

impl LetterSlug {
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut thread_rng())
    }

    fn generate_with_rng(rng: &mut impl Rng) -> Self {
        let slug = repeat_with(|| rng.sample(Alphanumeric))
            .map(char::from)
            .take(SLUG_LENGTH)
            .collect();

        Self(slug)
    }

    pub fn parse(s: String) -> Result<Self, String> {
        static RE: Lazy<Regex> = Lazy::new(|| Regex::new(&slug_regex_anchored()).unwrap());

        if RE.is_match(&s) {
            Ok(Self(s))
        } else {
            Err(format!("Invalid letter slug: `{s}`"))
        }
    }
}

impl AsRef<str> for LetterSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LetterSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for LetterSlug {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl Type<Postgres> for LetterSlug {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LetterSlug {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let slug = String::decode(value)?;
        Self::parse(slug).map_err(|e| e.into())
    }
}
