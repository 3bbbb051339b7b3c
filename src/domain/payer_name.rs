use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use unicode_segmentation::UnicodeSegmentation;

/// Full name of the paying customer, as typed into the checkout form.
///
/// PIX charges want the name split into first and last; payers with a single
/// name get it repeated, which is what the provider expects.
#[derive(Clone, Debug)]
pub struct PayerName(String);

impl PayerName {
    pub fn parse(s: String) -> Result<PayerName, String> {
        match s {
            _ if s.trim().is_empty() => Err(format!(
                "Payer name is empty or contains whitespace only: `{s}`"
            )),
            _ if s.graphemes(true).count() > 256 => {
                Err(format!("`{s}` is longer than 256 graphemes"))
            }
            _ => Ok(Self(s)),
        }
    }

    pub fn first_name(&self) -> &str {
        self.0.split_whitespace().next().unwrap_or(&self.0)
    }

    pub fn last_name(&self) -> String {
        let mut parts = self.0.split_whitespace();
        let first = parts.next().unwrap_or(&self.0);
        let rest = parts.collect::<Vec<_>>().join(" ");

        if rest.is_empty() {
            first.to_string()
        } else {
            rest
        }
    }
}

impl AsRef<str> for PayerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Type<Postgres> for PayerName {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for PayerName {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let name = String::decode(value)?;
        Self::parse(name).map_err(|e| e.into())
    }
}
