use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use validator::validate_email;

#[derive(Clone, Debug)]
pub struct PayerEmail(String);

impl PayerEmail {
    pub fn parse(s: String) -> Result<PayerEmail, String> {
        if validate_email(&s) {
            Ok(Self(s))
        } else {
            Err(format!("`{s}` email has invalid format"))
        }
    }
}

impl AsRef<str> for PayerEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PayerEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Type<Postgres> for PayerEmail {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for PayerEmail {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let email = String::decode(value)?;
        Self::parse(email).map_err(|e| e.into())
    }
}
