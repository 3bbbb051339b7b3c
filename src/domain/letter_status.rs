use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LetterStatus {
    Pending,
    Paid,
    Cancelled,
}

impl AsRef<str> for LetterStatus {
    fn as_ref(&self) -> &'static str {
        match self {
            LetterStatus::Pending => "pending",
            LetterStatus::Paid => "paid",
            LetterStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for LetterStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "pending" => Ok(LetterStatus::Pending),
            "paid" => Ok(LetterStatus::Paid),
            "cancelled" => Ok(LetterStatus::Cancelled),
            other => Err(format!("`{other}` is not a valid variant of LetterStatus")),
        }
    }
}

impl Type<Postgres> for LetterStatus {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LetterStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let status = String::decode(value)?;
        Self::try_from(status).map_err(|e| e.into())
    }
}
