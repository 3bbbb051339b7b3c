use crate::domain::LetterStatus;
use serde::Deserialize;
use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};

/// Payment lifecycle as reported by the providers. `InProcess` shows up on
/// PIX charges between scan and settlement.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    InProcess,
    Approved,
    Rejected,
    Cancelled,
}

impl PaymentStatus {
    /// The letter status a terminal payment status maps onto; `None` while
    /// the payment is still in flight.
    pub fn letter_status(&self) -> Option<LetterStatus> {
        match self {
            PaymentStatus::Approved => Some(LetterStatus::Paid),
            PaymentStatus::Rejected | PaymentStatus::Cancelled => Some(LetterStatus::Cancelled),
            PaymentStatus::Pending | PaymentStatus::InProcess => None,
        }
    }
}

impl AsRef<str> for PaymentStatus {
    fn as_ref(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "pending" => Ok(PaymentStatus::Pending),
            "in_process" => Ok(PaymentStatus::InProcess),
            "approved" => Ok(PaymentStatus::Approved),
            "rejected" => Ok(PaymentStatus::Rejected),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("`{other}` is not a valid variant of PaymentStatus")),
        }
    }
}

impl Type<Postgres> for PaymentStatus {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for PaymentStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let status = String::decode(value)?;
        Self::try_from(status).map_err(|e| e.into())
    }
}
