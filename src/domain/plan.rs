use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use time::Duration;

/// The two products sold at checkout. Prices are in BRL cents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Plan {
    Basic,
    Premium,
}

impl Plan {
    pub fn amount_cents(&self) -> i64 {
        match self {
            Plan::Basic => 2900,
            Plan::Premium => 4900,
        }
    }

    pub fn max_photos(&self) -> usize {
        match self {
            Plan::Basic => 3,
            Plan::Premium => 7,
        }
    }

    pub fn allows_music(&self) -> bool {
        matches!(self, Plan::Premium)
    }

    /// How long a paid page stays up; `None` means forever.
    pub fn validity(&self) -> Option<Duration> {
        match self {
            Plan::Basic => Some(Duration::days(365)),
            Plan::Premium => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Plan::Basic => "Plano Básico - 1 ano, 3 fotos",
            Plan::Premium => "Plano Premium - Pra sempre, 7 fotos, música",
        }
    }
}

impl AsRef<str> for Plan {
    fn as_ref(&self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::Premium => "premium",
        }
    }
}

impl TryFrom<String> for Plan {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "basic" => Ok(Plan::Basic),
            "premium" => Ok(Plan::Premium),
            other => Err(format!("`{other}` is not a valid plan")),
        }
    }
}

impl Type<Postgres> for Plan {
    fn type_info() -> PgTypeInfo {
        String::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for Plan {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let plan = String::decode(value)?;
        Self::try_from(plan).map_err(|e| e.into())
    }
}
