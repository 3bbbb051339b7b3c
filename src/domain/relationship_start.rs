use sqlx::{
    error::BoxDynError,
    postgres::{PgTypeInfo, PgValueRef},
    Decode, Postgres, Type,
};
use time::OffsetDateTime;

/// The moment the relationship started, driving the duration counter on the
/// page. A start in the future would render a negative counter, so it is
/// rejected at the boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelationshipStart(OffsetDateTime);

impl RelationshipStart {
    pub fn parse(started_at: OffsetDateTime) -> Result<RelationshipStart, String> {
        if started_at > OffsetDateTime::now_utc() {
            Err(format!("Relationship start `{started_at}` is in the future"))
        } else {
            Ok(Self(started_at))
        }
    }

    pub fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }
}

impl Type<Postgres> for RelationshipStart {
    fn type_info() -> PgTypeInfo {
        OffsetDateTime::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for RelationshipStart {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let started_at = OffsetDateTime::decode(value)?;
        Self::parse(started_at).map_err(|e| e.into())
    }
}
