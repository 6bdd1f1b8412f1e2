use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// When the gateway received a payload; serialized as RFC 3339 in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchedAt(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl FetchedAt {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub const fn as_offset_date_time(self) -> OffsetDateTime {
        self.0
    }
}
