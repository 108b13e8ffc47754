//! Store timestamp

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Store-generated timestamp (`{ "seconds": 1715670000 }` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
}

impl Timestamp {
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds }
    }

    pub fn now() -> Self {
        Self::from_seconds(crate::util::now_seconds())
    }

    /// UTC instant, `None` when out of chrono's range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, 0).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_seconds(dt.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let ts = Timestamp::from_seconds(1715670000);
        assert_eq!(
            serde_json::to_value(ts).unwrap(),
            serde_json::json!({ "seconds": 1715670000 })
        );
    }

    #[test]
    fn test_to_datetime() {
        let dt = Timestamp::from_seconds(1715670000).to_datetime().unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-05-14");
    }
}
