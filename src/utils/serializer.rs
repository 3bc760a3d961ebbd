//! Custom serde (de)serializers for field shapes that don't have a natural
//! `Serialize`/`Deserialize` impl: millisecond durations and RFC3339 timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Serializes a `Duration` as an integer number of milliseconds, matching the
/// `response_time_ms`-style fields in the external API (spec §6.1).
pub mod duration_millis {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Same as `duration_millis` but for `Option<Duration>`.
pub mod duration_millis_opt {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// Formats a timestamp as RFC3339 with milliseconds, the wire format used
/// throughout the REST API's JSON bodies.
pub fn format_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    }

    #[test]
    fn duration_round_trips_through_millis() {
        let w = Wrapper {
            elapsed: Duration::from_millis(1234),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"elapsed":1234}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.elapsed, Duration::from_millis(1234));
    }

    #[test]
    fn rfc3339_formatting_includes_milliseconds_and_offset() {
        let ts = Utc::now();
        let formatted = format_rfc3339(&ts);
        assert!(formatted.ends_with('Z'));
        assert!(formatted.contains('.'));
    }
}
