//! Custom serde helpers for backend wire formats.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Parse a timestamp that may arrive as RFC 3339, a naive ISO-8601 string
/// (taken as UTC), or epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Render a scalar JSON value as a string identifier.
///
/// Ids show up both as `"42"` and `42` on the wire.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Deserializes a count that may be a number, a numeric string, or null.
///
/// Negative, fractional or garbage values become 0.
pub mod lenient_count {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_u64().unwrap_or(0),
            Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
            _ => 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp(&json!("2024-05-01T10:00:00+02:00")).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let ts = parse_timestamp(&json!("2024-05-01T10:00:00.123456")).unwrap();
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap().timestamp());
    }

    #[test]
    fn test_parse_epoch_millis() {
        let ts = parse_timestamp(&json!(1740076800000i64)).unwrap();
        assert_eq!(ts.timestamp_millis(), 1740076800000);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!(42)), Some("42".to_string()));
        assert_eq!(value_to_string(&json!(" abc ")), Some("abc".to_string()));
        assert_eq!(value_to_string(&json!("")), None);
        assert_eq!(value_to_string(&json!([1])), None);
    }
}
