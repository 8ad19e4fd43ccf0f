//! Timestamps and document ids.
//!
//! Timestamps always serialize with millisecond precision and a `Z` suffix so
//! that string comparison in any backend agrees with chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub type Timestamp = DateTime<Utc>;

/// Current time truncated to whole milliseconds.
pub fn now() -> Timestamp {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// 24 hex characters: 4 bytes of unix seconds followed by 8 random bytes.
pub fn new_id() -> String {
    let secs = Utc::now().timestamp().max(0) as u32;
    format!("{:08x}{:016x}", secs, rand::random::<u64>())
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub mod iso_millis {
    use super::{format_timestamp, Timestamp};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(d)?;
        chrono::DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(serde::de::Error::custom)
    }
}

pub mod iso_millis_opt {
    use super::{format_timestamp, Timestamp};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_some(&format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw {
            Some(raw) if !raw.is_empty() => chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|dt| Some(dt.with_timezone(&chrono::Utc)))
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_24_hex_chars() {
        let id = new_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_id());
    }

    #[test]
    fn timestamps_keep_fixed_width() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        assert_eq!(format_timestamp(&ts), "2023-11-14T22:13:20.000Z");
        let later = DateTime::from_timestamp_millis(1_700_000_000_001).unwrap();
        assert!(format_timestamp(&ts) < format_timestamp(&later));
    }
}
