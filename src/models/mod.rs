//! Data models for the menu backend.
//!
//! Wire names are camelCase to match the bot front end and the admin UI.

mod node;
mod page;
mod rating;
mod user;

pub use node::*;
pub use page::*;
pub use rating::*;
pub use user::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way every table stores it.
///
/// Fixed precision keeps lexical order equal to chronological order in SQLite.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The current time in storage format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp back into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = Utc::now();
        let later = earlier + Duration::milliseconds(1500);
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }

    #[test]
    fn test_timestamp_round_trip_precision() {
        let at = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(at)).unwrap();
        assert_eq!(parsed.timestamp_micros(), at.timestamp_micros());
    }
}
