use chrono::{DateTime, Utc};

/// Parses an RFC-3339 timestamp. Empty strings mean an open bound and yield
/// `None`, matching the wire convention for validity windows.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Lenient variant used when a concrete instant is required: empty or
/// unparseable input collapses to the Unix epoch.
pub fn parse_rfc3339_or_epoch(value: &str) -> DateTime<Utc> {
    parse_rfc3339(value).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn format_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
