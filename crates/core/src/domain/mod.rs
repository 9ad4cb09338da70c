pub mod contact;
pub mod lead;
pub mod task;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;

/// Store-assigned record identifier. Never supplied by callers on create.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Contacts,
    Leads,
    Tasks,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Self::Contacts, Self::Leads, Self::Tasks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Leads => "leads",
            Self::Tasks => "tasks",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contacts" | "contact" => Some(Self::Contacts),
            "leads" | "lead" => Some(Self::Leads),
            "tasks" | "task" => Some(Self::Tasks),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level checks that run after an argument bundle decoded into its typed shape.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Decode a loosely typed bundle into `T` and run its field checks.
///
/// `null` is treated as an empty object so argument-less calls decode into defaults.
pub fn parse_validated<T>(bundle: Value) -> Result<T, ValidationError>
where
    T: DeserializeOwned + Validate,
{
    let bundle = match bundle {
        Value::Null => Value::Object(serde_json::Map::new()),
        Value::Object(_) => bundle,
        _ => return Err(ValidationError::NotAnObject),
    };

    let parsed = serde_json::from_value::<T>(bundle).map_err(ValidationError::schema)?;
    parsed.validate()?;
    Ok(parsed)
}

/// Records carrying an enumerated status that list operations can filter on.
pub trait StatusTracked {
    type Status: Copy + PartialEq;

    fn status(&self) -> Self::Status;
}

/// Keep the records whose status equals `status`, preserving their order.
/// `None` keeps everything.
pub fn filter_by_status<T>(records: Vec<T>, status: Option<T::Status>) -> Vec<T>
where
    T: StatusTracked,
{
    match status {
        Some(wanted) => records.into_iter().filter(|record| record.status() == wanted).collect(),
        None => records,
    }
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::field(field, "must not be blank"));
    }
    Ok(())
}

pub(crate) fn require_email(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return Err(ValidationError::field(field, "must be an email address"));
    };

    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || value.chars().any(char::is_whitespace) {
        return Err(ValidationError::field(field, "must be an email address"));
    }
    Ok(())
}

/// RFC 3339 timestamps with fixed microsecond precision, so lexical order matches time order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|value| value.with_timezone(&Utc))
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{filter_by_status, require_email, timestamp, StatusTracked};

    #[derive(Debug, PartialEq)]
    struct Row(&'static str, u8);

    impl StatusTracked for Row {
        type Status = u8;

        fn status(&self) -> u8 {
            self.1
        }
    }

    #[test]
    fn status_filter_keeps_order_of_matching_rows() {
        let rows = vec![Row("c", 1), Row("b", 2), Row("a", 1)];

        let filtered = filter_by_status(rows, Some(1));

        assert_eq!(filtered, vec![Row("c", 1), Row("a", 1)]);
    }

    #[test]
    fn status_filter_without_status_returns_everything() {
        let rows = vec![Row("c", 1), Row("b", 2)];

        assert_eq!(filter_by_status(rows, None).len(), 2);
    }

    #[test]
    fn email_check_accepts_plain_addresses_and_rejects_noise() {
        assert!(require_email("email", "ada@x.com").is_ok());
        assert!(require_email("email", "ada@x").is_err());
        assert!(require_email("email", "@x.com").is_err());
        assert!(require_email("email", "ada lovelace@x.com").is_err());
        assert!(require_email("email", "ada@@x.com").is_err());
    }

    #[test]
    fn timestamps_format_with_fixed_width() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("valid date");

        let formatted = timestamp::format(&at);

        assert_eq!(formatted, "2026-01-02T03:04:05.000000Z");
        assert_eq!(timestamp::parse(&formatted).expect("parse"), at);
        assert_eq!(json!(formatted).as_str().map(str::len), Some(27));
    }
}
