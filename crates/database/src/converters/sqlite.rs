//! SQLite column representations: text UUIDs, RFC 3339 text timestamps and
//! 0/1 integers for booleans.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::{decode_bool, decode_uuid, ConversionError, Converter, RawBool, RawUuid};

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteUuidConverter;

impl Converter for SqliteUuidConverter {
    type Domain = Uuid;
    type Db = String;

    fn to_db(&self, value: &Uuid) -> String {
        value.hyphenated().to_string()
    }

    fn from_db(&self, value: String) -> Result<Uuid, ConversionError> {
        decode_uuid(RawUuid::Text(value))
    }
}

/// Nullable timestamp. Text is fixed width (nanosecond precision, `Z`
/// suffix) so that SQL string comparison orders it chronologically.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteTimeConverter;

impl Converter for SqliteTimeConverter {
    type Domain = Option<DateTime<Utc>>;
    type Db = Option<String>;

    fn to_db(&self, value: &Option<DateTime<Utc>>) -> Option<String> {
        value.as_ref().map(format_timestamp)
    }

    fn from_db(&self, value: Option<String>) -> Result<Option<DateTime<Utc>>, ConversionError> {
        value.map(|raw| parse_timestamp(&raw)).transpose()
    }
}

/// Non-null timestamp column.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteTimestampConverter;

impl Converter for SqliteTimestampConverter {
    type Domain = DateTime<Utc>;
    type Db = String;

    fn to_db(&self, value: &DateTime<Utc>) -> String {
        format_timestamp(value)
    }

    fn from_db(&self, value: String) -> Result<DateTime<Utc>, ConversionError> {
        parse_timestamp(&value)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBoolConverter;

impl Converter for SqliteBoolConverter {
    type Domain = bool;
    type Db = i64;

    fn to_db(&self, value: &bool) -> i64 {
        i64::from(*value)
    }

    fn from_db(&self, value: i64) -> Result<bool, ConversionError> {
        decode_bool(RawBool::Int(value))
    }
}

fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ConversionError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| ConversionError::new("timestamp", format!("`{raw}`: {error}")))
}
