//! MySQL column representations: `BINARY(16)` UUIDs in standard byte
//! order, `DATETIME(6)` holding UTC, and `TINYINT(1)` booleans.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use super::{decode_bool, decode_uuid, ConversionError, Converter, RawBool, RawUuid};

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlUuidConverter;

impl Converter for MySqlUuidConverter {
    type Domain = Uuid;
    type Db = Vec<u8>;

    fn to_db(&self, value: &Uuid) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    /// Older drivers surface the column as text, so textual UUIDs are
    /// accepted too.
    fn from_db(&self, value: Vec<u8>) -> Result<Uuid, ConversionError> {
        decode_uuid(RawUuid::Bytes(value))
    }
}

/// `DATETIME` has no zone; values are written and read as UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlTimeConverter;

impl Converter for MySqlTimeConverter {
    type Domain = Option<DateTime<Utc>>;
    type Db = Option<NaiveDateTime>;

    fn to_db(&self, value: &Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
        value.map(|at| at.naive_utc())
    }

    fn from_db(&self, value: Option<NaiveDateTime>) -> Result<Option<DateTime<Utc>>, ConversionError> {
        Ok(value.map(|at| at.and_utc()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlBoolConverter;

impl Converter for MySqlBoolConverter {
    type Domain = bool;
    type Db = i8;

    fn to_db(&self, value: &bool) -> i8 {
        i8::from(*value)
    }

    fn from_db(&self, value: i8) -> Result<bool, ConversionError> {
        decode_bool(RawBool::Int(i64::from(value)))
    }
}

/// Unwrap a timestamp column declared `NOT NULL`.
pub fn required_time(
    target: &'static str,
    value: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, ConversionError> {
    value.ok_or_else(|| ConversionError::new(target, "unexpected NULL"))
}
