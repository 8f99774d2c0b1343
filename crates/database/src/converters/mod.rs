//! Type converters between domain values and each engine's column types.
//!
//! Every converter is a symmetric pair: encoding a domain value always
//! succeeds, decoding a stored value fails with [`ConversionError`] when the
//! representation is structurally invalid. Nothing decodes to a default.

use template_sqlc_users::DomainError;
use thiserror::Error;
use uuid::Uuid;

pub mod domain;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use domain::{
    DeviceInfoConverter, EmailConverter, FirstNameConverter, IpAddressConverter,
    LastNameConverter, MetadataConverter, PasswordHashConverter, RoleConverter, StatusConverter,
    TagsConverter, UsernameConverter,
};

/// A stored value could not be turned back into a domain value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {target}: {reason}")]
pub struct ConversionError {
    pub target: &'static str,
    pub reason: String,
}

impl ConversionError {
    pub fn new(target: &'static str, reason: impl Into<String>) -> Self {
        Self {
            target,
            reason: reason.into(),
        }
    }
}

impl From<ConversionError> for DomainError {
    fn from(error: ConversionError) -> Self {
        DomainError::internal_with("stored value could not be decoded", error)
    }
}

pub trait Converter {
    type Domain;
    type Db;

    fn to_db(&self, value: &Self::Domain) -> Self::Db;
    fn from_db(&self, value: Self::Db) -> Result<Self::Domain, ConversionError>;
}

/// UUID as a driver may hand it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawUuid {
    Native(Uuid),
    Text(String),
    Bytes(Vec<u8>),
}

/// Decode a UUID from whichever representation the driver produced.
/// Sixteen bytes are read in standard (big-endian) layout; any other byte
/// string is tried as UTF-8 text.
pub fn decode_uuid(raw: RawUuid) -> Result<Uuid, ConversionError> {
    match raw {
        RawUuid::Native(uuid) => Ok(uuid),
        RawUuid::Text(text) => Uuid::parse_str(text.trim())
            .map_err(|error| ConversionError::new("uuid", error.to_string())),
        RawUuid::Bytes(bytes) if bytes.len() == 16 => Uuid::from_slice(&bytes)
            .map_err(|error| ConversionError::new("uuid", error.to_string())),
        RawUuid::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => decode_uuid(RawUuid::Text(text)),
            Err(error) => Err(ConversionError::new(
                "uuid",
                format!("{} bytes is not a uuid", error.as_bytes().len()),
            )),
        },
    }
}

/// Boolean as a driver may hand it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBool {
    Bool(bool),
    Int(i64),
    Text(String),
}

pub fn decode_bool(raw: RawBool) -> Result<bool, ConversionError> {
    match raw {
        RawBool::Bool(value) => Ok(value),
        RawBool::Int(value) => Ok(value != 0),
        RawBool::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ConversionError::new("bool", format!("unexpected text `{other}`"))),
        },
    }
}
