//! PostgreSQL has native UUID, TIMESTAMPTZ and BOOLEAN types, so these
//! converters are pass-through apart from tag re-validation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::check_tags;
use super::{ConversionError, Converter};

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresUuidConverter;

impl Converter for PostgresUuidConverter {
    type Domain = Uuid;
    type Db = Uuid;

    fn to_db(&self, value: &Uuid) -> Uuid {
        *value
    }

    fn from_db(&self, value: Uuid) -> Result<Uuid, ConversionError> {
        Ok(value)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresTimeConverter;

impl Converter for PostgresTimeConverter {
    type Domain = Option<DateTime<Utc>>;
    type Db = Option<DateTime<Utc>>;

    fn to_db(&self, value: &Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        *value
    }

    fn from_db(&self, value: Option<DateTime<Utc>>) -> Result<Option<DateTime<Utc>>, ConversionError> {
        Ok(value)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresBoolConverter;

impl Converter for PostgresBoolConverter {
    type Domain = bool;
    type Db = bool;

    fn to_db(&self, value: &bool) -> bool {
        *value
    }

    fn from_db(&self, value: bool) -> Result<bool, ConversionError> {
        Ok(value)
    }
}

/// `TEXT[]` column.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresTagsConverter;

impl Converter for PostgresTagsConverter {
    type Domain = Vec<String>;
    type Db = Vec<String>;

    fn to_db(&self, value: &Vec<String>) -> Vec<String> {
        value.clone()
    }

    fn from_db(&self, value: Vec<String>) -> Result<Vec<String>, ConversionError> {
        check_tags(value)
    }
}
