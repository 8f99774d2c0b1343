//! Converters for domain values whose stored form is the same on every
//! engine: validated strings, closed enums and JSON documents.

use serde_json::Value;
use std::net::IpAddr;
use template_sqlc_users::entities::normalize_tags;
use template_sqlc_users::{
    DeviceInfo, Email, FirstName, LastName, Metadata, PasswordHash, UserRole, UserStatus,
    Username,
};

use super::{ConversionError, Converter};

macro_rules! validated_string_converter {
    ($name:ident, $domain:ty, $target:literal) => {
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl Converter for $name {
            type Domain = $domain;
            type Db = String;

            fn to_db(&self, value: &$domain) -> String {
                value.as_str().to_string()
            }

            fn from_db(&self, value: String) -> Result<$domain, ConversionError> {
                <$domain>::parse(&value)
                    .map_err(|error| ConversionError::new($target, error.to_string()))
            }
        }
    };
}

validated_string_converter!(EmailConverter, Email, "email");
validated_string_converter!(UsernameConverter, Username, "username");
validated_string_converter!(PasswordHashConverter, PasswordHash, "password_hash");
validated_string_converter!(FirstNameConverter, FirstName, "first_name");
validated_string_converter!(LastNameConverter, LastName, "last_name");

/// Closed set: an unknown stored status is an error, never a default.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusConverter;

impl Converter for StatusConverter {
    type Domain = UserStatus;
    type Db = String;

    fn to_db(&self, value: &UserStatus) -> String {
        value.as_str().to_string()
    }

    fn from_db(&self, value: String) -> Result<UserStatus, ConversionError> {
        value
            .parse()
            .map_err(|_| ConversionError::new("status", format!("unknown status `{value}`")))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RoleConverter;

impl Converter for RoleConverter {
    type Domain = UserRole;
    type Db = String;

    fn to_db(&self, value: &UserRole) -> String {
        value.as_str().to_string()
    }

    fn from_db(&self, value: String) -> Result<UserRole, ConversionError> {
        value
            .parse()
            .map_err(|_| ConversionError::new("role", format!("unknown role `{value}`")))
    }
}

/// Metadata is a JSON object; a stored `null` reads back as empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataConverter;

impl Converter for MetadataConverter {
    type Domain = Metadata;
    type Db = Value;

    fn to_db(&self, value: &Metadata) -> Value {
        Value::Object(value.clone().into_iter().collect())
    }

    fn from_db(&self, value: Value) -> Result<Metadata, ConversionError> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Null => Ok(Metadata::new()),
            other => Err(ConversionError::new(
                "metadata",
                format!("expected an object, found {}", json_kind(&other)),
            )),
        }
    }
}

/// Tags as a JSON array of strings, for engines without array columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagsConverter;

impl Converter for TagsConverter {
    type Domain = Vec<String>;
    type Db = Value;

    fn to_db(&self, value: &Vec<String>) -> Value {
        Value::from(value.clone())
    }

    fn from_db(&self, value: Value) -> Result<Vec<String>, ConversionError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => return Ok(Vec::new()),
            other => {
                return Err(ConversionError::new(
                    "tags",
                    format!("expected an array, found {}", json_kind(&other)),
                ))
            }
        };

        let tags = items
            .into_iter()
            .map(|item| match item {
                Value::String(tag) => Ok(tag),
                other => Err(ConversionError::new(
                    "tags",
                    format!("expected a string tag, found {}", json_kind(&other)),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        check_tags(tags)
    }
}

/// Re-validate tags read from a native array column.
pub fn check_tags(tags: Vec<String>) -> Result<Vec<String>, ConversionError> {
    normalize_tags(&tags).map_err(|error| ConversionError::new("tags", error.to_string()))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceInfoConverter;

impl Converter for DeviceInfoConverter {
    type Domain = DeviceInfo;
    type Db = Value;

    fn to_db(&self, value: &DeviceInfo) -> Value {
        serde_json::to_value(value).unwrap_or(Value::Null)
    }

    fn from_db(&self, value: Value) -> Result<DeviceInfo, ConversionError> {
        if value.is_null() {
            return Ok(DeviceInfo::default());
        }
        serde_json::from_value(value)
            .map_err(|error| ConversionError::new("device_info", error.to_string()))
    }
}

/// Client address as text; absent is NULL.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpAddressConverter;

impl Converter for IpAddressConverter {
    type Domain = Option<IpAddr>;
    type Db = Option<String>;

    fn to_db(&self, value: &Option<IpAddr>) -> Option<String> {
        value.map(|ip| ip.to_string())
    }

    fn from_db(&self, value: Option<String>) -> Result<Option<IpAddr>, ConversionError> {
        value
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ConversionError::new("ip_address", format!("invalid address `{raw}`")))
            })
            .transpose()
    }
}

/// Parse a JSON document stored as text.
pub fn parse_json_text(target: &'static str, raw: &str) -> Result<Value, ConversionError> {
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(raw).map_err(|error| ConversionError::new(target, error.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enums_round_trip_and_fail_closed() {
        for status in UserStatus::ALL {
            let stored = StatusConverter.to_db(&status);
            assert_eq!(StatusConverter.from_db(stored).unwrap(), status);
        }
        for role in UserRole::ALL {
            let stored = RoleConverter.to_db(&role);
            assert_eq!(RoleConverter.from_db(stored).unwrap(), role);
        }

        assert!(StatusConverter.from_db("banned".into()).is_err());
        assert!(StatusConverter.from_db("Active".into()).is_err());
        assert!(StatusConverter.from_db(String::new()).is_err());
        assert!(RoleConverter.from_db("root".into()).is_err());
    }

    #[test]
    fn validated_strings_reject_corrupt_rows() {
        let email = Email::parse("a@example.com").unwrap();
        assert_eq!(
            EmailConverter.from_db(EmailConverter.to_db(&email)).unwrap(),
            email
        );
        assert!(EmailConverter.from_db("not-an-email".into()).is_err());
        assert!(UsernameConverter.from_db("ab".into()).is_err());
        assert!(PasswordHashConverter.from_db("short".into()).is_err());
        assert!(FirstNameConverter.from_db("  ".into()).is_err());
    }

    #[test]
    fn metadata_requires_an_object() {
        let mut metadata = Metadata::new();
        metadata.insert("plan".into(), json!("pro"));
        metadata.insert("seats".into(), json!(3));

        let stored = MetadataConverter.to_db(&metadata);
        assert_eq!(MetadataConverter.from_db(stored).unwrap(), metadata);
        assert!(MetadataConverter.from_db(Value::Null).unwrap().is_empty());
        assert!(MetadataConverter.from_db(json!([1, 2])).is_err());
    }

    #[test]
    fn tags_require_string_arrays() {
        let tags = vec!["rust".to_string(), "sql".to_string()];
        assert_eq!(TagsConverter.from_db(TagsConverter.to_db(&tags)).unwrap(), tags);
        assert!(TagsConverter.from_db(json!(["ok", 3])).is_err());
        assert!(TagsConverter.from_db(json!({"a": 1})).is_err());
        assert!(TagsConverter.from_db(json!(["", "x"])).is_err());
    }

    #[test]
    fn device_info_and_ip_round_trip() {
        let info = DeviceInfo {
            platform: Some("linux".into()),
            browser: Some("firefox".into()),
            ..DeviceInfo::default()
        };
        assert_eq!(
            DeviceInfoConverter
                .from_db(DeviceInfoConverter.to_db(&info))
                .unwrap(),
            info
        );

        let ip: Option<IpAddr> = "2001:db8::1".parse().ok();
        assert_eq!(
            IpAddressConverter.from_db(IpAddressConverter.to_db(&ip)).unwrap(),
            ip
        );
        assert_eq!(IpAddressConverter.from_db(None).unwrap(), None);
        assert!(IpAddressConverter.from_db(Some("999.1.1.1".into())).is_err());
    }

    #[test]
    fn json_text_parsing() {
        assert_eq!(parse_json_text("tags", "").unwrap(), Value::Null);
        assert_eq!(parse_json_text("tags", "[\"a\"]").unwrap(), json!(["a"]));
        assert!(parse_json_text("tags", "{").is_err());
    }
}
