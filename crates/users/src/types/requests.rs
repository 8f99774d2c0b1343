//! Request types accepted by the user service.

use serde::{Deserialize, Serialize};

use crate::entities::{
    Email, FirstName, LastName, Metadata, NewUser, PasswordHash, UserId, UserRole, UserStatus,
    Username,
};
use crate::types::DomainResult;

/// Request to create a new user. Status and role default to
/// `active` / `user` when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CreateUserRequest {
    /// Validate every field, stopping at the first failure.
    pub fn validate(&self) -> DomainResult<NewUser> {
        let email = Email::parse(&self.email)?;
        let username = Username::parse(&self.username)?;
        let password_hash = PasswordHash::parse(&self.password_hash)?;
        let first_name = FirstName::parse(&self.first_name)?;
        let last_name = LastName::parse(&self.last_name)?;
        let status = match self.status.as_deref() {
            Some(raw) => raw.parse::<UserStatus>()?,
            None => UserStatus::Active,
        };
        let role = match self.role.as_deref() {
            Some(raw) => raw.parse::<UserRole>()?,
            None => UserRole::User,
        };

        Ok(NewUser {
            email,
            username,
            password_hash,
            first_name,
            last_name,
            status,
            role,
            metadata: self.metadata.clone(),
            tags: self.tags.clone(),
        })
    }
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub updated_by: String,
}

impl UpdateUserRequest {
    pub fn new(user_id: UserId, updated_by: impl Into<String>) -> Self {
        Self {
            user_id,
            updated_by: updated_by.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateUserRequest {
        CreateUserRequest {
            email: "Test@Example.com".into(),
            username: "testuser1".into(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            status: None,
            role: None,
            tags: vec![],
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn defaults_to_active_user() {
        let draft = request().validate().unwrap();
        assert_eq!(draft.status, UserStatus::Active);
        assert_eq!(draft.role, UserRole::User);
        assert_eq!(draft.email.as_str(), "test@example.com");
    }

    #[test]
    fn rejects_unknown_role() {
        let mut request = request();
        request.role = Some("root".into());
        assert_eq!(request.validate().unwrap_err().field(), Some("role"));
    }

    #[test]
    fn deserializes_with_optional_fields_missing() {
        let request: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "email": "a@b.co",
            "username": "abc",
            "password_hash": "x".repeat(40),
            "first_name": "A",
            "last_name": "B",
        }))
        .unwrap();
        assert!(request.tags.is_empty());
        assert!(request.status.is_none());
    }
}
