//! Domain events published by the user service.
//!
//! Every event shares one envelope ([`UserEvent`]); the `type` field names
//! the fact and `data` carries its payload. The envelope is versioned so
//! external subscribers can detect shape changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::entities::{User, UserRole, UserStatus};
use crate::types::DomainError;

/// Version tag stamped on every envelope.
pub const EVENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "user.updated")]
    UserUpdated,
    #[serde(rename = "user.deleted")]
    UserDeleted,
    #[serde(rename = "user.activated")]
    UserActivated,
    #[serde(rename = "user.deactivated")]
    UserDeactivated,
    #[serde(rename = "user.suspended")]
    UserSuspended,
    #[serde(rename = "user.login")]
    UserLogin,
    #[serde(rename = "user.logout")]
    UserLogout,
    #[serde(rename = "user.login.failed")]
    UserLoginFailed,
    #[serde(rename = "user.verified")]
    UserVerified,
    #[serde(rename = "user.verification.requested")]
    UserVerificationRequested,
    #[serde(rename = "password.changed")]
    PasswordChanged,
    #[serde(rename = "password.reset")]
    PasswordReset,
    #[serde(rename = "password.reset.requested")]
    PasswordResetRequested,
    #[serde(rename = "profile.updated")]
    ProfileUpdated,
    #[serde(rename = "role.changed")]
    RoleChanged,
}

impl EventType {
    pub const ALL: [EventType; 16] = [
        EventType::UserCreated,
        EventType::UserUpdated,
        EventType::UserDeleted,
        EventType::UserActivated,
        EventType::UserDeactivated,
        EventType::UserSuspended,
        EventType::UserLogin,
        EventType::UserLogout,
        EventType::UserLoginFailed,
        EventType::UserVerified,
        EventType::UserVerificationRequested,
        EventType::PasswordChanged,
        EventType::PasswordReset,
        EventType::PasswordResetRequested,
        EventType::ProfileUpdated,
        EventType::RoleChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserCreated => "user.created",
            EventType::UserUpdated => "user.updated",
            EventType::UserDeleted => "user.deleted",
            EventType::UserActivated => "user.activated",
            EventType::UserDeactivated => "user.deactivated",
            EventType::UserSuspended => "user.suspended",
            EventType::UserLogin => "user.login",
            EventType::UserLogout => "user.logout",
            EventType::UserLoginFailed => "user.login.failed",
            EventType::UserVerified => "user.verified",
            EventType::UserVerificationRequested => "user.verification.requested",
            EventType::PasswordChanged => "password.changed",
            EventType::PasswordReset => "password.reset",
            EventType::PasswordResetRequested => "password.reset.requested",
            EventType::ProfileUpdated => "profile.updated",
            EventType::RoleChanged => "role.changed",
        }
    }

    /// Leading segment of the wire name, e.g. `user` or `password`.
    pub fn category(&self) -> &'static str {
        let name = self.as_str();
        name.split('.').next().unwrap_or(name)
    }

    /// Event emitted when an account is moved into `status`.
    pub fn for_status(status: UserStatus) -> Self {
        match status {
            UserStatus::Active => EventType::UserActivated,
            UserStatus::Inactive => EventType::UserDeactivated,
            UserStatus::Suspended => EventType::UserSuspended,
            UserStatus::Pending => EventType::UserUpdated,
        }
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::validation("event_type", format!("unknown event type `{s}`")))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a login attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginFailureReason {
    InvalidCredentials,
    AccountSuspended,
    AccountInactive,
    AccountPending,
}

impl LoginFailureReason {
    pub fn for_status(status: UserStatus) -> Self {
        match status {
            UserStatus::Suspended => LoginFailureReason::AccountSuspended,
            UserStatus::Pending => LoginFailureReason::AccountPending,
            UserStatus::Active | UserStatus::Inactive => LoginFailureReason::AccountInactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoginFailureReason::InvalidCredentials => "invalid_credentials",
            LoginFailureReason::AccountSuspended => "account_suspended",
            LoginFailureReason::AccountInactive => "account_inactive",
            LoginFailureReason::AccountPending => "account_pending",
        }
    }
}

/// Before and after value of one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreatedData {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub status: UserStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginData {
    pub user_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: String,
    pub device: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<LoginFailureReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleChangedData {
    pub user_id: Uuid,
    pub old_role: UserRole,
    pub new_role: UserRole,
    pub changed_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub user_id: Uuid,
    pub old_status: UserStatus,
    pub new_status: UserStatus,
    pub changed_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdatedData {
    pub user_id: Uuid,
    pub changes: BTreeMap<String, FieldChange>,
    pub updated_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVerifiedData {
    pub user_id: Uuid,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoutData {
    pub user_id: Uuid,
    pub sessions_closed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordChangedData {
    pub user_id: Uuid,
    pub changed_by: String,
}

/// Payload of an event. Serialized without a tag because the envelope's
/// `type` already identifies it; variants are ordered so that the richest
/// shapes are tried first when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    UserCreated(UserCreatedData),
    Login(LoginData),
    RoleChanged(RoleChangedData),
    StatusChanged(StatusChangedData),
    UserUpdated(UserUpdatedData),
    Verified(UserVerifiedData),
    Logout(LogoutData),
    PasswordChanged(PasswordChangedData),
}

/// Immutable record of a committed state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub user_id: Option<Uuid>,
    pub data: EventData,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl UserEvent {
    fn new(event_type: EventType, user_id: Option<Uuid>, data: EventData, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            user_id,
            data,
            timestamp: at,
            version: EVENT_VERSION.to_string(),
        }
    }

    pub fn user_created(user: &User, at: DateTime<Utc>) -> Self {
        let data = UserCreatedData {
            user_id: user.uuid(),
            email: user.email().to_string(),
            username: user.username().to_string(),
            first_name: user.first_name().to_string(),
            last_name: user.last_name().to_string(),
            role: user.role(),
            status: user.status(),
        };
        Self::new(EventType::UserCreated, Some(user.uuid()), EventData::UserCreated(data), at)
    }

    pub fn user_updated(
        user: &User,
        changes: BTreeMap<String, FieldChange>,
        updated_by: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let data = UserUpdatedData {
            user_id: user.uuid(),
            changes,
            updated_by: updated_by.into(),
        };
        Self::new(EventType::UserUpdated, Some(user.uuid()), EventData::UserUpdated(data), at)
    }

    pub fn user_logged_in(
        user: &User,
        ip_address: &str,
        user_agent: &str,
        device: &str,
        at: DateTime<Utc>,
    ) -> Self {
        let data = LoginData {
            user_id: Some(user.uuid()),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            device: device.to_string(),
            success: true,
            reason: None,
        };
        Self::new(EventType::UserLogin, Some(user.uuid()), EventData::Login(data), at)
    }

    /// `user_id` is only known once the password was proven, so
    /// credential failures carry `None`.
    pub fn user_login_failed(
        user_id: Option<Uuid>,
        ip_address: &str,
        user_agent: &str,
        reason: LoginFailureReason,
        at: DateTime<Utc>,
    ) -> Self {
        let data = LoginData {
            user_id,
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            device: "unknown".to_string(),
            success: false,
            reason: Some(reason),
        };
        Self::new(EventType::UserLoginFailed, user_id, EventData::Login(data), at)
    }

    pub fn role_changed(
        user: &User,
        old_role: UserRole,
        changed_by: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let data = RoleChangedData {
            user_id: user.uuid(),
            old_role,
            new_role: user.role(),
            changed_by: changed_by.into(),
        };
        Self::new(EventType::RoleChanged, Some(user.uuid()), EventData::RoleChanged(data), at)
    }

    pub fn status_changed(
        user: &User,
        old_status: UserStatus,
        changed_by: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let data = StatusChangedData {
            user_id: user.uuid(),
            old_status,
            new_status: user.status(),
            changed_by: changed_by.into(),
        };
        Self::new(
            EventType::for_status(user.status()),
            Some(user.uuid()),
            EventData::StatusChanged(data),
            at,
        )
    }

    pub fn user_deleted(
        user: &User,
        old_status: UserStatus,
        deleted_by: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let data = StatusChangedData {
            user_id: user.uuid(),
            old_status,
            new_status: UserStatus::Inactive,
            changed_by: deleted_by.into(),
        };
        Self::new(EventType::UserDeleted, Some(user.uuid()), EventData::StatusChanged(data), at)
    }

    pub fn user_verified(user: &User, method: impl Into<String>, at: DateTime<Utc>) -> Self {
        let data = UserVerifiedData {
            user_id: user.uuid(),
            method: method.into(),
            timestamp: at,
        };
        Self::new(EventType::UserVerified, Some(user.uuid()), EventData::Verified(data), at)
    }

    pub fn user_logged_out(user_id: Uuid, sessions_closed: u64, at: DateTime<Utc>) -> Self {
        let data = LogoutData {
            user_id,
            sessions_closed,
        };
        Self::new(EventType::UserLogout, Some(user_id), EventData::Logout(data), at)
    }

    pub fn password_changed(user: &User, changed_by: impl Into<String>, at: DateTime<Utc>) -> Self {
        let data = PasswordChangedData {
            user_id: user.uuid(),
            changed_by: changed_by.into(),
        };
        Self::new(
            EventType::PasswordChanged,
            Some(user.uuid()),
            EventData::PasswordChanged(data),
            at,
        )
    }
}
