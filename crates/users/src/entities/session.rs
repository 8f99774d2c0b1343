use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

use super::values::{Metadata, UserId};
use crate::types::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bearer credential handed to clients. Fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(Uuid);

impl SessionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| DomainError::invalid_session_token())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for SessionToken {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Lifetime class chosen when a session is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionDuration {
    Short,
    Medium,
    Long,
    Remember,
}

impl SessionDuration {
    pub fn as_duration(&self) -> Duration {
        match self {
            SessionDuration::Short => Duration::days(1),
            SessionDuration::Medium => Duration::weeks(1),
            SessionDuration::Long => Duration::days(30),
            SessionDuration::Remember => Duration::days(90),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionDuration::Short => "short",
            SessionDuration::Medium => "medium",
            SessionDuration::Long => "long",
            SessionDuration::Remember => "remember",
        }
    }
}

impl FromStr for SessionDuration {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(SessionDuration::Short),
            "medium" => Ok(SessionDuration::Medium),
            "long" => Ok(SessionDuration::Long),
            "remember" => Ok(SessionDuration::Remember),
            other => Err(DomainError::validation(
                "session_duration",
                format!("unknown session duration `{other}`"),
            )),
        }
    }
}

/// Client description captured at login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DeviceInfo {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let mut info = Self::default();
        if !user_agent.is_empty() {
            info.metadata.insert(
                "user_agent".to_string(),
                serde_json::Value::String(user_agent.to_string()),
            );
        }
        info
    }

    pub fn label(&self) -> &str {
        self.device.as_deref().unwrap_or("unknown")
    }
}

/// Persisted session columns, decoded. Built by storage adapters.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: UserId,
    pub token: SessionToken,
    pub device_info: DeviceInfo,
    pub ip_address: Option<IpAddr>,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSession {
    id: SessionId,
    user_id: UserId,
    token: SessionToken,
    device_info: DeviceInfo,
    ip_address: Option<IpAddr>,
    user_agent: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
}

impl UserSession {
    /// Issue a fresh session starting at `now`.
    pub fn start(
        user_id: UserId,
        ip_address: Option<IpAddr>,
        user_agent: impl Into<String>,
        device_info: DeviceInfo,
        duration: SessionDuration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(0),
            user_id,
            token: SessionToken::generate(),
            device_info,
            ip_address,
            user_agent: user_agent.into(),
            created_at: now,
            expires_at: now + duration.as_duration(),
            is_active: true,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn ip_address(&self) -> Option<IpAddr> {
        self.ip_address
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// `is_active && now < expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn extend(&mut self, by: Duration) {
        self.expires_at += by;
    }

    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }
}

impl From<SessionRecord> for UserSession {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            token: record.token,
            device_info: record.device_info,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at: record.created_at,
            expires_at: record.expires_at,
            is_active: record.is_active,
        }
    }
}
