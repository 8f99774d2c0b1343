use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use template_sqlc_users::{
    SessionId, SessionRecord, SessionToken, User, UserId, UserRecord, UserSession,
};
use uuid::Uuid;

use crate::converters::postgres::{
    PostgresBoolConverter, PostgresTagsConverter, PostgresTimeConverter, PostgresUuidConverter,
};
use crate::converters::{
    ConversionError, Converter, DeviceInfoConverter, EmailConverter, FirstNameConverter,
    IpAddressConverter, LastNameConverter, MetadataConverter, PasswordHashConverter,
    RoleConverter, StatusConverter, UsernameConverter,
};

pub(super) const USER_COLUMNS: &str = "id, uuid, email, username, password_hash, first_name, \
     last_name, status, role, is_verified, metadata, tags, created_at, updated_at, last_login_at";

pub(super) const SESSION_COLUMNS: &str =
    "id, user_id, token, device_info, ip_address, user_agent, created_at, expires_at, is_active";

#[derive(Debug, FromRow)]
pub(super) struct UserRow {
    id: i64,
    uuid: Uuid,
    email: String,
    username: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    status: String,
    role: String,
    is_verified: bool,
    metadata: Value,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl UserRow {
    pub(super) fn into_user(self) -> Result<User, ConversionError> {
        Ok(User::from(UserRecord {
            id: UserId::new(self.id),
            uuid: PostgresUuidConverter.from_db(self.uuid)?,
            email: EmailConverter.from_db(self.email)?,
            username: UsernameConverter.from_db(self.username)?,
            password_hash: PasswordHashConverter.from_db(self.password_hash)?,
            first_name: FirstNameConverter.from_db(self.first_name)?,
            last_name: LastNameConverter.from_db(self.last_name)?,
            status: StatusConverter.from_db(self.status)?,
            role: RoleConverter.from_db(self.role)?,
            is_verified: PostgresBoolConverter.from_db(self.is_verified)?,
            metadata: MetadataConverter.from_db(self.metadata)?,
            tags: PostgresTagsConverter.from_db(self.tags)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login_at: PostgresTimeConverter.from_db(self.last_login_at)?,
        }))
    }
}

#[derive(Debug, FromRow)]
pub(super) struct SessionRow {
    id: i64,
    user_id: i64,
    token: Uuid,
    device_info: Value,
    ip_address: Option<String>,
    user_agent: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
}

impl SessionRow {
    pub(super) fn into_session(self) -> Result<UserSession, ConversionError> {
        Ok(UserSession::from(SessionRecord {
            id: SessionId::new(self.id),
            user_id: UserId::new(self.user_id),
            token: SessionToken::from(PostgresUuidConverter.from_db(self.token)?),
            device_info: DeviceInfoConverter.from_db(self.device_info)?,
            ip_address: IpAddressConverter.from_db(self.ip_address)?,
            user_agent: self.user_agent,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_active: PostgresBoolConverter.from_db(self.is_active)?,
        }))
    }
}
