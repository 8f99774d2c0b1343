use sqlx::FromRow;
use template_sqlc_users::{
    SessionId, SessionRecord, SessionToken, User, UserId, UserRecord, UserSession,
};

use crate::converters::domain::parse_json_text;
use crate::converters::sqlite::{
    SqliteBoolConverter, SqliteTimeConverter, SqliteTimestampConverter, SqliteUuidConverter,
};
use crate::converters::{
    ConversionError, Converter, DeviceInfoConverter, EmailConverter, FirstNameConverter,
    IpAddressConverter, LastNameConverter, MetadataConverter, PasswordHashConverter,
    RoleConverter, StatusConverter, TagsConverter, UsernameConverter,
};

pub(super) const USER_COLUMNS: &str = "id, uuid, email, username, password_hash, first_name, \
     last_name, status, role, is_verified, metadata, tags, created_at, updated_at, last_login_at";

pub(super) const SESSION_COLUMNS: &str =
    "id, user_id, token, device_info, ip_address, user_agent, created_at, expires_at, is_active";

#[derive(Debug, FromRow)]
pub(super) struct UserRow {
    id: i64,
    uuid: String,
    email: String,
    username: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    status: String,
    role: String,
    is_verified: i64,
    metadata: String,
    tags: String,
    created_at: String,
    updated_at: String,
    last_login_at: Option<String>,
}

impl UserRow {
    pub(super) fn into_user(self) -> Result<User, ConversionError> {
        Ok(User::from(UserRecord {
            id: UserId::new(self.id),
            uuid: SqliteUuidConverter.from_db(self.uuid)?,
            email: EmailConverter.from_db(self.email)?,
            username: UsernameConverter.from_db(self.username)?,
            password_hash: PasswordHashConverter.from_db(self.password_hash)?,
            first_name: FirstNameConverter.from_db(self.first_name)?,
            last_name: LastNameConverter.from_db(self.last_name)?,
            status: StatusConverter.from_db(self.status)?,
            role: RoleConverter.from_db(self.role)?,
            is_verified: SqliteBoolConverter.from_db(self.is_verified)?,
            metadata: MetadataConverter.from_db(parse_json_text("metadata", &self.metadata)?)?,
            tags: TagsConverter.from_db(parse_json_text("tags", &self.tags)?)?,
            created_at: SqliteTimestampConverter.from_db(self.created_at)?,
            updated_at: SqliteTimestampConverter.from_db(self.updated_at)?,
            last_login_at: SqliteTimeConverter.from_db(self.last_login_at)?,
        }))
    }
}

#[derive(Debug, FromRow)]
pub(super) struct SessionRow {
    id: i64,
    user_id: i64,
    token: String,
    device_info: String,
    ip_address: Option<String>,
    user_agent: String,
    created_at: String,
    expires_at: String,
    is_active: i64,
}

impl SessionRow {
    pub(super) fn into_session(self) -> Result<UserSession, ConversionError> {
        Ok(UserSession::from(SessionRecord {
            id: SessionId::new(self.id),
            user_id: UserId::new(self.user_id),
            token: SessionToken::from(SqliteUuidConverter.from_db(self.token)?),
            device_info: DeviceInfoConverter
                .from_db(parse_json_text("device_info", &self.device_info)?)?,
            ip_address: IpAddressConverter.from_db(self.ip_address)?,
            user_agent: self.user_agent,
            created_at: SqliteTimestampConverter.from_db(self.created_at)?,
            expires_at: SqliteTimestampConverter.from_db(self.expires_at)?,
            is_active: SqliteBoolConverter.from_db(self.is_active)?,
        }))
    }
}
