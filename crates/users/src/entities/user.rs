use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::values::{
    normalize_tag, normalize_tags, Email, FirstName, LastName, Metadata, PasswordHash, UserId,
    UserRole, UserStatus, Username,
};
use crate::types::DomainResult;

/// Validated inputs for a brand new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub username: Username,
    pub password_hash: PasswordHash,
    pub first_name: FirstName,
    pub last_name: LastName,
    pub status: UserStatus,
    pub role: UserRole,
    pub metadata: Metadata,
    pub tags: Vec<String>,
}

/// Every persisted column of a user, already decoded into domain types.
/// Storage adapters build one of these from their row type.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserId,
    pub uuid: Uuid,
    pub email: Email,
    pub username: Username,
    pub password_hash: PasswordHash,
    pub first_name: FirstName,
    pub last_name: LastName,
    pub status: UserStatus,
    pub role: UserRole,
    pub is_verified: bool,
    pub metadata: Metadata,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Aggregate root of the user domain.
///
/// Fields are private so that every mutation goes through a method that
/// bumps `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    id: UserId,
    uuid: Uuid,
    email: Email,
    username: Username,
    #[serde(skip_serializing)]
    password_hash: PasswordHash,
    first_name: FirstName,
    last_name: LastName,
    status: UserStatus,
    role: UserRole,
    is_verified: bool,
    metadata: Metadata,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Build a new, not yet persisted user. The id stays `0` until the
    /// repository assigns one.
    pub fn new(draft: NewUser, now: DateTime<Utc>) -> DomainResult<Self> {
        let tags = normalize_tags(&draft.tags)?;
        Ok(Self {
            id: UserId::new(0),
            uuid: Uuid::new_v4(),
            email: draft.email,
            username: draft.username,
            password_hash: draft.password_hash,
            first_name: draft.first_name,
            last_name: draft.last_name,
            status: draft.status,
            role: draft.role,
            is_verified: false,
            metadata: draft.metadata,
            tags,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        })
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }

    pub fn first_name(&self) -> &FirstName {
        &self.first_name
    }

    pub fn last_name(&self) -> &LastName {
        &self.last_name
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    pub fn is_verified(&self) -> bool {
        self.is_verified
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Attach the identity a repository assigned on insert.
    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = id;
        self
    }

    pub fn change_status(&mut self, status: UserStatus, now: DateTime<Utc>) {
        self.status = status;
        self.touch(now);
    }

    pub fn change_role(&mut self, role: UserRole, now: DateTime<Utc>) {
        self.role = role;
        self.touch(now);
    }

    /// Apply whichever profile fields are present. Tags are replaced
    /// wholesale and deduplicated.
    pub fn update_profile(
        &mut self,
        first_name: Option<FirstName>,
        last_name: Option<LastName>,
        metadata: Option<Metadata>,
        tags: Option<Vec<String>>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let tags = tags.map(normalize_tags).transpose()?;

        if let Some(first_name) = first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = last_name {
            self.last_name = last_name;
        }
        if let Some(metadata) = metadata {
            self.metadata = metadata;
        }
        if let Some(tags) = tags {
            self.tags = tags;
        }
        self.touch(now);
        Ok(())
    }

    pub fn update_password(&mut self, password_hash: PasswordHash, now: DateTime<Utc>) {
        self.password_hash = password_hash;
        self.touch(now);
    }

    pub fn verify(&mut self, now: DateTime<Utc>) {
        self.is_verified = true;
        self.touch(now);
    }

    pub fn record_login(&mut self, at: DateTime<Utc>) {
        self.last_login_at = Some(at);
        self.touch(at);
    }

    /// Add a tag unless it is already present.
    pub fn add_tag(&mut self, tag: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let tag = normalize_tag(tag)?;
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
            self.touch(now);
        }
        Ok(())
    }

    pub fn remove_tag(&mut self, tag: &str, now: DateTime<Utc>) {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag.trim());
        if self.tags.len() != before {
            self.touch(now);
        }
    }

    /// `updated_at` never moves backwards, even if the clock does.
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.updated_at);
    }
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            uuid: record.uuid,
            email: record.email,
            username: record.username,
            password_hash: record.password_hash,
            first_name: record.first_name,
            last_name: record.last_name,
            status: record.status,
            role: record.role,
            is_verified: record.is_verified,
            metadata: record.metadata,
            tags: record.tags,
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_login_at: record.last_login_at,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::draft;
    use super::*;
    use chrono::Duration;

    fn created_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn user() -> User {
        User::new(draft("test@example.com", "testuser1"), created_at()).unwrap()
    }

    #[test]
    fn test_new_user_defaults() {
        let user = user();
        assert_eq!(user.id(), UserId::new(0));
        assert_eq!(user.status(), UserStatus::Active);
        assert_eq!(user.role(), UserRole::User);
        assert!(!user.is_verified());
        assert!(user.last_login_at().is_none());
        assert_eq!(user.created_at(), user.updated_at());
        assert_eq!(user.full_name(), "Test User");
    }

    #[test]
    fn test_new_user_rejects_blank_tag() {
        let mut draft = draft("test@example.com", "testuser1");
        draft.tags = vec!["ok".into(), " ".into()];
        assert!(User::new(draft, Utc::now()).is_err());
    }

    #[test]
    fn test_is_active_tracks_status() {
        let mut user = user();
        for status in UserStatus::ALL {
            user.change_status(status, created_at());
            assert_eq!(user.is_active(), status == UserStatus::Active);
        }
    }

    #[test]
    fn test_mutations_stamp_the_given_time() {
        let mut user = user();
        let later = created_at() + Duration::minutes(5);

        user.change_role(UserRole::Moderator, later);
        assert_eq!(user.updated_at(), later);
        assert_eq!(user.created_at(), created_at());
        assert_eq!(user.role(), UserRole::Moderator);

        user.verify(later + Duration::minutes(1));
        assert!(user.is_verified());
        assert_eq!(user.updated_at(), later + Duration::minutes(1));
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let mut user = user();
        user.change_role(UserRole::Admin, created_at() - Duration::hours(1));
        assert_eq!(user.updated_at(), created_at());
    }

    #[test]
    fn test_record_login() {
        let mut user = user();
        let at = created_at() + Duration::hours(2);
        user.record_login(at);
        assert_eq!(user.last_login_at(), Some(at));
        assert_eq!(user.updated_at(), at);
    }

    #[test]
    fn test_tags_dedup_on_add() {
        let mut user = user();
        let now = created_at();
        user.add_tag("beta", now).unwrap();
        user.add_tag(" beta ", now).unwrap();
        user.add_tag("alpha", now).unwrap();
        assert_eq!(user.tags(), &["beta".to_string(), "alpha".to_string()]);

        user.remove_tag("beta", now);
        assert!(!user.has_tag("beta"));
        assert!(user.add_tag("", now).is_err());
    }

    #[test]
    fn test_update_profile_is_all_or_nothing() {
        let mut user = user();
        let result = user.update_profile(
            Some(FirstName::parse("Grace").unwrap()),
            None,
            None,
            Some(vec!["".into()]),
            created_at(),
        );
        assert!(result.is_err());
        assert_eq!(user.first_name().as_str(), "Test");

        user.update_profile(
            Some(FirstName::parse("Grace").unwrap()),
            Some(LastName::parse("Hopper").unwrap()),
            None,
            Some(vec!["navy".into(), "navy".into()]),
            created_at(),
        )
        .unwrap();
        assert_eq!(user.full_name(), "Grace Hopper");
        assert_eq!(user.tags(), &["navy".to_string()]);
    }

    #[test]
    fn test_serialization_omits_password_hash() {
        let json = serde_json::to_value(user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "test@example.com");
        assert_eq!(json["status"], "active");
    }
}
