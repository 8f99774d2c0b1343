//! Storage-agnostic persistence contracts.
//!
//! Adapters for each engine live in the database crate; [`memory`] holds
//! in-process implementations used as test doubles. Implementations must
//! return [`DomainError`] values only, never raw driver errors.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::entities::{
    Email, PasswordHash, SessionId, SessionStats, SessionToken, User, UserId, UserRole,
    UserSession, UserStats, UserStatus, Username,
};
use crate::types::{DomainError, DomainResult};
use uuid::Uuid;

pub mod memory;

pub use memory::{InMemorySessionRepository, InMemoryUserRepository};

pub const MAX_LIST_LIMIT: i64 = 1000;
pub const MAX_SEARCH_LIMIT: i64 = 100;
pub const MAX_SEARCH_QUERY_LENGTH: usize = 500;
pub const MAX_SEARCH_TAGS: usize = 10;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a new user and return it with its assigned id.
    async fn create(&self, user: &User) -> DomainResult<User>;

    async fn get_by_id(&self, id: UserId) -> DomainResult<User>;
    async fn get_by_uuid(&self, uuid: Uuid) -> DomainResult<User>;
    async fn get_by_email(&self, email: &Email) -> DomainResult<User>;
    async fn get_by_username(&self, username: &Username) -> DomainResult<User>;

    /// Overwrite every mutable column of the user keyed by its id.
    async fn update(&self, user: &User) -> DomainResult<()>;

    /// Logical delete: the status becomes `inactive`. Repeating it is a no-op.
    async fn delete(&self, id: UserId) -> DomainResult<()>;

    /// Newest first.
    async fn list(&self, status: UserStatus, limit: i64, offset: i64) -> DomainResult<Vec<User>>;

    /// Full-text search ranked by relevance.
    async fn search(&self, query: &str, status: UserStatus, limit: i64) -> DomainResult<Vec<User>>;

    /// Users carrying at least one of `tags`.
    async fn search_by_tags(
        &self,
        tags: &[String],
        status: UserStatus,
        limit: i64,
        offset: i64,
    ) -> DomainResult<Vec<User>>;

    async fn count_by_status(&self) -> DomainResult<BTreeMap<UserStatus, i64>>;
    async fn get_stats(&self) -> DomainResult<UserStats>;

    /// Fails with `Authentication` for an unknown email and for a wrong
    /// hash alike.
    async fn verify_credentials(&self, email: &Email, password: &PasswordHash) -> DomainResult<User>;

    async fn update_password(&self, id: UserId, password: &PasswordHash) -> DomainResult<()>;
    async fn mark_verified(&self, id: UserId) -> DomainResult<()>;
    async fn change_status(&self, id: UserId, status: UserStatus) -> DomainResult<()>;
    async fn change_role(&self, id: UserId, role: UserRole) -> DomainResult<()>;

    async fn activate(&self, id: UserId) -> DomainResult<()> {
        self.change_status(id, UserStatus::Active).await
    }

    async fn deactivate(&self, id: UserId) -> DomainResult<()> {
        self.change_status(id, UserStatus::Inactive).await
    }

    async fn suspend(&self, id: UserId) -> DomainResult<()> {
        self.change_status(id, UserStatus::Suspended).await
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &UserSession) -> DomainResult<UserSession>;

    /// Only live sessions are returned. A deactivated or expired token
    /// yields `NotFound` with a message telling the cases apart.
    async fn get_by_token(&self, token: &SessionToken) -> DomainResult<UserSession>;

    async fn get_by_user_id(&self, user_id: UserId, active_only: bool) -> DomainResult<Vec<UserSession>>;
    async fn update(&self, session: &UserSession) -> DomainResult<()>;
    async fn delete(&self, id: SessionId) -> DomainResult<()>;

    /// Succeeds whether or not the token exists.
    async fn deactivate_by_token(&self, token: &SessionToken) -> DomainResult<()>;

    /// Returns how many sessions were closed.
    async fn deactivate_by_user_id(&self, user_id: UserId) -> DomainResult<u64>;

    /// Deactivate every active session past its expiry. Returns the number
    /// of rows changed, so a second run with nothing new returns 0.
    async fn cleanup_expired(&self) -> DomainResult<u64>;

    async fn get_active_sessions(&self, user_id: UserId) -> DomainResult<i64>;
    async fn get_session_stats(&self) -> DomainResult<SessionStats>;
}

pub fn validate_page(limit: i64, offset: i64) -> DomainResult<()> {
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(DomainError::validation(
            "limit",
            format!("limit must be between 1 and {MAX_LIST_LIMIT}"),
        ));
    }
    if offset < 0 {
        return Err(DomainError::validation("offset", "offset cannot be negative"));
    }
    Ok(())
}

/// Returns the trimmed query on success.
pub fn validate_search(query: &str, limit: i64) -> DomainResult<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(DomainError::validation("query", "search query cannot be empty"));
    }
    if query.chars().count() > MAX_SEARCH_QUERY_LENGTH {
        return Err(DomainError::validation(
            "query",
            format!("search query must be at most {MAX_SEARCH_QUERY_LENGTH} characters"),
        ));
    }
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(DomainError::validation(
            "limit",
            format!("limit must be between 1 and {MAX_SEARCH_LIMIT}"),
        ));
    }
    Ok(query)
}

pub fn validate_tag_search(tags: &[String], limit: i64, offset: i64) -> DomainResult<()> {
    if tags.is_empty() || tags.len() > MAX_SEARCH_TAGS {
        return Err(DomainError::validation(
            "tags",
            format!("between 1 and {MAX_SEARCH_TAGS} tags are required"),
        ));
    }
    if tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(DomainError::validation("tags", "tags cannot be empty"));
    }
    validate_page(limit, offset)
}
