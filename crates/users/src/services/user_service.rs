//! User service: account lifecycle and session-bearing authentication.

use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event_publisher::EventPublisher;
use crate::entities::{
    normalize_tags, DeviceInfo, Email, FirstName, LastName, Metadata, PasswordHash,
    SessionDuration, SessionStats, SessionToken, User, UserId, UserRole, UserSession, UserStats,
    UserStatus,
};
use crate::repositories::{SessionRepository, UserRepository};
use crate::types::{
    CreateUserRequest, DomainError, DomainResult, FieldChange, LoginFailureReason,
    UpdateUserRequest, UserEvent,
};
use crate::utils::{Clock, SystemClock};

/// A user together with the live session that identifies them.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub session: UserSession,
}

/// Coordinates the user and session repositories and publishes an event
/// for every committed state change.
pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    login_duration: SessionDuration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_clock(users, sessions, events, Arc::new(SystemClock))
    }

    pub fn with_clock(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            sessions,
            events,
            clock,
            login_duration: SessionDuration::Medium,
        }
    }

    /// Lifetime of sessions issued by [`UserService::authenticate_user`].
    pub fn login_duration(mut self, duration: SessionDuration) -> Self {
        self.login_duration = duration;
        self
    }

    pub async fn get_user(&self, user_id: UserId) -> DomainResult<User> {
        self.users.get_by_id(user_id).await
    }

    pub async fn get_user_by_uuid(&self, uuid: Uuid) -> DomainResult<User> {
        self.users.get_by_uuid(uuid).await
    }

    pub async fn list_users(&self, status: UserStatus, limit: i64, offset: i64) -> DomainResult<Vec<User>> {
        self.users.list(status, limit, offset).await
    }

    pub async fn search_users(&self, query: &str, status: UserStatus, limit: i64) -> DomainResult<Vec<User>> {
        self.users.search(query, status, limit).await
    }

    pub async fn search_users_by_tags(
        &self,
        tags: &[String],
        status: UserStatus,
        limit: i64,
        offset: i64,
    ) -> DomainResult<Vec<User>> {
        self.users.search_by_tags(tags, status, limit, offset).await
    }

    /// Validate, pre-check uniqueness, persist, then announce the new user.
    ///
    /// The pre-check only gives friendlier errors; the store's unique
    /// constraints decide races between concurrent creates.
    pub async fn create_user(&self, request: CreateUserRequest) -> DomainResult<User> {
        let draft = request.validate()?;

        match self.users.get_by_email(&draft.email).await {
            Ok(_) => return Err(DomainError::conflict("user", "email already exists")),
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(error),
        }
        match self.users.get_by_username(&draft.username).await {
            Ok(_) => return Err(DomainError::conflict("user", "username already exists")),
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(error),
        }

        let now = self.clock.now();
        let user = User::new(draft, now)?;
        let user = self.users.create(&user).await?;

        info!(user_id = %user.id(), email = %user.email(), "user created");
        self.publish(UserEvent::user_created(&user, now));
        Ok(user)
    }

    /// Apply the fields present in `request`. Nothing is written and no
    /// event is published when every supplied value equals the stored one.
    pub async fn update_user(&self, request: UpdateUserRequest) -> DomainResult<User> {
        let mut user = self.users.get_by_id(request.user_id).await?;

        let first_name = request
            .first_name
            .as_deref()
            .map(FirstName::parse)
            .transpose()?
            .filter(|name| name != user.first_name());
        let last_name = request
            .last_name
            .as_deref()
            .map(LastName::parse)
            .transpose()?
            .filter(|name| name != user.last_name());
        let tags = request
            .tags
            .map(normalize_tags)
            .transpose()?
            .filter(|tags| tags.as_slice() != user.tags());
        let metadata = request.metadata.filter(|metadata| metadata != user.metadata());

        let mut changes = BTreeMap::new();
        if let Some(name) = &first_name {
            changes.insert(
                "first_name".to_string(),
                FieldChange {
                    old: Value::from(user.first_name().as_str()),
                    new: Value::from(name.as_str()),
                },
            );
        }
        if let Some(name) = &last_name {
            changes.insert(
                "last_name".to_string(),
                FieldChange {
                    old: Value::from(user.last_name().as_str()),
                    new: Value::from(name.as_str()),
                },
            );
        }
        if let Some(metadata) = &metadata {
            changes.insert(
                "metadata".to_string(),
                FieldChange {
                    old: metadata_value(user.metadata()),
                    new: metadata_value(metadata),
                },
            );
        }
        if let Some(tags) = &tags {
            changes.insert(
                "tags".to_string(),
                FieldChange {
                    old: Value::from(user.tags().to_vec()),
                    new: Value::from(tags.clone()),
                },
            );
        }

        if changes.is_empty() {
            debug!(user_id = %user.id(), "update carried no changes");
            return Ok(user);
        }

        let now = self.clock.now();
        user.update_profile(first_name, last_name, metadata, tags, now)?;
        self.users.update(&user).await?;

        info!(user_id = %user.id(), fields = changes.len(), "user updated");
        self.publish(UserEvent::user_updated(&user, changes, request.updated_by, now));
        Ok(user)
    }

    /// Check credentials and open a session.
    ///
    /// A wrong email and a wrong password fail identically. Account status
    /// is only revealed once the password has been proven, and the session
    /// row is only written after both checks pass.
    pub async fn authenticate_user(
        &self,
        email: &str,
        password_hash: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> DomainResult<AuthenticatedUser> {
        let now = self.clock.now();

        let credentials = Email::parse(email).and_then(|email| {
            PasswordHash::parse(password_hash).map(|password| (email, password))
        });
        let verified = match credentials {
            Ok((email, password)) => self.users.verify_credentials(&email, &password).await,
            Err(_) => Err(DomainError::invalid_credentials()),
        };

        let mut user = match verified {
            Ok(user) => user,
            Err(DomainError::Authentication { .. }) => {
                info!(ip_address, "login rejected: invalid credentials");
                self.publish(UserEvent::user_login_failed(
                    None,
                    ip_address,
                    user_agent,
                    LoginFailureReason::InvalidCredentials,
                    now,
                ));
                return Err(DomainError::invalid_credentials());
            }
            Err(error) => return Err(error),
        };

        if !user.is_active() {
            let reason = LoginFailureReason::for_status(user.status());
            info!(user_id = %user.id(), reason = reason.as_str(), "login rejected");
            self.publish(UserEvent::user_login_failed(
                Some(user.uuid()),
                ip_address,
                user_agent,
                reason,
                now,
            ));
            return Err(account_error(user.status()));
        }

        let device_info = DeviceInfo::from_user_agent(user_agent);
        let device = device_info.label().to_string();
        let session = UserSession::start(
            user.id(),
            ip_address.parse::<IpAddr>().ok(),
            user_agent,
            device_info,
            self.login_duration,
            now,
        );
        let session = self.sessions.create(&session).await.map_err(|error| match error {
            DomainError::Internal { .. } => error,
            other => DomainError::internal_with("failed to create session", other),
        })?;

        user.record_login(now);
        if let Err(error) = self.users.update(&user).await {
            warn!(user_id = %user.id(), error = %error, "failed to record last login");
        }

        info!(user_id = %user.id(), session_id = %session.id(), "user logged in");
        self.publish(UserEvent::user_logged_in(&user, ip_address, user_agent, &device, now));
        Ok(AuthenticatedUser { user, session })
    }

    /// Resolve a bearer token to its live session and active owner.
    pub async fn verify_session(&self, token: &str) -> DomainResult<AuthenticatedUser> {
        let token = SessionToken::parse(token)?;
        let session = self.sessions.get_by_token(&token).await.map_err(|error| {
            if error.is_session_past_expiry() {
                DomainError::session_expired()
            } else {
                error
            }
        })?;

        let now = self.clock.now();
        if session.is_expired_at(now) {
            return Err(DomainError::session_expired());
        }
        if !session.is_active() {
            return Err(DomainError::session_deactivated());
        }

        let user = self.users.get_by_id(session.user_id()).await?;
        if !user.is_active() {
            debug!(user_id = %user.id(), status = %user.status(), "session owner no longer active");
            return Err(account_error(user.status()));
        }

        Ok(AuthenticatedUser { user, session })
    }

    /// Close the session behind `token`. Unknown or malformed tokens are
    /// accepted silently.
    pub async fn logout(&self, token: &str) -> DomainResult<()> {
        let Ok(token) = SessionToken::parse(token) else {
            debug!("logout with malformed token ignored");
            return Ok(());
        };

        let owner = self.sessions.get_by_token(&token).await.ok();
        self.sessions.deactivate_by_token(&token).await?;

        if let Some(session) = owner {
            match self.users.get_by_id(session.user_id()).await {
                Ok(user) => {
                    info!(user_id = %user.id(), session_id = %session.id(), "user logged out");
                    self.publish(UserEvent::user_logged_out(user.uuid(), 1, self.clock.now()));
                }
                Err(error) => {
                    warn!(session_id = %session.id(), error = %error, "logout owner lookup failed");
                }
            }
        }
        Ok(())
    }

    /// Deactivate every session the user holds. Returns how many closed.
    pub async fn logout_everywhere(&self, user_id: UserId) -> DomainResult<u64> {
        let user = self.users.get_by_id(user_id).await?;
        let closed = self.sessions.deactivate_by_user_id(user_id).await?;

        info!(user_id = %user_id, closed, "all sessions closed");
        self.publish(UserEvent::user_logged_out(user.uuid(), closed, self.clock.now()));
        Ok(closed)
    }

    pub async fn change_user_role(
        &self,
        user_id: UserId,
        new_role: &str,
        changed_by: &str,
    ) -> DomainResult<User> {
        let role: UserRole = new_role.parse()?;
        let mut user = self.users.get_by_id(user_id).await?;
        let old_role = user.role();

        self.users.change_role(user_id, role).await?;
        let now = self.clock.now();
        user.change_role(role, now);

        info!(user_id = %user_id, %old_role, new_role = %role, changed_by, "role changed");
        self.publish(UserEvent::role_changed(&user, old_role, changed_by, now));
        Ok(user)
    }

    /// Move the account to `new_status`. The event type follows the target
    /// status (`user.activated`, `user.deactivated`, `user.suspended`).
    pub async fn change_user_status(
        &self,
        user_id: UserId,
        new_status: &str,
        changed_by: &str,
    ) -> DomainResult<User> {
        let status: UserStatus = new_status.parse()?;
        let mut user = self.users.get_by_id(user_id).await?;
        let old_status = user.status();

        self.users.change_status(user_id, status).await?;
        let now = self.clock.now();
        user.change_status(status, now);

        info!(user_id = %user_id, %old_status, new_status = %status, changed_by, "status changed");
        self.publish(UserEvent::status_changed(&user, old_status, changed_by, now));
        Ok(user)
    }

    /// Logical delete. Open sessions are closed so the account cannot keep
    /// acting through them. Deleting an already inactive user is a no-op.
    pub async fn delete_user(&self, user_id: UserId, deleted_by: &str) -> DomainResult<()> {
        let user = self.users.get_by_id(user_id).await?;
        let old_status = user.status();
        if old_status == UserStatus::Inactive {
            debug!(user_id = %user_id, "user already inactive");
            return Ok(());
        }

        self.users.delete(user_id).await?;
        let closed = self.sessions.deactivate_by_user_id(user_id).await?;

        warn!(user_id = %user_id, deleted_by, sessions_closed = closed, "user deleted");
        self.publish(UserEvent::user_deleted(&user, old_status, deleted_by, self.clock.now()));
        Ok(())
    }

    pub async fn verify_user(&self, user_id: UserId, method: &str) -> DomainResult<User> {
        let mut user = self.users.get_by_id(user_id).await?;
        if user.is_verified() {
            return Ok(user);
        }

        self.users.mark_verified(user_id).await?;
        let now = self.clock.now();
        user.verify(now);

        info!(user_id = %user_id, method, "user verified");
        self.publish(UserEvent::user_verified(&user, method, now));
        Ok(user)
    }

    pub async fn change_password(
        &self,
        user_id: UserId,
        new_password_hash: &str,
        changed_by: &str,
    ) -> DomainResult<()> {
        let password = PasswordHash::parse(new_password_hash)?;
        let mut user = self.users.get_by_id(user_id).await?;

        self.users.update_password(user_id, &password).await?;
        let now = self.clock.now();
        user.update_password(password, now);

        info!(user_id = %user_id, changed_by, "password changed");
        self.publish(UserEvent::password_changed(&user, changed_by, now));
        Ok(())
    }

    pub async fn get_user_sessions(&self, user_id: UserId, active_only: bool) -> DomainResult<Vec<UserSession>> {
        self.sessions.get_by_user_id(user_id, active_only).await
    }

    pub async fn get_user_stats(&self) -> DomainResult<UserStats> {
        self.users.get_stats().await
    }

    pub async fn count_users_by_status(&self) -> DomainResult<BTreeMap<UserStatus, i64>> {
        self.users.count_by_status().await
    }

    pub async fn get_session_stats(&self) -> DomainResult<SessionStats> {
        self.sessions.get_session_stats().await
    }

    /// Sweep expired sessions. Safe to call repeatedly.
    pub async fn cleanup_expired_sessions(&self) -> DomainResult<u64> {
        let swept = self.sessions.cleanup_expired().await?;
        if swept > 0 {
            info!(swept, "expired sessions deactivated");
        }
        Ok(swept)
    }

    fn publish(&self, event: UserEvent) {
        let event_type = event.event_type;
        if let Err(error) = self.events.publish(event) {
            warn!(%event_type, error = %error, "failed to publish event");
        }
    }
}

fn account_error(status: UserStatus) -> DomainError {
    match status {
        UserStatus::Suspended => DomainError::account_suspended(),
        _ => DomainError::account_inactive(),
    }
}

fn metadata_value(metadata: &Metadata) -> Value {
    Value::Object(metadata.clone().into_iter().collect())
}
