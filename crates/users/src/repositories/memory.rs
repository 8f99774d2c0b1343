//! In-process repositories backed by hash maps.
//!
//! They honour the same contracts as the SQL adapters (uniqueness,
//! read-time expiry, logical delete) so services can be exercised without a
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    validate_page, validate_search, validate_tag_search, SessionRepository, UserRepository,
};
use crate::entities::{
    Email, PasswordHash, SessionId, SessionStats, SessionToken, User, UserId, UserRole,
    UserSession, UserStats, UserStatus, Username,
};
use crate::types::{DomainError, DomainResult};
use crate::utils::{Clock, SystemClock};

#[derive(Default)]
struct UserStore {
    users: HashMap<i64, User>,
    next_id: i64,
}

impl UserStore {
    fn conflict_for(&self, candidate: &User) -> Option<DomainError> {
        self.users
            .values()
            .filter(|existing| existing.id() != candidate.id())
            .find_map(|existing| {
                if existing.email() == candidate.email() {
                    Some(DomainError::conflict("user", "email already exists"))
                } else if existing.username().eq_ignore_case(candidate.username()) {
                    Some(DomainError::conflict("user", "username already exists"))
                } else {
                    None
                }
            })
    }

    fn get_mut(&mut self, id: UserId) -> DomainResult<&mut User> {
        self.users
            .get_mut(&id.get())
            .ok_or_else(DomainError::user_not_found)
    }
}

/// Newest first, ties broken by id so paging is deterministic.
fn newest_first(users: &mut [User]) {
    users.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
}

fn page(users: Vec<User>, limit: i64, offset: i64) -> Vec<User> {
    users
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(0))
        .collect()
}

fn relevance(user: &User, terms: &[String]) -> usize {
    let fields = [
        user.email().as_str().to_lowercase(),
        user.username().as_str().to_lowercase(),
        user.first_name().as_str().to_lowercase(),
        user.last_name().as_str().to_lowercase(),
    ];
    terms
        .iter()
        .map(|term| fields.iter().filter(|field| field.contains(term.as_str())).count())
        .sum()
}

/// Hash-map user store.
pub struct InMemoryUserRepository {
    store: Arc<RwLock<UserStore>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(RwLock::new(UserStore {
                users: HashMap::new(),
                next_id: 1,
            })),
            clock,
        }
    }

    async fn find(&self, predicate: impl Fn(&User) -> bool) -> DomainResult<User> {
        let store = self.store.read().await;
        store
            .users
            .values()
            .find(|user| predicate(user))
            .cloned()
            .ok_or_else(DomainError::user_not_found)
    }

    async fn modify(
        &self,
        id: UserId,
        change: impl FnOnce(&mut User, DateTime<Utc>),
    ) -> DomainResult<()> {
        let now = self.clock.now();
        let mut store = self.store.write().await;
        change(store.get_mut(id)?, now);
        Ok(())
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> DomainResult<User> {
        let mut store = self.store.write().await;
        if let Some(conflict) = store.conflict_for(user) {
            return Err(conflict);
        }

        let id = UserId::new(store.next_id);
        store.next_id += 1;

        let created = user.clone().with_id(id);
        store.users.insert(id.get(), created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: UserId) -> DomainResult<User> {
        let store = self.store.read().await;
        store
            .users
            .get(&id.get())
            .cloned()
            .ok_or_else(DomainError::user_not_found)
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> DomainResult<User> {
        self.find(|user| user.uuid() == uuid).await
    }

    async fn get_by_email(&self, email: &Email) -> DomainResult<User> {
        self.find(|user| user.email() == email).await
    }

    async fn get_by_username(&self, username: &Username) -> DomainResult<User> {
        self.find(|user| user.username().eq_ignore_case(username)).await
    }

    async fn update(&self, user: &User) -> DomainResult<()> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&user.id().get()) {
            return Err(DomainError::user_not_found());
        }
        if let Some(conflict) = store.conflict_for(user) {
            return Err(conflict);
        }
        store.users.insert(user.id().get(), user.clone());
        Ok(())
    }

    async fn delete(&self, id: UserId) -> DomainResult<()> {
        self.modify(id, |user, now| {
            if user.status() != UserStatus::Inactive {
                user.change_status(UserStatus::Inactive, now);
            }
        })
        .await
    }

    async fn list(&self, status: UserStatus, limit: i64, offset: i64) -> DomainResult<Vec<User>> {
        validate_page(limit, offset)?;
        let store = self.store.read().await;
        let mut users: Vec<User> = store
            .users
            .values()
            .filter(|user| user.status() == status)
            .cloned()
            .collect();
        newest_first(&mut users);
        Ok(page(users, limit, offset))
    }

    async fn search(&self, query: &str, status: UserStatus, limit: i64) -> DomainResult<Vec<User>> {
        let query = validate_search(query, limit)?;
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();

        let store = self.store.read().await;
        let mut scored: Vec<(usize, User)> = store
            .users
            .values()
            .filter(|user| user.status() == status)
            .filter_map(|user| {
                let score = relevance(user, &terms);
                (score > 0).then(|| (score, user.clone()))
            })
            .collect();
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score.cmp(a_score).then_with(|| b.id().cmp(&a.id()))
        });

        Ok(scored
            .into_iter()
            .map(|(_, user)| user)
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        status: UserStatus,
        limit: i64,
        offset: i64,
    ) -> DomainResult<Vec<User>> {
        validate_tag_search(tags, limit, offset)?;
        let store = self.store.read().await;
        let mut users: Vec<User> = store
            .users
            .values()
            .filter(|user| user.status() == status)
            .filter(|user| tags.iter().any(|tag| user.has_tag(tag.trim())))
            .cloned()
            .collect();
        newest_first(&mut users);
        Ok(page(users, limit, offset))
    }

    async fn count_by_status(&self) -> DomainResult<BTreeMap<UserStatus, i64>> {
        let store = self.store.read().await;
        let mut counts = BTreeMap::new();
        for user in store.users.values() {
            *counts.entry(user.status()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn get_stats(&self) -> DomainResult<UserStats> {
        let now = self.clock.now();
        let store = self.store.read().await;
        let users = store.users.values();

        let mut stats = UserStats::default();
        for user in users {
            stats.total_users += 1;
            match user.status() {
                UserStatus::Active => stats.active_users += 1,
                UserStatus::Inactive => stats.inactive_users += 1,
                UserStatus::Suspended => stats.suspended_users += 1,
                UserStatus::Pending => {}
            }
            if user.is_verified() {
                stats.verified_users += 1;
            }
            if user.last_login_at().is_some() {
                stats.users_with_logins += 1;
            }
            if user.created_at() >= now - Duration::days(30) {
                stats.new_users_30d += 1;
            }
            if user.created_at() >= now - Duration::days(7) {
                stats.new_users_7d += 1;
            }
        }
        Ok(stats.with_rates())
    }

    async fn verify_credentials(&self, email: &Email, password: &PasswordHash) -> DomainResult<User> {
        let user = self
            .get_by_email(email)
            .await
            .map_err(|_| DomainError::invalid_credentials())?;
        if !user.password_hash().matches(password) {
            return Err(DomainError::invalid_credentials());
        }
        Ok(user)
    }

    async fn update_password(&self, id: UserId, password: &PasswordHash) -> DomainResult<()> {
        let password = password.clone();
        self.modify(id, |user, now| user.update_password(password, now)).await
    }

    async fn mark_verified(&self, id: UserId) -> DomainResult<()> {
        self.modify(id, |user, now| user.verify(now)).await
    }

    async fn change_status(&self, id: UserId, status: UserStatus) -> DomainResult<()> {
        self.modify(id, |user, now| user.change_status(status, now)).await
    }

    async fn change_role(&self, id: UserId, role: UserRole) -> DomainResult<()> {
        self.modify(id, |user, now| user.change_role(role, now)).await
    }
}

#[derive(Default)]
struct SessionStore {
    sessions: HashMap<i64, UserSession>,
    next_id: i64,
}

/// Hash-map session store with read-time expiry.
pub struct InMemorySessionRepository {
    store: Arc<RwLock<SessionStore>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(RwLock::new(SessionStore {
                sessions: HashMap::new(),
                next_id: 1,
            })),
            clock,
        }
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: &UserSession) -> DomainResult<UserSession> {
        let mut store = self.store.write().await;
        if store
            .sessions
            .values()
            .any(|existing| existing.token() == session.token())
        {
            return Err(DomainError::conflict("session", "session token already exists"));
        }

        let id = SessionId::new(store.next_id);
        store.next_id += 1;

        let created = session.clone().with_id(id);
        store.sessions.insert(id.get(), created.clone());
        Ok(created)
    }

    async fn get_by_token(&self, token: &SessionToken) -> DomainResult<UserSession> {
        let now = self.clock.now();
        let store = self.store.read().await;
        let session = store
            .sessions
            .values()
            .find(|session| session.token() == *token)
            .ok_or_else(DomainError::session_not_found)?;

        if session.is_expired_at(now) {
            return Err(DomainError::session_past_expiry());
        }
        if !session.is_active() {
            return Err(DomainError::session_deactivated());
        }
        Ok(session.clone())
    }

    async fn get_by_user_id(&self, user_id: UserId, active_only: bool) -> DomainResult<Vec<UserSession>> {
        let now = self.clock.now();
        let store = self.store.read().await;
        let mut sessions: Vec<UserSession> = store
            .sessions
            .values()
            .filter(|session| session.user_id() == user_id)
            .filter(|session| !active_only || session.is_valid_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(sessions)
    }

    async fn update(&self, session: &UserSession) -> DomainResult<()> {
        let mut store = self.store.write().await;
        match store.sessions.get_mut(&session.id().get()) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(DomainError::session_not_found()),
        }
    }

    async fn delete(&self, id: SessionId) -> DomainResult<()> {
        let mut store = self.store.write().await;
        store
            .sessions
            .remove(&id.get())
            .map(|_| ())
            .ok_or_else(DomainError::session_not_found)
    }

    async fn deactivate_by_token(&self, token: &SessionToken) -> DomainResult<()> {
        let mut store = self.store.write().await;
        if let Some(session) = store
            .sessions
            .values_mut()
            .find(|session| session.token() == *token)
        {
            session.deactivate();
        }
        Ok(())
    }

    async fn deactivate_by_user_id(&self, user_id: UserId) -> DomainResult<u64> {
        let mut store = self.store.write().await;
        let mut closed = 0;
        for session in store.sessions.values_mut() {
            if session.user_id() == user_id && session.is_active() {
                session.deactivate();
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn cleanup_expired(&self) -> DomainResult<u64> {
        let now = self.clock.now();
        let mut store = self.store.write().await;
        let mut swept = 0;
        for session in store.sessions.values_mut() {
            if session.is_active() && session.is_expired_at(now) {
                session.deactivate();
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn get_active_sessions(&self, user_id: UserId) -> DomainResult<i64> {
        let now = self.clock.now();
        let store = self.store.read().await;
        let count = store
            .sessions
            .values()
            .filter(|session| session.user_id() == user_id && session.is_valid_at(now))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn get_session_stats(&self) -> DomainResult<SessionStats> {
        let now = self.clock.now();
        let store = self.store.read().await;

        let mut stats = SessionStats::default();
        for session in store.sessions.values() {
            stats.total_sessions += 1;
            if session.is_valid_at(now) {
                stats.active_sessions += 1;
            }
            if session.is_expired_at(now) {
                stats.expired_sessions += 1;
            }
            let age = now - session.created_at();
            if age <= Duration::hours(24) {
                stats.sessions_24h += 1;
            }
            if age <= Duration::days(7) {
                stats.sessions_7d += 1;
            }
            if age <= Duration::days(30) {
                stats.sessions_30d += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user::test_support::draft;
    use crate::entities::{DeviceInfo, SessionDuration};
    use crate::utils::ManualClock;
    use chrono::Utc;

    async fn seeded() -> (InMemoryUserRepository, User) {
        let repo = InMemoryUserRepository::new();
        let user = User::new(draft("alice@example.com", "alice"), Utc::now()).unwrap();
        let user = repo.create(&user).await.unwrap();
        (repo, user)
    }

    #[tokio::test]
    async fn test_create_assigns_ids() {
        let (repo, alice) = seeded().await;
        assert_eq!(alice.id(), UserId::new(1));

        let bob = User::new(draft("bob@example.com", "bob"), Utc::now()).unwrap();
        let bob = repo.create(&bob).await.unwrap();
        assert_eq!(bob.id(), UserId::new(2));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (repo, _) = seeded().await;
        let duplicate = User::new(draft("ALICE@example.com", "alice2"), Utc::now()).unwrap();
        let error = repo.create(&duplicate).await.unwrap_err();
        assert_eq!(error, DomainError::conflict("user", "email already exists"));
    }

    #[tokio::test]
    async fn test_duplicate_username_ignores_case() {
        let (repo, _) = seeded().await;
        let duplicate = User::new(draft("other@example.com", "ALICE"), Utc::now()).unwrap();
        assert!(repo.create(&duplicate).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_delete_is_logical_and_idempotent() {
        let (repo, alice) = seeded().await;
        repo.delete(alice.id()).await.unwrap();
        repo.delete(alice.id()).await.unwrap();

        let stored = repo.get_by_id(alice.id()).await.unwrap();
        assert_eq!(stored.status(), UserStatus::Inactive);
        assert!(repo.delete(UserId::new(404)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_verify_credentials_is_uniform() {
        let (repo, alice) = seeded().await;
        let wrong = PasswordHash::parse(&"z".repeat(64)).unwrap();

        let unknown = Email::parse("nobody@example.com").unwrap();
        assert_eq!(
            repo.verify_credentials(&unknown, alice.password_hash())
                .await
                .unwrap_err(),
            DomainError::invalid_credentials()
        );
        assert_eq!(
            repo.verify_credentials(alice.email(), &wrong).await.unwrap_err(),
            DomainError::invalid_credentials()
        );
        let found = repo
            .verify_credentials(alice.email(), alice.password_hash())
            .await
            .unwrap();
        assert_eq!(found.id(), alice.id());
    }

    #[tokio::test]
    async fn test_search_ranks_by_matches() {
        let (repo, _) = seeded().await;
        let mut draft = draft("carol@example.com", "carol");
        draft.first_name = crate::entities::FirstName::parse("Alice").unwrap();
        repo.create(&User::new(draft, Utc::now()).unwrap()).await.unwrap();

        let results = repo.search("alice", UserStatus::Active, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].username().as_str(), "alice");

        assert!(repo.search("", UserStatus::Active, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_sessions_expire_on_read() {
        let clock = Arc::new(ManualClock::default());
        let repo = InMemorySessionRepository::with_clock(clock.clone());
        let session = UserSession::start(
            UserId::new(1),
            None,
            "agent",
            DeviceInfo::default(),
            SessionDuration::Short,
            clock.now(),
        );
        let session = repo.create(&session).await.unwrap();
        assert!(repo.get_by_token(&session.token()).await.is_ok());

        clock.advance(Duration::hours(25));
        let error = repo.get_by_token(&session.token()).await.unwrap_err();
        assert!(error.is_session_past_expiry());

        assert_eq!(repo.cleanup_expired().await.unwrap(), 1);
        assert_eq!(repo.cleanup_expired().await.unwrap(), 0);
        // Swept sessions still report expiry, not logout.
        assert!(repo
            .get_by_token(&session.token())
            .await
            .unwrap_err()
            .is_session_past_expiry());
    }

    #[tokio::test]
    async fn test_logged_out_session_reports_deactivation() {
        let clock = Arc::new(ManualClock::default());
        let repo = InMemorySessionRepository::with_clock(clock.clone());
        let session = UserSession::start(
            UserId::new(1),
            None,
            "agent",
            DeviceInfo::default(),
            SessionDuration::Short,
            clock.now(),
        );
        let session = repo.create(&session).await.unwrap();
        repo.deactivate_by_token(&session.token()).await.unwrap();

        assert_eq!(
            repo.get_by_token(&session.token()).await.unwrap_err(),
            DomainError::session_deactivated()
        );
    }
}
