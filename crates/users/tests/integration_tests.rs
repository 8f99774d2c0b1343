//! Integration tests for the user service over the in-memory repositories

use chrono::Duration;
use std::sync::Arc;
use template_sqlc_users::{
    Clock, CreateUserRequest, DomainError, EventType, InMemoryEventPublisher,
    InMemorySessionRepository, InMemoryUserRepository, ManualClock, SessionDuration,
    UpdateUserRequest, UserRole, UserService, UserStatus,
};
use template_sqlc_users::types::EventData;

const PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g";

struct TestContext {
    service: Arc<UserService>,
    events: Arc<InMemoryEventPublisher>,
    clock: Arc<ManualClock>,
}

impl TestContext {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(InMemoryEventPublisher::new());
        let service = UserService::with_clock(
            Arc::new(InMemoryUserRepository::with_clock(clock.clone())),
            Arc::new(InMemorySessionRepository::with_clock(clock.clone())),
            events.clone(),
            clock.clone(),
        );
        Self {
            service: Arc::new(service),
            events,
            clock,
        }
    }

    fn with_login_duration(duration: SessionDuration) -> Self {
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(InMemoryEventPublisher::new());
        let service = UserService::with_clock(
            Arc::new(InMemoryUserRepository::with_clock(clock.clone())),
            Arc::new(InMemorySessionRepository::with_clock(clock.clone())),
            events.clone(),
            clock.clone(),
        )
        .login_duration(duration);
        Self {
            service: Arc::new(service),
            events,
            clock,
        }
    }

    fn event_types(&self) -> Vec<EventType> {
        self.events.events().iter().map(|e| e.event_type).collect()
    }
}

fn create_request(email: &str, username: &str) -> CreateUserRequest {
    CreateUserRequest {
        email: email.to_string(),
        username: username.to_string(),
        password_hash: PASSWORD_HASH.to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        status: None,
        role: None,
        tags: vec![],
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn test_create_user_defaults_and_duplicate_email() {
    let ctx = TestContext::new();

    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    assert_eq!(user.status(), UserStatus::Active);
    assert_eq!(user.role(), UserRole::User);
    assert!(!user.is_verified());

    let error = ctx
        .service
        .create_user(create_request("test@example.com", "testuser2"))
        .await
        .unwrap_err();
    assert!(error.is_conflict());

    let events = ctx.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::UserCreated);
    assert_eq!(events[0].user_id, Some(user.uuid()));
}

#[tokio::test]
async fn test_create_user_rejects_invalid_email() {
    let ctx = TestContext::new();

    let error = ctx
        .service
        .create_user(create_request("invalid-email", "testuser1"))
        .await
        .unwrap_err();
    assert_eq!(error.field(), Some("email"));
    assert!(ctx.events.is_empty());
    assert_eq!(ctx.service.get_user_stats().await.unwrap().total_users, 0);
}

#[tokio::test]
async fn test_duplicate_username_differs_only_in_case() {
    let ctx = TestContext::new();
    ctx.service
        .create_user(create_request("one@example.com", "TestUser"))
        .await
        .unwrap();

    let error = ctx
        .service
        .create_user(create_request("two@example.com", "testuser"))
        .await
        .unwrap_err();
    assert_eq!(error, DomainError::conflict("user", "username already exists"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_yield_one_winner() {
    let ctx = TestContext::new();

    let attempts = (0..8).map(|i| {
        let service = ctx.service.clone();
        tokio::spawn(async move {
            service
                .create_user(create_request("Race@Example.com", &format!("racer{i}")))
                .await
        })
    });

    let mut created = 0;
    let mut conflicts = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        match attempt.await.unwrap() {
            Ok(_) => created += 1,
            Err(error) if error.is_conflict() => conflicts += 1,
            Err(error) => panic!("unexpected error: {error}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn test_update_user_tracks_changes() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    ctx.events.clear();

    let mut request = UpdateUserRequest::new(user.id(), "admin");
    request.first_name = Some("Grace".to_string());
    request.last_name = Some("User".to_string());
    request.tags = Some(vec!["beta".to_string()]);

    let updated = ctx.service.update_user(request).await.unwrap();
    assert_eq!(updated.full_name(), "Grace User");
    assert_eq!(updated.tags(), &["beta".to_string()]);

    let events = ctx.events.events();
    assert_eq!(events.len(), 1);
    match &events[0].data {
        EventData::UserUpdated(data) => {
            let fields: Vec<&str> = data.changes.keys().map(String::as_str).collect();
            assert_eq!(fields, vec!["first_name", "tags"]);
            assert_eq!(data.changes["first_name"].old, "Test");
            assert_eq!(data.changes["first_name"].new, "Grace");
            assert_eq!(data.updated_by, "admin");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_mutations_are_stamped_by_the_injected_clock() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    let created_at = ctx.clock.now();
    assert_eq!(user.created_at(), created_at);

    ctx.clock.advance(Duration::minutes(10));
    let mut request = UpdateUserRequest::new(user.id(), "admin");
    request.first_name = Some("Grace".to_string());
    let updated = ctx.service.update_user(request).await.unwrap();
    assert_eq!(updated.created_at(), created_at);
    assert_eq!(updated.updated_at(), created_at + Duration::minutes(10));

    ctx.clock.advance(Duration::hours(1));
    let verified = ctx.service.verify_user(user.id(), "email").await.unwrap();
    assert_eq!(verified.updated_at(), created_at + Duration::minutes(70));
    assert_eq!(
        ctx.service.get_user(user.id()).await.unwrap().updated_at(),
        verified.updated_at()
    );
}

#[tokio::test]
async fn test_update_without_changes_emits_nothing() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    ctx.events.clear();

    let mut request = UpdateUserRequest::new(user.id(), "admin");
    request.first_name = Some(" Test ".to_string());
    let unchanged = ctx.service.update_user(request).await.unwrap();

    assert_eq!(unchanged.updated_at(), user.updated_at());
    assert!(ctx.events.is_empty());
}

#[tokio::test]
async fn test_authenticate_wrong_password_is_uniform() {
    let ctx = TestContext::new();
    ctx.service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    ctx.events.clear();

    let wrong = "b".repeat(64);
    let known = ctx
        .service
        .authenticate_user("test@example.com", &wrong, "10.0.0.1", "agent")
        .await
        .unwrap_err();
    let unknown = ctx
        .service
        .authenticate_user("nobody@example.com", &wrong, "10.0.0.1", "agent")
        .await
        .unwrap_err();

    assert_eq!(known, DomainError::invalid_credentials());
    assert_eq!(known, unknown);
    assert_eq!(
        ctx.event_types(),
        vec![EventType::UserLoginFailed, EventType::UserLoginFailed]
    );
    assert_eq!(ctx.service.get_session_stats().await.unwrap().total_sessions, 0);
}

#[tokio::test]
async fn test_authenticate_suspended_user_creates_no_session() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    ctx.service
        .change_user_status(user.id(), "suspended", "moderator")
        .await
        .unwrap();
    ctx.events.clear();

    let error = ctx
        .service
        .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
        .await
        .unwrap_err();
    assert_eq!(error, DomainError::account_suspended());
    assert!(ctx
        .service
        .get_user_sessions(user.id(), false)
        .await
        .unwrap()
        .is_empty());

    let events = ctx.events.events();
    match &events[0].data {
        EventData::Login(data) => {
            assert!(!data.success);
            assert_eq!(data.user_id, Some(user.uuid()));
            assert_eq!(data.reason.map(|r| r.as_str()), Some("account_suspended"));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_every_non_active_status_blocks_login() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();

    for status in ["inactive", "pending", "suspended"] {
        ctx.service
            .change_user_status(user.id(), status, "system")
            .await
            .unwrap();
        let error = ctx
            .service
            .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "authorization", "status {status}");
    }
}

#[tokio::test]
async fn test_login_then_verify_then_logout() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();

    let login = ctx
        .service
        .authenticate_user("Test@Example.com", PASSWORD_HASH, "10.0.0.1", "agent")
        .await
        .unwrap();
    assert_eq!(login.user.id(), user.id());
    assert_eq!(
        login.session.expires_at() - login.session.created_at(),
        Duration::days(7)
    );
    assert!(ctx
        .service
        .get_user(user.id())
        .await
        .unwrap()
        .last_login_at()
        .is_some());

    let token = login.session.token().to_string();
    let verified = ctx.service.verify_session(&token).await.unwrap();
    assert_eq!(verified.user.id(), user.id());

    ctx.service.logout(&token).await.unwrap();
    ctx.service.logout(&token).await.unwrap();
    assert!(ctx.service.verify_session(&token).await.is_err());

    assert_eq!(
        ctx.event_types(),
        vec![EventType::UserCreated, EventType::UserLogin, EventType::UserLogout]
    );
}

#[tokio::test]
async fn test_session_expires_after_its_duration() {
    let ctx = TestContext::with_login_duration(SessionDuration::Short);
    ctx.service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    let login = ctx
        .service
        .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
        .await
        .unwrap();
    let token = login.session.token().to_string();

    ctx.clock.advance(Duration::hours(25));
    let error = ctx.service.verify_session(&token).await.unwrap_err();
    assert_eq!(error, DomainError::session_expired());

    assert_eq!(ctx.service.cleanup_expired_sessions().await.unwrap(), 1);
    assert_eq!(ctx.service.cleanup_expired_sessions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_swept_session_still_reports_expiry() {
    let ctx = TestContext::with_login_duration(SessionDuration::Short);
    ctx.service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    let login = ctx
        .service
        .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
        .await
        .unwrap();
    let token = login.session.token().to_string();

    ctx.clock.advance(Duration::hours(25));
    let before = ctx.service.verify_session(&token).await.unwrap_err();
    assert_eq!(ctx.service.cleanup_expired_sessions().await.unwrap(), 1);
    let after = ctx.service.verify_session(&token).await.unwrap_err();

    assert_eq!(before, DomainError::session_expired());
    assert_eq!(after, DomainError::session_expired());
}

#[tokio::test]
async fn test_session_outliving_account_is_rejected() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    let login = ctx
        .service
        .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
        .await
        .unwrap();

    ctx.service
        .change_user_status(user.id(), "inactive", "admin")
        .await
        .unwrap();

    let error = ctx
        .service
        .verify_session(&login.session.token().to_string())
        .await
        .unwrap_err();
    assert_eq!(error, DomainError::account_inactive());
}

#[tokio::test]
async fn test_verify_unknown_token() {
    let ctx = TestContext::new();
    let error = ctx
        .service
        .verify_session("00000000-0000-0000-0000-000000000000")
        .await
        .unwrap_err();
    assert_eq!(error, DomainError::session_not_found());

    let error = ctx.service.verify_session("nope").await.unwrap_err();
    assert_eq!(error, DomainError::invalid_session_token());
}

#[tokio::test]
async fn test_change_role_publishes_old_and_new() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    ctx.events.clear();

    let updated = ctx
        .service
        .change_user_role(user.id(), "moderator", "admin")
        .await
        .unwrap();
    assert_eq!(updated.role(), UserRole::Moderator);

    let error = ctx
        .service
        .change_user_role(user.id(), "superuser", "admin")
        .await
        .unwrap_err();
    assert_eq!(error.field(), Some("role"));

    let events = ctx.events.events();
    assert_eq!(events.len(), 1);
    match &events[0].data {
        EventData::RoleChanged(data) => {
            assert_eq!(data.old_role, UserRole::User);
            assert_eq!(data.new_role, UserRole::Moderator);
            assert_eq!(data.changed_by, "admin");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_closes_sessions_once() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    let login = ctx
        .service
        .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
        .await
        .unwrap();
    ctx.events.clear();

    ctx.service.delete_user(user.id(), "admin").await.unwrap();
    ctx.service.delete_user(user.id(), "admin").await.unwrap();

    assert_eq!(ctx.event_types(), vec![EventType::UserDeleted]);
    assert_eq!(
        ctx.service.get_user(user.id()).await.unwrap().status(),
        UserStatus::Inactive
    );
    assert!(ctx
        .service
        .verify_session(&login.session.token().to_string())
        .await
        .is_err());
}

#[tokio::test]
async fn test_verify_and_password_change() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();

    assert!(ctx.service.verify_user(user.id(), "email").await.unwrap().is_verified());
    ctx.service.verify_user(user.id(), "email").await.unwrap();

    let new_hash = "c".repeat(64);
    ctx.service
        .change_password(user.id(), &new_hash, "self")
        .await
        .unwrap();
    assert!(ctx
        .service
        .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
        .await
        .is_err());
    assert!(ctx
        .service
        .authenticate_user("test@example.com", &new_hash, "10.0.0.1", "agent")
        .await
        .is_ok());

    let types = ctx.event_types();
    assert_eq!(
        types.iter().filter(|t| **t == EventType::UserVerified).count(),
        1
    );
    assert!(types.contains(&EventType::PasswordChanged));
}

#[tokio::test]
async fn test_logout_everywhere() {
    let ctx = TestContext::new();
    let user = ctx
        .service
        .create_user(create_request("test@example.com", "testuser1"))
        .await
        .unwrap();
    for _ in 0..3 {
        ctx.service
            .authenticate_user("test@example.com", PASSWORD_HASH, "10.0.0.1", "agent")
            .await
            .unwrap();
    }

    assert_eq!(ctx.service.logout_everywhere(user.id()).await.unwrap(), 3);
    assert!(ctx
        .service
        .get_user_sessions(user.id(), true)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(ctx.service.get_user_sessions(user.id(), false).await.unwrap().len(), 3);
}
