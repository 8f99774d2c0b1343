//! Repository-level tests for the in-memory adapters

use chrono::{Duration, Utc};
use std::sync::Arc;
use template_sqlc_users::{
    DeviceInfo, Email, FirstName, LastName, ManualClock, Metadata, NewUser, PasswordHash,
    SessionDuration, SessionId, SessionRepository, User, UserId, UserRepository, UserRole,
    UserSession, UserStatus, Username, InMemorySessionRepository, InMemoryUserRepository,
};

fn new_user(email: &str, username: &str, minutes_ago: i64) -> User {
    let draft = NewUser {
        email: Email::parse(email).unwrap(),
        username: Username::parse(username).unwrap(),
        password_hash: PasswordHash::parse(&"p".repeat(64)).unwrap(),
        first_name: FirstName::parse("Test").unwrap(),
        last_name: LastName::parse("User").unwrap(),
        status: UserStatus::Active,
        role: UserRole::User,
        metadata: Metadata::new(),
        tags: vec![],
    };
    User::new(draft, Utc::now() - Duration::minutes(minutes_ago)).unwrap()
}

fn tagged(mut user: User, tags: &[&str]) -> User {
    for tag in tags {
        user.add_tag(tag, Utc::now()).unwrap();
    }
    user
}

#[tokio::test]
async fn test_repository_crud_operations() {
    let repo = InMemoryUserRepository::new();

    let created = repo.create(&new_user("crud@example.com", "crud", 0)).await.unwrap();
    assert!(created.id().get() > 0);

    let by_uuid = repo.get_by_uuid(created.uuid()).await.unwrap();
    let by_email = repo
        .get_by_email(&Email::parse("CRUD@example.com").unwrap())
        .await
        .unwrap();
    let by_username = repo
        .get_by_username(&Username::parse("CRUD").unwrap())
        .await
        .unwrap();
    assert_eq!(by_uuid, created);
    assert_eq!(by_email, created);
    assert_eq!(by_username, created);

    let mut changed = created.clone();
    changed
        .update_profile(Some(FirstName::parse("Ada").unwrap()), None, None, None, Utc::now())
        .unwrap();
    repo.update(&changed).await.unwrap();
    assert_eq!(
        repo.get_by_id(created.id()).await.unwrap().first_name().as_str(),
        "Ada"
    );

    let ghost = new_user("ghost@example.com", "ghost", 0).with_id(UserId::new(999));
    assert!(repo.update(&ghost).await.unwrap_err().is_not_found());
    assert!(repo.get_by_id(UserId::new(999)).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_repository_status_and_role_operations() {
    let repo = InMemoryUserRepository::new();
    let user = repo.create(&new_user("ops@example.com", "ops", 0)).await.unwrap();

    repo.suspend(user.id()).await.unwrap();
    assert_eq!(repo.get_by_id(user.id()).await.unwrap().status(), UserStatus::Suspended);
    repo.activate(user.id()).await.unwrap();
    repo.change_role(user.id(), UserRole::Admin).await.unwrap();
    repo.mark_verified(user.id()).await.unwrap();

    let stored = repo.get_by_id(user.id()).await.unwrap();
    assert!(stored.is_active());
    assert!(stored.is_admin());
    assert!(stored.is_verified());

    let missing = UserId::new(404);
    assert!(repo.deactivate(missing).await.unwrap_err().is_not_found());
    assert!(repo
        .change_role(missing, UserRole::User)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_repository_list_is_newest_first_and_paged() {
    let repo = InMemoryUserRepository::new();
    for (i, minutes_ago) in [30, 10, 20].into_iter().enumerate() {
        repo.create(&new_user(
            &format!("u{i}@example.com"),
            &format!("user{i}"),
            minutes_ago,
        ))
        .await
        .unwrap();
    }

    let all = repo.list(UserStatus::Active, 10, 0).await.unwrap();
    let names: Vec<&str> = all.iter().map(|u| u.username().as_str()).collect();
    assert_eq!(names, vec!["user1", "user2", "user0"]);

    let second_page = repo.list(UserStatus::Active, 2, 2).await.unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].username().as_str(), "user0");

    assert!(repo.list(UserStatus::Suspended, 10, 0).await.unwrap().is_empty());
    assert!(repo.list(UserStatus::Active, 0, 0).await.unwrap_err().is_validation());
    assert!(repo.list(UserStatus::Active, 1001, 0).await.is_err());
    assert!(repo.list(UserStatus::Active, 10, -1).await.is_err());
}

#[tokio::test]
async fn test_repository_search_by_tags_uses_overlap() {
    let repo = InMemoryUserRepository::new();
    repo.create(&tagged(new_user("a@example.com", "alpha", 3), &["rust", "go"]))
        .await
        .unwrap();
    repo.create(&tagged(new_user("b@example.com", "bravo", 2), &["python"]))
        .await
        .unwrap();
    repo.create(&tagged(new_user("c@example.com", "charlie", 1), &["go"]))
        .await
        .unwrap();

    let tags = vec!["go".to_string(), "elixir".to_string()];
    let found = repo
        .search_by_tags(&tags, UserStatus::Active, 10, 0)
        .await
        .unwrap();
    let names: Vec<&str> = found.iter().map(|u| u.username().as_str()).collect();
    assert_eq!(names, vec!["charlie", "alpha"]);

    let too_many: Vec<String> = (0..11).map(|i| format!("t{i}")).collect();
    assert!(repo
        .search_by_tags(&too_many, UserStatus::Active, 10, 0)
        .await
        .unwrap_err()
        .is_validation());
}

#[tokio::test]
async fn test_repository_statistics() {
    let repo = InMemoryUserRepository::new();

    let empty = repo.get_stats().await.unwrap();
    assert_eq!(empty.total_users, 0);
    assert_eq!(empty.active_percentage, 0.0);
    assert!(repo.count_by_status().await.unwrap().is_empty());

    let a = repo.create(&new_user("a@example.com", "alpha", 0)).await.unwrap();
    let b = repo.create(&new_user("b@example.com", "bravo", 0)).await.unwrap();
    repo.create(&new_user("c@example.com", "charlie", 60 * 24 * 40))
        .await
        .unwrap();
    repo.create(&new_user("d@example.com", "delta", 0)).await.unwrap();
    repo.suspend(a.id()).await.unwrap();
    repo.mark_verified(b.id()).await.unwrap();

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total_users, 4);
    assert_eq!(stats.active_users, 3);
    assert_eq!(stats.suspended_users, 1);
    assert_eq!(stats.verified_users, 1);
    assert_eq!(stats.new_users_30d, 3);
    assert_eq!(stats.active_percentage, 75.0);

    let counts = repo.count_by_status().await.unwrap();
    assert_eq!(counts[&UserStatus::Active], 3);
    assert_eq!(counts[&UserStatus::Suspended], 1);
}

fn session_for(user_id: i64, duration: SessionDuration, clock: &ManualClock) -> UserSession {
    use template_sqlc_users::Clock;
    UserSession::start(
        UserId::new(user_id),
        "192.168.1.20".parse().ok(),
        "integration-agent",
        DeviceInfo::from_user_agent("integration-agent"),
        duration,
        clock.now(),
    )
}

#[tokio::test]
async fn test_session_repository_lifecycle() {
    let clock = Arc::new(ManualClock::default());
    let repo = InMemorySessionRepository::with_clock(clock.clone());

    let short = repo
        .create(&session_for(1, SessionDuration::Short, &clock))
        .await
        .unwrap();
    let long = repo
        .create(&session_for(1, SessionDuration::Long, &clock))
        .await
        .unwrap();
    repo.create(&session_for(2, SessionDuration::Medium, &clock))
        .await
        .unwrap();

    assert_eq!(repo.get_active_sessions(UserId::new(1)).await.unwrap(), 2);

    clock.advance(Duration::hours(25));
    assert!(repo
        .get_by_token(&short.token())
        .await
        .unwrap_err()
        .is_session_past_expiry());
    assert_eq!(repo.get_active_sessions(UserId::new(1)).await.unwrap(), 1);
    assert_eq!(
        repo.get_by_user_id(UserId::new(1), true).await.unwrap()[0].id(),
        long.id()
    );

    let stats = repo.get_session_stats().await.unwrap();
    assert_eq!(stats.total_sessions, 3);
    assert_eq!(stats.active_sessions, 2);
    assert_eq!(stats.expired_sessions, 1);

    assert_eq!(repo.cleanup_expired().await.unwrap(), 1);
    assert_eq!(repo.cleanup_expired().await.unwrap(), 0);

    assert_eq!(repo.deactivate_by_user_id(UserId::new(1)).await.unwrap(), 1);
    assert_eq!(repo.deactivate_by_user_id(UserId::new(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_session_repository_edge_cases() {
    let clock = Arc::new(ManualClock::default());
    let repo = InMemorySessionRepository::with_clock(clock.clone());

    let unknown = template_sqlc_users::SessionToken::generate();
    repo.deactivate_by_token(&unknown).await.unwrap();
    assert!(repo.get_by_token(&unknown).await.unwrap_err().is_not_found());
    assert!(repo.delete(SessionId::new(42)).await.unwrap_err().is_not_found());

    let session = repo
        .create(&session_for(5, SessionDuration::Medium, &clock))
        .await
        .unwrap();
    assert!(repo.create(&session).await.unwrap_err().is_conflict());

    let mut extended = session.clone();
    extended.extend(Duration::days(1));
    repo.update(&extended).await.unwrap();
    assert_eq!(
        repo.get_by_token(&session.token()).await.unwrap().expires_at(),
        session.expires_at() + Duration::days(1)
    );

    repo.delete(session.id()).await.unwrap();
    assert!(repo.get_by_token(&session.token()).await.is_err());
}
