//! # Template SQLC Users Crate
//!
//! Storage-agnostic user management core: value objects and entities,
//! repository contracts, the user service, and the events it publishes.
//! Engine specific adapters live in `template-sqlc-database`.
//!
//! ## Architecture
//!
//! - **Entities**: Domain models (User, UserSession, value objects)
//! - **Repositories**: Persistence contracts plus in-memory implementations
//! - **Services**: `UserService` and event publishers
//! - **Types**: Errors, events, and requests
//! - **Utils**: Validation helpers and the clock
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use template_sqlc_users::{
//!     CreateUserRequest, InMemoryEventPublisher, InMemorySessionRepository,
//!     InMemoryUserRepository, UserService,
//! };
//!
//! # async fn run() -> Result<(), template_sqlc_users::DomainError> {
//! let service = UserService::new(
//!     Arc::new(InMemoryUserRepository::new()),
//!     Arc::new(InMemorySessionRepository::new()),
//!     Arc::new(InMemoryEventPublisher::new()),
//! );
//! let user = service
//!     .create_user(CreateUserRequest {
//!         email: "ada@example.com".into(),
//!         username: "ada".into(),
//!         password_hash: "x".repeat(64),
//!         first_name: "Ada".into(),
//!         last_name: "Lovelace".into(),
//!         status: None,
//!         role: None,
//!         tags: vec![],
//!         metadata: Default::default(),
//!     })
//!     .await?;
//! assert!(user.is_active());
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod repositories;
pub mod services;
pub mod types;
pub mod utils;

pub use entities::{
    DeviceInfo, Email, FirstName, LastName, Metadata, NewUser, PasswordHash, SessionDuration,
    SessionId, SessionRecord, SessionStats, SessionToken, User, UserId, UserRecord, UserRole,
    UserSession, UserStats, UserStatus, Username,
};
pub use repositories::{
    InMemorySessionRepository, InMemoryUserRepository, SessionRepository, UserRepository,
};
pub use services::{
    AuthenticatedUser, ChannelEventPublisher, EventPublisher, InMemoryEventPublisher, UserService,
};
pub use types::{
    CreateUserRequest, DomainError, DomainResult, EventType, PublishError, UpdateUserRequest,
    UserEvent,
};
pub use utils::{Clock, ManualClock, SystemClock};
