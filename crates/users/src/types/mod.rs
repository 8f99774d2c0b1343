//! Shared types: errors, events, and service requests.

pub mod errors;
pub mod events;
pub mod requests;

pub use errors::{BoxError, DomainError, PublishError};
pub use events::{EventData, EventType, FieldChange, LoginFailureReason, UserEvent, EVENT_VERSION};
pub use requests::{CreateUserRequest, UpdateUserRequest};

pub type DomainResult<T> = Result<T, DomainError>;
