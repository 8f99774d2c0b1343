//! Business logic for the user domain.
//!
//! Services coordinate repositories and publish events; they own no
//! storage of their own.

pub mod event_publisher;
pub mod user_service;

pub use event_publisher::{ChannelEventPublisher, EventPublisher, InMemoryEventPublisher};
pub use user_service::{AuthenticatedUser, UserService};
