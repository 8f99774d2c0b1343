//! Domain entities and value objects.
//!
//! Pure domain types with no storage concerns. Adapters rebuild them through
//! [`UserRecord`] and [`SessionRecord`].

pub mod session;
pub mod stats;
pub mod user;
pub mod values;

pub use session::{DeviceInfo, SessionDuration, SessionId, SessionRecord, SessionToken, UserSession};
pub use stats::{SessionStats, UserStats};
pub use user::{NewUser, User, UserRecord};
pub use values::{
    normalize_tag, normalize_tags, Email, FirstName, LastName, Metadata, PasswordHash, UserId,
    UserRole, UserStatus, Username,
};
