//! SQLite adapters. Timestamps are stored as fixed-width RFC 3339 text so
//! that string order is time order.

mod rows;
mod session_repository;
mod user_repository;

pub use session_repository::SqliteSessionRepository;
pub use user_repository::SqliteUserRepository;
