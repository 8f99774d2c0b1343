//! MySQL adapters. InnoDB reports zero affected rows for an update that
//! changes nothing, so single-row writes fall back to an existence check
//! before reporting `NotFound`.

mod rows;
mod session_repository;
mod user_repository;

pub use session_repository::MySqlSessionRepository;
pub use user_repository::MySqlUserRepository;
