//! PostgreSQL adapters over native `UUID`, `JSONB`, `TEXT[]` and
//! `TIMESTAMPTZ` columns.

mod rows;
mod session_repository;
mod user_repository;

pub use session_repository::PostgresSessionRepository;
pub use user_repository::PostgresUserRepository;
