//! Translation of driver errors into domain errors.
//!
//! Constraint violations are recognised by the kind sqlx reports, falling
//! back to each engine's native codes:
//!
//! | constraint  | SQLite (extended) | PostgreSQL | MySQL      |
//! |-------------|-------------------|------------|------------|
//! | unique      | 2067, 1555        | 23505      | 1062       |
//! | foreign key | 787               | 23503      | 1451, 1452 |
//! | check       | 275               | 23514      | 3819       |
//! | not null    | 1299              | 23502      | 1048       |
//! | too long    |                   | 22001      | 1406       |

use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::mysql::MySqlDatabaseError;
use std::future::Future;
use std::time::Duration;
use template_sqlc_users::{DomainError, DomainResult};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
    NotNull,
    TooLong,
}

/// Classify a native error code. SQLite reports extended result codes,
/// PostgreSQL SQLSTATE values and MySQL server error numbers.
pub fn classify_code(code: &str) -> Option<ConstraintKind> {
    match code {
        "2067" | "1555" | "23505" | "1062" => Some(ConstraintKind::Unique),
        "787" | "23503" | "1451" | "1452" => Some(ConstraintKind::ForeignKey),
        "275" | "23514" | "3819" => Some(ConstraintKind::Check),
        "1299" | "23502" | "1048" => Some(ConstraintKind::NotNull),
        "22001" | "1406" => Some(ConstraintKind::TooLong),
        _ => None,
    }
}

fn classify(db: &dyn DatabaseError) -> Option<ConstraintKind> {
    match db.kind() {
        ErrorKind::UniqueViolation => return Some(ConstraintKind::Unique),
        ErrorKind::ForeignKeyViolation => return Some(ConstraintKind::ForeignKey),
        ErrorKind::CheckViolation => return Some(ConstraintKind::Check),
        ErrorKind::NotNullViolation => return Some(ConstraintKind::NotNull),
        _ => {}
    }

    // MySQL's SQLSTATE 23000 covers several constraints; its error number
    // does not.
    if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
        return classify_code(&mysql.number().to_string());
    }
    if let Some(kind) = db.code().as_deref().and_then(classify_code) {
        return Some(kind);
    }
    db.message()
        .contains("UNIQUE constraint failed")
        .then_some(ConstraintKind::Unique)
}

/// Name the column a unique violation is about, from the constraint name or
/// message the engine reported.
pub fn conflicting_field(message: &str) -> Option<&'static str> {
    let message = message.to_ascii_lowercase();
    ["email", "username", "token", "uuid"]
        .into_iter()
        .find(|field| message.contains(field))
}

/// Map a constraint violation to its domain error.
pub fn constraint_error(kind: ConstraintKind, resource: &str, message: &str) -> DomainError {
    let field = conflicting_field(message);
    match kind {
        ConstraintKind::Unique => {
            let subject = match field {
                Some("token") => "session token".to_string(),
                Some(field) => field.to_string(),
                None => resource.to_string(),
            };
            DomainError::conflict(resource, format!("{subject} already exists"))
        }
        ConstraintKind::ForeignKey => DomainError::validation(
            field.unwrap_or(resource),
            "referenced record does not exist",
        ),
        ConstraintKind::Check => {
            DomainError::validation(field.unwrap_or(resource), "value violates a check constraint")
        }
        ConstraintKind::NotNull => {
            DomainError::validation(field.unwrap_or(resource), "required value is missing")
        }
        ConstraintKind::TooLong => {
            DomainError::validation(field.unwrap_or(resource), "value is too long to store")
        }
    }
}

/// Translate any sqlx error. Driver details never leave this crate except
/// as the source of an `Internal` error.
pub fn translate(err: sqlx::Error, resource: &str) -> DomainError {
    match err {
        sqlx::Error::RowNotFound => {
            DomainError::not_found(resource, format!("{resource} not found"))
        }
        sqlx::Error::Database(db) => match classify(db.as_ref()) {
            Some(kind) => constraint_error(kind, resource, db.message()),
            None => {
                error!(resource, code = ?db.code(), message = db.message(), "database error");
                DomainError::internal_with("database error", sqlx::Error::Database(db))
            }
        },
        sqlx::Error::PoolTimedOut => {
            warn!(resource, "timed out acquiring a database connection");
            DomainError::internal_with("database pool timed out", sqlx::Error::PoolTimedOut)
        }
        other => {
            error!(resource, error = %other, "database failure");
            DomainError::internal_with("database failure", other)
        }
    }
}

/// Run one storage call under `limit`, translating its error. Dropping the
/// returned future cancels the call.
pub async fn bounded<T, F>(limit: Duration, resource: &str, query: F) -> DomainResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result.map_err(|err| translate(err, resource)),
        Err(_) => {
            warn!(resource, timeout_ms = limit.as_millis() as u64, "database operation timed out");
            Err(DomainError::internal("database operation timed out"))
        }
    }
}
