//! Engine error type and translation of driver failures.
//!
//! Every database-level failure is converted into a [`DbError`] carrying
//! both a friendly message and the original driver message/SQLSTATE, so the
//! frontend can show a simple banner and still offer the technical detail on
//! demand. Nothing is retried automatically and nothing is discarded.

use rust_i18n::t;
use serde::Serialize;
use thiserror::Error;

use super::types::{ErrorPosition, ErrorResult};

/// The translated form of a database failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedError {
    /// Friendly, display-ready message.
    pub message: String,
    /// The original driver message, preserved verbatim.
    pub technical_detail: String,
    /// SQLSTATE code, empty when the failure never reached the server.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<ErrorPosition>,
}

/// Sub-category of a constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintViolationKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

/// Sub-category of a transaction conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    Serialization,
    Deadlock,
}

/// Categorized database errors.
///
/// The first group of variants is produced by [`DbError::from_driver`] from
/// server-reported SQLSTATE codes; the trailing variants are engine-local
/// failures that never reached the server.
#[derive(Error, Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "details")]
pub enum DbError {
    #[error("{}", .0.message)]
    Syntax(TranslatedError),

    #[error("{}", .0.message)]
    Permission(TranslatedError),

    #[error("{}", error.message)]
    ConstraintViolation {
        kind: ConstraintViolationKind,
        error: TranslatedError,
    },

    #[error("{}", .0.message)]
    ObjectNotFound(TranslatedError),

    #[error("{}", .0.message)]
    DuplicateObject(TranslatedError),

    #[error("{}", .0.message)]
    TypeMismatch(TranslatedError),

    #[error("{}", .0.message)]
    Connection(TranslatedError),

    #[error("{}", .0.message)]
    ResourceExhausted(TranslatedError),

    #[error("{}", error.message)]
    TransactionConflict {
        kind: ConflictKind,
        error: TranslatedError,
    },

    #[error("{}", .0.message)]
    ProgramLimitExceeded(TranslatedError),

    #[error("{}", .0.message)]
    Unknown(TranslatedError),

    /// No connection configuration is registered under the database name.
    #[error("{0}")]
    DatabaseNotRegistered(String),

    /// A request failed validation before any statement was sent.
    #[error("{0}")]
    InvalidData(String),

    /// The pool could not hand out a working connection.
    #[error("{0}")]
    Pool(String),
}

impl DbError {
    /// Builds a categorized error from a driver failure.
    ///
    /// `sql` is the submitted statement text, used to convert the server's
    /// character offset into a line/column position.
    pub fn from_driver(err: &tokio_postgres::Error, sql: &str) -> DbError {
        let Some(db_err) = err.as_db_error() else {
            // The failure never produced a server error: broken socket,
            // closed connection, or a parameter conversion error.
            return DbError::Connection(TranslatedError {
                message: t!("db.connection_error", detail = err.to_string()).to_string(),
                technical_detail: err.to_string(),
                code: String::new(),
                position: None,
            });
        };

        let position = db_err.position().and_then(|p| match p {
            tokio_postgres::error::ErrorPosition::Original(offset) => {
                Some(offset_to_position(sql, *offset as usize))
            }
            tokio_postgres::error::ErrorPosition::Internal { .. } => None,
        });

        categorize(
            db_err.code().code(),
            db_err.message(),
            position,
        )
    }

    /// Returns the translated payload for driver-originated errors.
    pub fn translated(&self) -> Option<&TranslatedError> {
        match self {
            DbError::Syntax(e)
            | DbError::Permission(e)
            | DbError::ObjectNotFound(e)
            | DbError::DuplicateObject(e)
            | DbError::TypeMismatch(e)
            | DbError::Connection(e)
            | DbError::ResourceExhausted(e)
            | DbError::ProgramLimitExceeded(e)
            | DbError::Unknown(e)
            | DbError::ConstraintViolation { error: e, .. }
            | DbError::TransactionConflict { error: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Flattens the error into the result shape sent to the frontend.
    pub fn to_result(&self, duration_ms: u64) -> ErrorResult {
        match self.translated() {
            Some(e) => ErrorResult {
                message: e.message.clone(),
                technical_detail: e.technical_detail.clone(),
                code: e.code.clone(),
                position: e.position,
                duration_ms,
            },
            None => ErrorResult {
                message: self.to_string(),
                technical_detail: self.to_string(),
                code: String::new(),
                position: None,
                duration_ms,
            },
        }
    }
}

/// Maps a SQLSTATE code and message to a categorized [`DbError`].
///
/// Unmapped codes fall back to [`DbError::Unknown`] with the original
/// message carried unmodified.
pub(crate) fn categorize(
    code: &str,
    message: &str,
    position: Option<ErrorPosition>,
) -> DbError {
    let translated = |key: &str| TranslatedError {
        message: t!(key, detail = message).to_string(),
        technical_detail: message.to_string(),
        code: code.to_string(),
        position,
    };

    match code {
        "23505" => DbError::ConstraintViolation {
            kind: ConstraintViolationKind::Unique,
            error: translated("db.unique_violation"),
        },
        "23503" => DbError::ConstraintViolation {
            kind: ConstraintViolationKind::ForeignKey,
            error: translated("db.foreign_key_violation"),
        },
        "23502" => DbError::ConstraintViolation {
            kind: ConstraintViolationKind::NotNull,
            error: translated("db.not_null_violation"),
        },
        "23514" => DbError::ConstraintViolation {
            kind: ConstraintViolationKind::Check,
            error: translated("db.check_violation"),
        },
        "42P01" | "42703" => DbError::ObjectNotFound(translated("db.object_not_found")),
        "42P07" => DbError::DuplicateObject(translated("db.duplicate_object")),
        "42601" => DbError::Syntax(translated("db.syntax_error")),
        "42501" => DbError::Permission(translated("db.permission_denied")),
        "42804" | "22P02" => DbError::TypeMismatch(translated("db.type_mismatch")),
        "40001" => DbError::TransactionConflict {
            kind: ConflictKind::Serialization,
            error: translated("db.serialization_failure"),
        },
        "40P01" => DbError::TransactionConflict {
            kind: ConflictKind::Deadlock,
            error: translated("db.deadlock_detected"),
        },
        _ if code.starts_with("08") => DbError::Connection(translated("db.connection_error")),
        _ if code.starts_with("53") => {
            DbError::ResourceExhausted(translated("db.resource_exhausted"))
        }
        _ if code.starts_with("54") => {
            DbError::ProgramLimitExceeded(translated("db.program_limit_exceeded"))
        }
        _ => DbError::Unknown(TranslatedError {
            // No friendlier text to offer, keep the original.
            message: message.to_string(),
            technical_detail: message.to_string(),
            code: code.to_string(),
            position,
        }),
    }
}

/// Converts a 1-based character offset into a 1-based line/column pair by
/// counting newlines up to the offset.
pub(crate) fn offset_to_position(sql: &str, offset: usize) -> ErrorPosition {
    let mut line = 1;
    let mut column = 1;
    for (i, ch) in sql.chars().enumerate() {
        if i + 1 >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    ErrorPosition { line, column }
}
