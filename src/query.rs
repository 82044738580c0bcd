// Copyright 2023 Remi Bernotavicius

use diesel::result::DatabaseErrorKind;
use std::fmt;

#[derive(Debug)]
pub enum QueryError {
    NotFound(String),
    AlreadyExists(String),
    Validation(String),
    Database(diesel::result::Error),
}

impl QueryError {
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn already_exists(what: impl fmt::Display) -> Self {
        Self::AlreadyExists(what.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::AlreadyExists(what) => write!(f, "already exists: {what}"),
            Self::Validation(message) => write!(f, "invalid input: {message}"),
            Self::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<diesel::result::Error> for QueryError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::Error::*;

        match e {
            NotFound => Self::NotFound("record".into()),
            DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::AlreadyExists(info.message().into())
            }
            e => Self::Database(e),
        }
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Escapes `LIKE` wildcards so user text only ever matches literally.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn require_non_empty(field: &str, value: &str) -> QueryResult<()> {
    if value.trim().is_empty() {
        return Err(QueryError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[test]
fn escape_like_wildcards() {
    assert_eq!(escape_like("flour"), "flour");
    assert_eq!(escape_like("100%_rye"), "100\\%\\_rye");
    assert_eq!(escape_like("a\\b"), "a\\\\b");
}

#[test]
fn diesel_errors_are_classified() {
    let e = QueryError::from(diesel::result::Error::NotFound);
    assert!(matches!(e, QueryError::NotFound(_)));

    let e = QueryError::from(diesel::result::Error::RollbackTransaction);
    assert!(matches!(e, QueryError::Database(_)));
    assert!(std::error::Error::source(&e).is_some());
}

#[test]
fn empty_fields_are_rejected() {
    assert!(require_non_empty("name", "bread").is_ok());
    let e = require_non_empty("name", "  ").unwrap_err();
    assert_eq!(e.to_string(), "invalid input: name must not be empty");
}
