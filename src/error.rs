use std::io;

#[cfg(feature = "service")]
use std::{borrow::Cow, error::Error as StdError};

use http::status::StatusCode;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[cfg(feature = "service")]
use sqlx::{
    error::{DatabaseError, ErrorKind as DatabaseErrorKind},
    Error as SqlxError,
};

use crate::properties::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum LinkGraphError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{what} too large: {size} exceeds the limit of {limit}")]
    InputTooLarge {
        what: String,
        size: usize,
        limit: usize,
    },
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Body of entity {0} changed since the suggestion was computed; request a fresh preview")]
    StaleSuggestion(EntityId),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LinkGraphError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LinkGraphError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LinkGraphError::InputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            LinkGraphError::InvalidId(_) => StatusCode::BAD_REQUEST,
            LinkGraphError::NotFound(_) => StatusCode::NOT_FOUND,
            LinkGraphError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LinkGraphError::StaleSuggestion(_) => StatusCode::CONFLICT,
            LinkGraphError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Storage failures leave no partial state behind, so the caller may simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkGraphError::Storage(_))
    }
}

impl From<toml::de::Error> for LinkGraphError {
    fn from(src: toml::de::Error) -> LinkGraphError {
        LinkGraphError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for LinkGraphError {
    fn from(src: toml::ser::Error) -> LinkGraphError {
        LinkGraphError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for LinkGraphError {
    fn from(src: JsonError) -> LinkGraphError {
        LinkGraphError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for LinkGraphError {
    fn from(src: uuid::Error) -> LinkGraphError {
        LinkGraphError::InvalidId(format!("UUID conversion failed: {src}"))
    }
}

impl From<io::Error> for LinkGraphError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => LinkGraphError::NotFound(format!("{x}")),
            _ => LinkGraphError::Storage(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<RegexError> for LinkGraphError {
    fn from(x: RegexError) -> Self {
        LinkGraphError::Serialization(format!("Regex parse failed: {x}"))
    }
}

#[cfg(feature = "service")]
impl From<SqlxError> for LinkGraphError {
    fn from(db_error: SqlxError) -> Self {
        match db_error {
            SqlxError::RowNotFound => LinkGraphError::NotFound("database row".to_string()),
            SqlxError::Decode(e) => LinkGraphError::Serialization(format!("row decode: {e}")),
            other => LinkGraphError::Storage(format!("database error: {other:?}")),
        }
    }
}

/// Lets row decoders (`FromRow`) surface a [LinkGraphError] through sqlx.
#[cfg(feature = "service")]
impl DatabaseError for LinkGraphError {
    fn message(&self) -> &str {
        "lorelink FromRow parsing failure"
    }

    fn kind(&self) -> sqlx::error::ErrorKind {
        DatabaseErrorKind::Other
    }

    #[inline]
    fn code(&self) -> Option<Cow<'_, str>> {
        None
    }

    #[doc(hidden)]
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    #[doc(hidden)]
    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    #[doc(hidden)]
    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_status_codes_and_retry() {
        let stale = LinkGraphError::StaleSuggestion(EntityId::nil());
        assert_eq!(stale.status_code(), StatusCode::CONFLICT);
        assert!(!stale.is_retryable());

        let storage = LinkGraphError::Storage("disk full".to_string());
        assert_eq!(storage.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(storage.is_retryable());

        let big = LinkGraphError::InputTooLarge {
            what: "body".to_string(),
            size: 10,
            limit: 5,
        };
        assert_eq!(big.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(big.to_string(), "body too large: 10 exceeds the limit of 5");
    }

    #[test]
    fn test_uuid_errors_are_invalid_ids() {
        let err: LinkGraphError = uuid::Uuid::parse_str("nope").unwrap_err().into();
        assert!(matches!(err, LinkGraphError::InvalidId(_)));
    }
}
