//! Transport error taxonomy.

use thiserror::Error;

/// Failures of the transport layer proper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// A frame did not parse as a request or response.
    #[error("malformed frame: {0:?}")]
    MalformedFrame(String),
    /// The cache or field-store lock could not be acquired in time.
    #[error("lock acquisition timed out")]
    LockTimeout,
    /// A request named a field the peer does not serve.
    #[error("unknown field: {0}")]
    UnknownField(String),
    /// No response arrived within the response timeout.
    #[error("timed out waiting for response")]
    Timeout,
    #[error("field name: {0}")]
    Field(#[from] FieldParseError),
}

/// Failures parsing a field name token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldParseError {
    #[error("empty field name")]
    Empty,
    /// The address prefix was present but not exactly four hex digits.
    #[error("malformed address prefix: {0:?}")]
    MalformedAddress(String),
    /// Field names may not contain whitespace or the frame separator.
    #[error("field name contains a separator: {0:?}")]
    EmbeddedSeparator(String),
}
