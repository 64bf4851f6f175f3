//! Error types for scopedb core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Boxed error raised by a user-supplied lookup.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in scopedb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Identifier is neither 24 hex characters nor 16 compact characters.
    #[error("invalid entity id: {input:?}")]
    InvalidId {
        /// The rejected input.
        input: String,
    },

    /// Plausible-length identifier failed its encoding-specific decode.
    #[error("malformed id encoding: {message}")]
    Format {
        /// Description of the decode failure.
        message: String,
    },

    /// A lookup function failed while resolving a reference.
    #[error("failed to resolve reference {id}: {source}")]
    ResolutionFailed {
        /// The identifier being resolved (hex form).
        id: String,
        /// Error raised by the lookup.
        #[source]
        source: BoxError,
    },

    /// A write needs an identifier the entity does not have.
    #[error("entity in `{collection}` has no id")]
    MissingId {
        /// Collection of the entity.
        collection: String,
    },

    /// The entity does not exist under the requested scope.
    ///
    /// Raised by `update` even when the id exists under another scope.
    #[error("entity {id} not found in scope {scope} of `{collection}`")]
    NotFoundInScope {
        /// Collection searched.
        collection: String,
        /// Scope searched (hex form, or `<none>`).
        scope: String,
        /// Entity id (hex form).
        id: String,
    },

    /// The stored version advanced past the version the caller held.
    #[error("version conflict on {id} in `{collection}`: expected {expected}, found {actual}")]
    VersionConflict {
        /// Collection of the entity.
        collection: String,
        /// Entity id (hex form).
        id: String,
        /// Version carried by the caller's entity.
        expected: i64,
        /// Version currently stored.
        actual: i64,
    },

    /// An insert hit an identifier that already exists.
    #[error("duplicate id {id} in `{collection}`")]
    DuplicateId {
        /// Collection of the entity.
        collection: String,
        /// Entity id (hex form).
        id: String,
    },

    /// The operation's cancellation token fired before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] scopedb_storage::StorageError),

    /// Document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] scopedb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the engine's lock file.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Persisted data is not in the expected format.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A blocking engine task panicked or was cancelled by the runtime.
    #[error("engine task failed: {message}")]
    TaskFailed {
        /// Description of the failure.
        message: String,
    },

    /// Encryption support was not compiled in.
    #[error("encryption feature not enabled")]
    EncryptionNotEnabled,

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },
}

impl CoreError {
    /// Creates an invalid id error.
    pub fn invalid_id(input: impl Into<String>) -> Self {
        Self::InvalidId {
            input: input.into(),
        }
    }

    /// Creates an id format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Creates a resolution failure wrapping the lookup's error.
    pub fn resolution_failed(id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ResolutionFailed {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Returns true for caller mistakes raised before any I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidId { .. } | Self::Format { .. } | Self::MissingId { .. }
        )
    }

    /// Returns true if the entity was not found under the requested scope.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFoundInScope { .. })
    }
}
