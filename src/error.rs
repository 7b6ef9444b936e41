/*!
 * defines the [IcebergError] and [Result] types used across the crate.
*/

use thiserror::Error;

/// Error codes for schema evolution failures (spec taxonomy, not type names).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaEvolutionErrorCode {
    /// A referenced field does not exist in the schema.
    FieldNotFound,
    /// A field with that name already exists.
    FieldExists,
    /// The requested type change is not a permitted promotion.
    IncompatibleType,
    /// A new required field was added without an `initial-default`.
    RequiredFieldNoDefault,
    /// The requested operation is not valid in this context.
    InvalidOperation,
    /// `move-column` referenced a position that does not exist.
    InvalidPosition,
    /// The operation would remove or rename an identifier field.
    IdentifierField,
}

impl std::fmt::Display for SchemaEvolutionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FieldNotFound => "FIELD_NOT_FOUND",
            Self::FieldExists => "FIELD_EXISTS",
            Self::IncompatibleType => "INCOMPATIBLE_TYPE",
            Self::RequiredFieldNoDefault => "REQUIRED_FIELD_NO_DEFAULT",
            Self::InvalidOperation => "INVALID_OPERATION",
            Self::InvalidPosition => "INVALID_POSITION",
            Self::IdentifierField => "IDENTIFIER_FIELD",
        };
        write!(f, "{s}")
    }
}

/// Iceberg error type. Variants are kinds, not one-per-failure-site types.
#[derive(Error, Debug)]
pub enum IcebergError {
    /// Validation failure on a loaded or produced `table-metadata` document.
    #[error("invalid table metadata: {0}")]
    Metadata(String),

    /// A schema evolution operation failed.
    #[error("schema evolution error [{code}]: {message}")]
    SchemaEvolution {
        /// Stable error code.
        code: SchemaEvolutionErrorCode,
        /// Human readable message.
        message: String,
    },

    /// An invalid partition/sort transform spec or argument.
    #[error("invalid transform: {0}")]
    Transform(String),

    /// A bloom-filter, deletion-vector, or v3-rule validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// Backend storage I/O failure, wrapping the underlying cause.
    #[error("storage error: {0}")]
    Storage(String),

    /// A commit requirement failed against the currently-read metadata.
    /// Retryable: the caller should reload and retry the commit.
    #[error("commit conflict: {0}")]
    CommitConflict(String),

    /// Commit retries were exhausted without success. Terminal.
    #[error("commit retries exhausted after {attempts} attempts: {last_error}")]
    CommitRetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last conflict's message.
        last_error: String,
    },

    /// Applying the update sequence produced an invalid metadata document.
    #[error("commit transaction error: {0}")]
    CommitTransaction(String),

    /// General error that does not need a dedicated variant.
    #[error("{0}")]
    Message(String),
}

impl IcebergError {
    /// Build a [`IcebergError::SchemaEvolution`] error.
    pub fn schema_evolution(code: SchemaEvolutionErrorCode, message: impl Into<String>) -> Self {
        IcebergError::SchemaEvolution {
            code,
            message: message.into(),
        }
    }
}

/// Iceberg result type
pub type Result<T> = std::result::Result<T, IcebergError>;
