//! Error types for the entity store.
//!
//! All errors are strongly typed using thiserror, grouped by where they
//! arise: input validation, execution against the site tree, and the
//! underlying I/O and JSON layers.
//!
//! A malformed entity body is deliberately *not* an error here: it loads as
//! an entity carrying an `@error` record so enumerations can continue.

use thiserror::Error;

/// Validation errors raised before any storage is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid entity identifier '{id}'")]
    InvalidId {
        id: String,
    },

    #[error("Unrecognized selector syntax ({selector}): {reason}")]
    SelectorSyntax {
        selector: String,
        reason: String,
    },

    #[error("Recursive field reference '{field_id}' in field group")]
    RecursiveField {
        field_id: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

/// Errors raised while executing an operation against the site tree.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Entity not found: {type_id}/{id}")]
    NotFound {
        type_id: String,
        id: String,
    },

    #[error("Entity already exists: {type_id}/{id}")]
    AlreadyExists {
        type_id: String,
        id: String,
    },

    #[error("Entity {id} has unexpected type (expected {expected}, found {found:?})")]
    TypeMismatch {
        id: String,
        expected: String,
        found: Vec<String>,
    },

    #[error("Invariant violated: {message}")]
    InvariantViolated {
        message: String,
    },

    #[error("Cache error: {message}")]
    Cache {
        message: String,
    },
}

/// Top-level error type for the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl StoreError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an `InvalidId` error for the given identifier.
    #[must_use]
    pub fn invalid_id(id: impl Into<String>) -> Self {
        ValidationError::InvalidId { id: id.into() }.into()
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(type_id: impl Into<String>, id: impl Into<String>) -> Self {
        ExecutionError::NotFound {
            type_id: type_id.into(),
            id: id.into(),
        }
        .into()
    }

    /// Creates an `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(type_id: impl Into<String>, id: impl Into<String>) -> Self {
        ExecutionError::AlreadyExists {
            type_id: type_id.into(),
            id: id.into(),
        }
        .into()
    }

    /// Creates an `InvariantViolated` error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        ExecutionError::InvariantViolated {
            message: message.into(),
        }
        .into()
    }

    /// Creates a cache error.
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        ExecutionError::Cache {
            message: message.into(),
        }
        .into()
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if an identifier was rejected.
    #[must_use]
    pub const fn is_invalid_id(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::InvalidId { .. }))
    }

    /// Returns true if a selector failed to compile.
    #[must_use]
    pub const fn is_selector_syntax(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::SelectorSyntax { .. }))
    }

    /// Returns true if the target entity does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::NotFound { .. }))
    }

    /// Returns true if the target entity already exists.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::AlreadyExists { .. }))
    }

    /// Returns true if the stored type disagreed with the expected kind.
    #[must_use]
    pub const fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::TypeMismatch { .. }))
    }

    /// Returns true if a store invariant was violated.
    #[must_use]
    pub const fn is_invariant_violated(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::InvariantViolated { .. }))
    }

    /// Returns true if this is a cache error.
    #[must_use]
    pub const fn is_cache(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Cache { .. }))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for entity store operations.
pub type StoreResult<T> = Result<T, StoreError>;
