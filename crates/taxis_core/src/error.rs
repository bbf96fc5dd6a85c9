use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaxisError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("invalid shape: {message}")]
    InvalidShape { message: String },
    #[error("schema incompatible on field '{field}': {reason}")]
    SchemaIncompatible { field: String, reason: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("cancelled: {message}")]
    Cancelled { message: String },
    #[error("not implemented: {message}")]
    NotImplemented { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl TaxisError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_shape(message: impl Into<String>) -> Self {
        Self::InvalidShape {
            message: message.into(),
        }
    }

    pub fn incompatible(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaIncompatible {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type TaxisResult<T> = Result<T, TaxisError>;
