//! Error taxonomy for discovery, resolution and reconciliation

use thiserror::Error;

/// Errors raised while processing a single environment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalingError {
    /// A stack, output, scaling group or service does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// A parameter referenced by the policy is absent from the configuration record
    #[error("Missing parameter '{key}' in configuration record {record}")]
    MissingParameter { record: String, key: String },

    /// A parameter is present but cannot be parsed into the expected type
    #[error("Invalid value '{value}' for parameter '{key}' in configuration record {record}")]
    InvalidParameter {
        record: String,
        key: String,
        value: String,
    },

    /// Declared values contradict each other or the policy
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A control-plane call failed
    #[error("Platform error during {operation}: {message}")]
    Platform { operation: String, message: String },

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notification(String),
}

/// What the outer loop does with an environment that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing to do for this environment; not a failure
    Skip,
    /// Processing stopped part-way; reported as a failure
    Abort,
}

impl ScalingError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ScalingError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn platform(operation: impl Into<String>, message: impl ToString) -> Self {
        ScalingError::Platform {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Classify the error for the per-environment loop
    pub fn disposition(&self) -> Disposition {
        match self {
            ScalingError::NotFound { .. } => Disposition::Skip,
            _ => Disposition::Abort,
        }
    }

    /// Short category label used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            ScalingError::NotFound { .. } => "not_found",
            ScalingError::MissingParameter { .. } => "missing_parameter",
            ScalingError::InvalidParameter { .. } => "invalid_parameter",
            ScalingError::Configuration(_) => "configuration",
            ScalingError::Platform { .. } => "platform",
            ScalingError::Notification(_) => "notification",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScalingError>;
