//! Error types and handling for keba-control
//!
//! Every failure an action can produce is a [`KebaError`]. Callers that need a
//! machine-readable classification use [`KebaError::code`], which is stable
//! across releases and is what the HTTP surface reports.

use crate::validation::FieldViolation;
use thiserror::Error;

/// Result type alias for keba-control operations
pub type Result<T> = std::result::Result<T, KebaError>;

/// Main error type for keba-control
#[derive(Debug, Error)]
pub enum KebaError {
    /// One or more request fields failed validation
    #[error("Validation error: {}", format_violations(.violations))]
    Validation { violations: Vec<FieldViolation> },

    /// A value the hardware reserves was requested
    #[error("Reserved value: {field}={value} is reserved")]
    ReservedValue { field: String, value: i64 },

    /// Phase switch requested inside the cooldown window
    #[error("Cooldown active: phase switch allowed again in {remaining_seconds}s")]
    CooldownActive { remaining_seconds: u64 },

    /// Action is not legal in the current station state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// No station registered under that id
    #[error("Unknown station: {station}")]
    UnknownStation { station: String },

    /// Action name not part of the action surface
    #[error("Unknown action: {action}")]
    UnknownAction { action: String },

    /// Station already registered
    #[error("Station already registered: {station}")]
    StationExists { station: String },

    /// Transport reported a delivery failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Transport did not answer in time
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl KebaError {
    /// Create a validation error for a single field
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            violations: vec![FieldViolation::invalid(field.into(), message.into())],
        }
    }

    /// Create a validation error from collected violations
    pub fn violations(violations: Vec<FieldViolation>) -> Self {
        Self::Validation { violations }
    }

    /// Create a reserved value error
    pub fn reserved<S: Into<String>>(field: S, value: i64) -> Self {
        Self::ReservedValue {
            field: field.into(),
            value,
        }
    }

    /// Create a cooldown error
    pub fn cooldown(remaining_seconds: u64) -> Self {
        Self::CooldownActive { remaining_seconds }
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an unknown station error
    pub fn unknown_station<S: Into<String>>(station: S) -> Self {
        Self::UnknownStation {
            station: station.into(),
        }
    }

    /// Create an unknown action error
    pub fn unknown_action<S: Into<String>>(action: S) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Stable violation code reported to callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::ReservedValue { .. } => "reserved_value",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::InvalidState { .. } => "invalid_state",
            Self::UnknownStation { .. } => "unknown_station",
            Self::UnknownAction { .. } => "unknown_action",
            Self::StationExists { .. } => "station_exists",
            Self::Transport { .. } => "transport_failure",
            Self::Timeout { .. } => "transport_timeout",
            Self::Config { .. } => "config_error",
            Self::Serialization { .. } => "serialization_error",
            Self::Io { .. } => "io_error",
            Self::Generic { .. } => "internal_error",
        }
    }

    /// Whether the error was raised before any side effect happened
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::ReservedValue { .. }
                | Self::CooldownActive { .. }
                | Self::InvalidState { .. }
                | Self::UnknownStation { .. }
                | Self::UnknownAction { .. }
        )
    }

    /// Whether the failure happened while delivering to the station
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

impl From<std::io::Error> for KebaError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for KebaError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for KebaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
