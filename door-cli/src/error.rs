//! CLI Error Types

use thiserror::Error;

use door_core::DoorError;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// File I/O error
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Smart door error
    #[error("{0}")]
    DoorError(#[from] DoorError),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        CliError::ConfigError {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_arg(message: impl Into<String>) -> Self {
        CliError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ConfigError { .. } => 2,
            CliError::InvalidArgument { .. } => 3,
            CliError::IoError(_) | CliError::JsonError(_) => 4,
            CliError::DoorError(DoorError::Storage(_)) => 5,
            CliError::DoorError(DoorError::MalformedInput(_)) => 3,
            CliError::DoorError(DoorError::Configuration(_)) => 2,
            CliError::DoorError(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("x").exit_code(), 2);
        assert_eq!(CliError::invalid_arg("x").exit_code(), 3);
        assert_eq!(
            CliError::from(DoorError::MalformedInput("x".into())).exit_code(),
            3
        );
        assert_eq!(
            CliError::from(DoorError::Storage("x".into())).exit_code(),
            5
        );
    }
}
