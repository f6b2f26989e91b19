//! Unified error types for screenlint

use thiserror::Error;

/// Unified error type for all screenlint operations
#[derive(Error, Debug)]
pub enum ScreenlintError {
    // Phase-fatal errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Device {serial} did not become ready after {attempts} attempts")]
    BootTimeout { serial: String, attempts: usize },

    #[error("Install failed: {0}")]
    InstallFailure(String),

    #[error("Failed to launch process: {0}")]
    LaunchFailure(String),

    // Isolated errors
    #[error("Checker {checker} failed: {message}")]
    CheckerFailure { checker: String, message: String },

    #[error("Text extraction failed: {0}")]
    ExtractionFailure(String),

    // Input errors
    #[error("Invalid state snapshot: {0}")]
    Layout(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl ScreenlintError {
    /// Errors that abort the current job phase and move the job to `Failed`
    pub fn is_phase_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::BootTimeout { .. }
                | Self::InstallFailure(_)
                | Self::LaunchFailure(_)
        )
    }
}

/// Result type alias using ScreenlintError
pub type Result<T> = std::result::Result<T, ScreenlintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_fatal_classification() {
        assert!(ScreenlintError::NotFound("job".into()).is_phase_fatal());
        assert!(ScreenlintError::BootTimeout {
            serial: "emulator-5554".into(),
            attempts: 40
        }
        .is_phase_fatal());
        assert!(ScreenlintError::InstallFailure("no Success".into()).is_phase_fatal());
        assert!(ScreenlintError::LaunchFailure("adb".into()).is_phase_fatal());

        assert!(!ScreenlintError::CheckerFailure {
            checker: "TS2".into(),
            message: "boom".into()
        }
        .is_phase_fatal());
        assert!(!ScreenlintError::ExtractionFailure("ocr".into()).is_phase_fatal());
    }

    #[test]
    fn test_boot_timeout_message() {
        let err = ScreenlintError::BootTimeout {
            serial: "emulator-5554".into(),
            attempts: 40,
        };
        assert_eq!(
            err.to_string(),
            "Device emulator-5554 did not become ready after 40 attempts"
        );
    }
}
