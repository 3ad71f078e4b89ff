//! Error types for Silicon Profile

use std::io;
use thiserror::Error;

/// Result type alias for profiling operations
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Error type for the probe and frequency-measurement paths.
///
/// The decode engine itself never returns errors: unsupported leaves and
/// malformed probe data degrade to an empty or default-valued contribution
/// in the resulting profile. Errors only arise from probe I/O (reading OS
/// pseudo-files) and from the auxiliary frequency sampler.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// System error
    #[error("System error: {0}")]
    System(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_parse() {
        let err = ProfileError::Parse("bad value".to_string());
        assert_eq!(err.to_string(), "Parse error: bad value");
    }

    #[test]
    fn test_error_display_unsupported_platform() {
        let err = ProfileError::UnsupportedPlatform("riscv64".to_string());
        assert_eq!(err.to_string(), "Unsupported platform: riscv64");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err: ProfileError = io_err.into();
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope }}").unwrap_err();
        let err: ProfileError = json_err.into();
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_error_other() {
        let err = ProfileError::Other("misc".to_string());
        assert_eq!(err.to_string(), "misc");
    }
}
