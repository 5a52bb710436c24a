use thiserror::Error;

/// Top-level error type for the playstate system.
///
/// A missing row is not an error: lookups return `Ok(None)` for that case.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlaystateError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("User data store has not been initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlaystateError {
    /// Shorthand for an [`PlaystateError::InvalidArgument`] naming the argument.
    pub fn invalid_argument(name: &str, reason: &str) -> Self {
        PlaystateError::InvalidArgument(format!("{}: {}", name, reason))
    }
}

impl From<toml::de::Error> for PlaystateError {
    fn from(err: toml::de::Error) -> Self {
        PlaystateError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PlaystateError {
    fn from(err: toml::ser::Error) -> Self {
        PlaystateError::Config(err.to_string())
    }
}

/// A specialized `Result` type for playstate operations.
pub type Result<T> = std::result::Result<T, PlaystateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(PlaystateError, &str)> = vec![
            (
                PlaystateError::InvalidArgument("key: must not be empty".to_string()),
                "Invalid argument: key: must not be empty",
            ),
            (PlaystateError::Cancelled, "Operation cancelled"),
            (
                PlaystateError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                PlaystateError::NotInitialized,
                "User data store has not been initialized",
            ),
            (
                PlaystateError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_invalid_argument_helper() {
        let err = PlaystateError::invalid_argument("user_id", "must not be the nil UUID");
        assert!(matches!(err, PlaystateError::InvalidArgument(_)));
        assert_eq!(
            err.to_string(),
            "Invalid argument: user_id: must not be the nil UUID"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: PlaystateError = io_err.into();
        match &err {
            PlaystateError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            _ => panic!("Expected Io variant"),
        }
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: PlaystateError = err.unwrap_err().into();
        assert!(matches!(err, PlaystateError::Config(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
