use thiserror::Error;

/// Errors that can occur during rnnoie core operations.
#[derive(Debug, Error)]
pub enum OieError {
    /// The input sentence is empty or contains only whitespace.
    #[error("input is empty or whitespace-only")]
    EmptyInput,

    /// A CoNLL file could not be parsed.
    #[error("malformed CoNLL input at line {line}: {reason}")]
    MalformedConll {
        /// 1-based line number of the offending row.
        line: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// A label string is not part of the OIE tag scheme.
    #[error("unknown label: {0:?}")]
    UnknownLabel(String),

    /// The hyperparameter file is missing fields or holds invalid values.
    #[error("invalid hyperparameters: {0}")]
    InvalidHyperparams(String),

    /// The pretrained embedding file could not be read.
    #[error("embedding error: {0}")]
    Embeddings(String),

    /// The saved model directory is incomplete or inconsistent.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Decoding received scores of the wrong shape.
    #[error("decoding error: {0}")]
    Decode(String),

    /// Candle ML framework error.
    #[error("ML error: {0}")]
    Candle(#[from] candle_core::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for rnnoie operations.
pub type Result<T> = std::result::Result<T, OieError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = OieError::EmptyInput;
        assert_eq!(err.to_string(), "input is empty or whitespace-only");

        let err = OieError::MalformedConll {
            line: 7,
            reason: "expected 8 columns".into(),
        };
        assert!(err.to_string().contains("line 7"));
        assert!(err.to_string().contains("expected 8 columns"));

        let err = OieError::UnknownLabel("X-Q".into());
        assert!(err.to_string().contains("X-Q"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: OieError = io.into();
        assert!(matches!(err, OieError::Io(_)));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OieError>();
    }
}
