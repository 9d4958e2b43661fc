use crate::core::ModelSelector;

// ---------------------------------------------------------------------------
// Sub-error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("stale selection: {0}")]
    StaleSelection(String),
    #[error("selected text matches no candidate of the pending assistant turn")]
    UnknownCandidate,
    #[error("invalid turn record: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("inference backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("inference backend connection failed: {0}")]
    Connection(String),
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{selector} generation produced no parseable reply after {attempts} attempts")]
    Exhausted {
        selector: ModelSelector,
        attempts: u32,
    },
    #[error("{selector} generation timed out after {timeout_ms}ms")]
    Timeout {
        selector: ModelSelector,
        timeout_ms: u64,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("用户名或密码无效。请重新输入。\nInvalid username or password. Please try again.")]
    InvalidCredentials,
    #[error("username {0:?} cannot name a session document")]
    UnsafeUsername(String),
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Login(#[from] LoginError),
}

impl GenerationError {
    /// Whether a client may resubmit the same turn and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Exhausted { .. } | GenerationError::Timeout { .. } => true,
            GenerationError::Backend(BackendError::Connection(_)) => true,
            GenerationError::Backend(BackendError::HttpStatus { status, .. }) => *status >= 500,
            GenerationError::Backend(BackendError::MalformedResponse(_)) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Variant;

    #[test]
    fn test_from_transcript_error_to_arena_error() {
        let err: ArenaError = TranscriptError::UnknownCandidate.into();
        assert!(matches!(
            err,
            ArenaError::Transcript(TranscriptError::UnknownCandidate)
        ));
    }

    #[test]
    fn test_from_backend_error_to_generation_error() {
        let err: GenerationError = BackendError::Connection("refused".into()).into();
        assert!(matches!(
            err,
            GenerationError::Backend(BackendError::Connection(_))
        ));
    }

    #[test]
    fn test_display_generation_exhausted() {
        let err = GenerationError::Exhausted {
            selector: ModelSelector::Adapter(Variant::Dpo),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "dpo generation produced no parseable reply after 5 attempts"
        );
    }

    #[test]
    fn test_display_generation_timeout() {
        let err = GenerationError::Timeout {
            selector: ModelSelector::Base,
            timeout_ms: 3000,
        };
        assert_eq!(err.to_string(), "base generation timed out after 3000ms");
    }

    #[test]
    fn test_display_backend_http_status() {
        let err = BackendError::HttpStatus {
            status: 500,
            body: "oom".into(),
        };
        assert_eq!(err.to_string(), "inference backend returned HTTP 500: oom");
    }

    #[test]
    fn test_display_stale_selection() {
        let err = TranscriptError::StaleSelection("last turn is a user turn".into());
        assert_eq!(err.to_string(), "stale selection: last turn is a user turn");
    }

    #[test]
    fn test_display_login_invalid_is_bilingual() {
        let msg = LoginError::InvalidCredentials.to_string();
        assert!(msg.contains("用户名或密码无效"));
        assert!(msg.contains("Invalid username or password"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout {
            selector: ModelSelector::Base,
            timeout_ms: 1,
        }
        .is_retryable());
        assert!(GenerationError::from(BackendError::HttpStatus {
            status: 503,
            body: String::new(),
        })
        .is_retryable());
        assert!(!GenerationError::from(BackendError::HttpStatus {
            status: 400,
            body: String::new(),
        })
        .is_retryable());
        assert!(
            !GenerationError::from(BackendError::MalformedResponse("x".into())).is_retryable()
        );
    }
}
