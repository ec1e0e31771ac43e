//! Error taxonomy for the attempt runtime.
//!
//! Defined in `quizrt-core` so the session and runner can classify failures
//! by variant without string matching. None of these are retried
//! automatically; the bounded status polling in [`crate::poller`] is a
//! designed mechanism, not error recovery.

use thiserror::Error;

use crate::model::{QuestionId, QuestionType};

/// Failures talking to the assessment backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The backend answered with a non-2xx status.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The quiz cannot be attempted now; the message is shown verbatim.
    #[error("{0}")]
    QuizUnavailable(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Returns `true` for failures of the transport itself rather than of the server.
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Network(_) | BackendError::Timeout(_))
    }
}

/// A draft answer rejected locally, before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please enter an answer")]
    Empty,

    #[error("'{0}' is not an integer")]
    NotAnInteger(String),

    #[error("'{0}' is not a number")]
    NotAFloat(String),

    #[error("a {kind} question expects {expected}")]
    WrongShape {
        kind: QuestionType,
        expected: &'static str,
    },

    #[error("'{0}' is not one of the offered options")]
    UnknownOption(String),
}

/// Why a submit action did not reach an accepted state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to submit answer: {0}")]
    Backend(#[from] BackendError),

    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(QuestionId),

    #[error("attempt is no longer in progress")]
    NotInProgress,
}

impl SubmitError {
    /// Whether the failure happened locally, without touching the network.
    pub fn is_local(&self) -> bool {
        !matches!(self, SubmitError::Backend(_))
    }
}

/// Failures starting an attempt. Fatal for the session; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("quiz unavailable: {0}")]
    Unavailable(String),

    #[error("failed to start attempt: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::QuizUnavailable(msg) => SessionError::Unavailable(msg),
            other => SessionError::Backend(other),
        }
    }
}

impl SessionError {
    /// Message suitable for showing to the student.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Unavailable(msg) => msg.clone(),
            SessionError::Backend(_) => "Failed to start quiz".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_unavailable_maps_to_unavailable() {
        let err: SessionError = BackendError::QuizUnavailable("Quiz not open yet".into()).into();
        assert_eq!(err, SessionError::Unavailable("Quiz not open yet".into()));
        assert_eq!(err.user_message(), "Quiz not open yet");

        let err: SessionError = BackendError::Network("refused".into()).into();
        assert_eq!(err.user_message(), "Failed to start quiz");
    }

    #[test]
    fn submit_error_locality() {
        assert!(SubmitError::from(ValidationError::Empty).is_local());
        assert!(SubmitError::NotInProgress.is_local());
        assert!(!SubmitError::from(BackendError::Timeout(30)).is_local());
        assert!(BackendError::Timeout(30).is_transport());
        assert!(!BackendError::Server {
            status: 500,
            message: String::new()
        }
        .is_transport());
    }
}
