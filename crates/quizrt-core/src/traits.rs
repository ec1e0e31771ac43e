//! Backend trait and the wire types it exchanges.
//!
//! The assessment backend is an external collaborator. `quizrt-client`
//! implements [`QuizBackend`] over REST; tests substitute scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::model::{AnswerPaperId, EvaluationResult, Question, QuestionId, SubmissionStatus};

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Operations the attempt runtime consumes from the backend.
#[async_trait]
pub trait QuizBackend: Send + Sync {
    /// Human-readable backend name (e.g. "http").
    fn name(&self) -> &str;

    /// Start (or resume) an attempt of a quiz.
    async fn start_attempt(
        &self,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<StartAttemptResponse, BackendError>;

    /// Submit one question's answer.
    async fn submit_answer(
        &self,
        answerpaper_id: AnswerPaperId,
        question_id: QuestionId,
        payload: &AnswerPayload,
    ) -> Result<SubmitResponse, BackendError>;

    /// Check the status of an asynchronous evaluation.
    async fn get_answer_result(&self, uid: &str) -> Result<AnswerStatus, BackendError>;

    /// Close the attempt.
    async fn quit_attempt(&self, answerpaper_id: AnswerPaperId) -> Result<(), BackendError>;

    /// Fetch the post-attempt status page.
    async fn get_submission_status(
        &self,
        answerpaper_id: AnswerPaperId,
    ) -> Result<SubmissionStatus, BackendError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response of `start_attempt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub answerpaper: AnswerPaper,
    /// Authoritative remaining time in seconds.
    #[serde(default)]
    pub time_left: u64,
}

/// Backend-side record of an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPaper {
    pub id: AnswerPaperId,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Request body of `submit_answer`. The backend always expects a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer: Vec<String>,
}

/// Classified response of `submit_answer`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    /// Graded synchronously (objective questions).
    Immediate(EvaluationResult),
    /// Accepted for asynchronous grading; poll with the uid.
    Pending { uid: String },
}

/// Response of `get_answer_result`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerStatus {
    Running,
    /// Grading finished; `result` is the JSON-encoded evaluation result, if any.
    Done { result: Option<String> },
}
