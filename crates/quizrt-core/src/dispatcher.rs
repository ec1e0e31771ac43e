//! Submission dispatcher.
//!
//! Validates a draft answer against its question type, formats the request
//! body, sends it, and classifies the backend's reply as an immediate
//! verdict or a pending asynchronous evaluation.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::error::{BackendError, SubmitError, ValidationError};
use crate::model::{
    AnswerPaperId, AnswerValue, EvaluationResult, Question, QuestionId, QuestionType,
};
use crate::poller::{PollConfig, PollHandle};
use crate::traits::{AnswerPayload, QuizBackend, SubmitResponse};

/// A validated submission, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSubmission {
    pub answerpaper_id: AnswerPaperId,
    pub question_id: QuestionId,
    /// Monotonic per-session dispatch sequence number.
    pub seq: u64,
    pub value: AnswerValue,
    pub payload: AnswerPayload,
    pub dispatched_at: DateTime<Utc>,
}

/// How an accepted submission will be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Immediate(EvaluationResult),
    Pending(PollHandle),
}

/// Formats, sends, and classifies submissions.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDispatcher {
    poll: PollConfig,
}

impl SubmissionDispatcher {
    pub fn new(poll: PollConfig) -> Self {
        Self { poll }
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Validate a draft and stamp it with its dispatch sequence number.
    pub fn prepare(
        &self,
        answerpaper_id: AnswerPaperId,
        question: &Question,
        value: Option<&AnswerValue>,
        seq: u64,
    ) -> Result<PreparedSubmission, ValidationError> {
        let value = value.ok_or(ValidationError::Empty)?;
        let payload = validate(question, Some(value))?;
        Ok(PreparedSubmission {
            answerpaper_id,
            question_id: question.id,
            seq,
            value: value.clone(),
            payload,
            dispatched_at: Utc::now(),
        })
    }

    /// Wrap the backend's reply.
    pub fn classify(
        &self,
        prepared: &PreparedSubmission,
        response: SubmitResponse,
    ) -> SubmissionOutcome {
        match response {
            SubmitResponse::Immediate(result) => SubmissionOutcome::Immediate(result),
            SubmitResponse::Pending { uid } => SubmissionOutcome::Pending(PollHandle::new(
                uid,
                prepared.question_id,
                prepared.seq,
                self.poll.max_attempts,
            )),
        }
    }

    /// Validate, send, and classify in one step.
    pub async fn submit(
        &self,
        backend: &dyn QuizBackend,
        answerpaper_id: AnswerPaperId,
        question: &Question,
        value: Option<&AnswerValue>,
        seq: u64,
    ) -> Result<(PreparedSubmission, SubmissionOutcome), SubmitError> {
        let prepared = self.prepare(answerpaper_id, question, value, seq)?;
        let response = send(backend, &prepared).await?;
        let outcome = self.classify(&prepared, response);
        Ok((prepared, outcome))
    }
}

/// Send a prepared submission.
#[instrument(skip(backend, prepared), fields(question = prepared.question_id, seq = prepared.seq))]
pub async fn send(
    backend: &dyn QuizBackend,
    prepared: &PreparedSubmission,
) -> Result<SubmitResponse, BackendError> {
    debug!("dispatching answer");
    backend
        .submit_answer(prepared.answerpaper_id, prepared.question_id, &prepared.payload)
        .await
}

/// Check a draft against its question type and build the request body.
pub fn validate(
    question: &Question,
    value: Option<&AnswerValue>,
) -> Result<AnswerPayload, ValidationError> {
    let value = value.ok_or(ValidationError::Empty)?;

    let answer = match question.kind {
        QuestionType::Integer => {
            let text = scalar(question.kind, value)?.trim().to_string();
            text.parse::<i64>()
                .map_err(|_| ValidationError::NotAnInteger(text.clone()))?;
            vec![text]
        }
        QuestionType::Float => {
            let text = scalar(question.kind, value)?.trim().to_string();
            match text.parse::<f64>() {
                Ok(f) if f.is_finite() => vec![text],
                _ => return Err(ValidationError::NotAFloat(text)),
            }
        }
        QuestionType::String | QuestionType::Code | QuestionType::Other => {
            vec![scalar(question.kind, value)?.to_string()]
        }
        QuestionType::Mcq => {
            let choice = scalar(question.kind, value)?;
            check_option(question, choice)?;
            vec![choice.to_string()]
        }
        QuestionType::Mcc => {
            let mut selected: Vec<String> = Vec::new();
            for choice in choices(question.kind, value)? {
                check_option(question, choice)?;
                if !selected.iter().any(|s| s == choice) {
                    selected.push(choice.clone());
                }
            }
            selected
        }
        QuestionType::Arrange => {
            let order = choices(question.kind, value)?;
            for item in order {
                check_option(question, item)?;
            }
            order.to_vec()
        }
    };

    Ok(AnswerPayload { answer })
}

fn scalar(kind: QuestionType, value: &AnswerValue) -> Result<&str, ValidationError> {
    match value {
        AnswerValue::Text(s) if s.trim().is_empty() => Err(ValidationError::Empty),
        AnswerValue::Text(s) => Ok(s),
        AnswerValue::Choices(_) => Err(ValidationError::WrongShape {
            kind,
            expected: "a single value",
        }),
    }
}

fn choices(kind: QuestionType, value: &AnswerValue) -> Result<&[String], ValidationError> {
    match value {
        AnswerValue::Choices(v) if v.is_empty() => Err(ValidationError::Empty),
        AnswerValue::Choices(v) => Ok(v),
        AnswerValue::Text(_) => Err(ValidationError::WrongShape {
            kind,
            expected: "a list of options",
        }),
    }
}

fn check_option(question: &Question, choice: &str) -> Result<(), ValidationError> {
    if question.options.is_empty() || question.options.iter().any(|o| o == choice) {
        Ok(())
    } else {
        Err(ValidationError::UnknownOption(choice.to_string()))
    }
}
