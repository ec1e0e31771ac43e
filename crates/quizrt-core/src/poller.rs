//! Evaluation poller.
//!
//! A pending (code) submission is resolved by repeatedly querying the
//! backend's status endpoint. Each [`PollHandle`] is a small state machine,
//! `running → {done, error, timeout}`, that yields exactly one terminal
//! [`PollDelivery`]. [`poll_to_completion`] drives a handle on tokio time, so
//! tests can run it under a paused clock.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::BackendError;
use crate::model::{EvaluationResult, QuestionId};
use crate::traits::{AnswerStatus, QuizBackend};

/// Polling cadence and bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay before each status check.
    pub interval: Duration,
    /// Status checks allowed before giving up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    Running,
    Done,
    Error,
    Timeout,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollState::Running)
    }
}

/// Tracks one in-flight asynchronous evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PollHandle {
    uid: String,
    question_id: QuestionId,
    seq: u64,
    attempts_made: u32,
    max_attempts: u32,
    state: PollState,
}

/// Terminal outcome of a handle, delivered to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct PollDelivery {
    pub question_id: QuestionId,
    /// Dispatch sequence number of the submission being evaluated.
    pub seq: u64,
    pub uid: String,
    pub state: PollState,
    pub attempts: u32,
    pub result: EvaluationResult,
}

/// Result of feeding one status response to a handle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Not finished; check again after the interval.
    Continue,
    /// Reached a terminal state with this delivery.
    Resolved(PollDelivery),
    /// The handle was already terminal; the response is ignored.
    Finished,
}

impl PollHandle {
    pub fn new(uid: String, question_id: QuestionId, seq: u64, max_attempts: u32) -> Self {
        Self {
            uid,
            question_id,
            seq,
            attempts_made: 0,
            max_attempts: max_attempts.max(1),
            state: PollState::Running,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Advance the state machine with the response of one status check.
    pub fn observe(&mut self, response: Result<AnswerStatus, BackendError>) -> PollStep {
        if self.state.is_terminal() {
            return PollStep::Finished;
        }
        self.attempts_made += 1;

        match response {
            Ok(AnswerStatus::Running) if self.attempts_made >= self.max_attempts => {
                warn!(
                    uid = %self.uid,
                    attempts = self.attempts_made,
                    "evaluation timed out"
                );
                self.resolve(PollState::Timeout, EvaluationResult::timed_out(self.attempts_made))
            }
            Ok(AnswerStatus::Running) => {
                debug!(uid = %self.uid, attempt = self.attempts_made, "evaluation still running");
                PollStep::Continue
            }
            Ok(AnswerStatus::Done { result: Some(raw) }) => {
                match EvaluationResult::from_json_str(&raw) {
                    Ok(result) => {
                        info!(uid = %self.uid, success = result.success, "evaluation done");
                        self.resolve(PollState::Done, result)
                    }
                    Err(e) => self.resolve(
                        PollState::Error,
                        EvaluationResult::poll_failed(format!("malformed evaluation result: {e}")),
                    ),
                }
            }
            Ok(AnswerStatus::Done { result: None }) => self.resolve(
                PollState::Error,
                EvaluationResult::poll_failed("evaluation finished without a result"),
            ),
            Err(e) => {
                warn!(uid = %self.uid, "status check failed: {e}");
                self.resolve(PollState::Error, EvaluationResult::poll_failed(e.to_string()))
            }
        }
    }

    fn resolve(&mut self, state: PollState, result: EvaluationResult) -> PollStep {
        self.state = state;
        PollStep::Resolved(PollDelivery {
            question_id: self.question_id,
            seq: self.seq,
            uid: self.uid.clone(),
            state,
            attempts: self.attempts_made,
            result,
        })
    }
}

/// Poll until the handle reaches a terminal state.
///
/// Returns `None` only if the handle was already terminal when passed in.
pub async fn poll_to_completion(
    backend: &dyn QuizBackend,
    mut handle: PollHandle,
    config: &PollConfig,
) -> Option<PollDelivery> {
    while !handle.state().is_terminal() {
        tokio::time::sleep(config.interval).await;
        let response = backend.get_answer_result(handle.uid()).await;
        match handle.observe(response) {
            PollStep::Continue => continue,
            PollStep::Resolved(delivery) => return Some(delivery),
            PollStep::Finished => break,
        }
    }
    None
}
