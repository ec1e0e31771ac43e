//! Attempt state machine.
//!
//! [`AttemptSession`] is the single owned aggregate for one attempt: the
//! question set, countdown, answer cache, submission records, and the
//! bookkeeping of which questions are attempted, evaluating, correct, or
//! incorrect. It is mutated only through `&mut self`; the async helpers
//! here run one operation at a time, and [`crate::runner`] interleaves them
//! on a single task.
//!
//! Every submission gets a monotonic sequence number at dispatch. Results
//! (immediate or polled) are applied only if they belong to the most
//! recently accepted submission of their question, so a slow stale
//! evaluation can never overwrite a newer one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::answer_cache::AnswerCache;
use crate::dispatcher::{PreparedSubmission, SubmissionDispatcher, SubmissionOutcome};
use crate::error::{BackendError, SessionError, SubmitError};
use crate::model::{
    format_remaining, AnswerPaperId, AnswerValue, AttemptStatus, EvaluationResult, Question,
    QuestionId,
};
use crate::poller::{self, PollDelivery, PollHandle, PollState};
use crate::timer::{Countdown, TimerEvent};
use crate::traits::{QuizBackend, StartAttemptResponse, SubmitResponse};

/// Why an attempt is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    Quit,
    Expired,
}

/// Result of closing an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizeOutcome {
    pub reason: FinalizeReason,
    /// Whether the backend acknowledged the finalize call.
    pub acknowledged: bool,
    pub status: AttemptStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FinalizeState {
    NotStarted,
    InFlight(FinalizeReason),
    Done(FinalizeOutcome),
}

/// One accepted submit action.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub question_id: QuestionId,
    pub seq: u64,
    pub submitted_value: AnswerValue,
    pub dispatched_at: DateTime<Utc>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Immediate(EvaluationResult),
    Pending { uid: String },
}

/// What became of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Acceptance {
    /// Graded synchronously; the result is now the question's latest.
    Evaluated(EvaluationResult),
    /// Awaiting asynchronous grading. Drive the handle and hand the
    /// delivery back through [`AttemptSession::apply_delivery`].
    Pending(PollHandle),
    /// A newer submission for the same question was already accepted.
    Superseded,
    /// The session was torn down while the request was in flight.
    Discarded,
}

#[derive(Debug, Clone, Default)]
struct QuestionProgress {
    attempted: bool,
    latest_seq: Option<u64>,
    pending: Option<u64>,
    result: Option<EvaluationResult>,
    last_poll_state: Option<PollState>,
}

/// Per-question flags exposed to the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuestionFlags {
    pub attempted: bool,
    pub evaluating: bool,
    pub correct: bool,
    pub incorrect: bool,
    /// Latest evaluation timed out or its status check failed.
    pub unresolved: bool,
}

/// Snapshot of everything the result renderer consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub answerpaper_id: AnswerPaperId,
    pub status: AttemptStatus,
    pub current_index: usize,
    pub total_questions: usize,
    pub remaining: String,
    pub attempted_count: usize,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub questions: Vec<QuestionView>,
    pub current_result: Option<EvaluationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub summary: String,
    pub flags: QuestionFlags,
}

/// One in-progress or finished quiz attempt.
#[derive(Debug)]
pub struct AttemptSession {
    id: AnswerPaperId,
    questions: Vec<Question>,
    positions: HashMap<QuestionId, usize>,
    status: AttemptStatus,
    countdown: Countdown,
    answers: AnswerCache,
    records: Vec<SubmissionRecord>,
    progress: HashMap<QuestionId, QuestionProgress>,
    current: usize,
    next_seq: u64,
    live: bool,
    finalize: FinalizeState,
    dispatcher: SubmissionDispatcher,
}

impl AttemptSession {
    /// Fetch the question set and remaining time, and start the countdown.
    #[instrument(skip(backend, dispatcher))]
    pub async fn start(
        backend: &dyn QuizBackend,
        course_id: u64,
        quiz_id: u64,
        dispatcher: SubmissionDispatcher,
    ) -> Result<Self, SessionError> {
        let response = backend
            .start_attempt(course_id, quiz_id)
            .await
            .map_err(|e| {
                warn!("attempt unavailable: {e}");
                SessionError::from(e)
            })?;
        let session = Self::from_start(response, dispatcher, Instant::now());
        info!(
            backend = backend.name(),
            answerpaper = session.id,
            questions = session.questions.len(),
            time_left = session.remaining(),
            "attempt started"
        );
        Ok(session)
    }

    /// Build a session from an already fetched start response.
    pub fn from_start(
        response: StartAttemptResponse,
        dispatcher: SubmissionDispatcher,
        now: Instant,
    ) -> Self {
        let questions = response.answerpaper.questions;
        let positions = questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.id, i))
            .collect();

        Self {
            id: response.answerpaper.id,
            questions,
            positions,
            status: AttemptStatus::InProgress,
            countdown: Countdown::start(response.time_left, now),
            answers: AnswerCache::new(),
            records: Vec::new(),
            progress: HashMap::new(),
            current: 0,
            next_seq: 1,
            live: true,
            finalize: FinalizeState::NotStarted,
            dispatcher,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> AnswerPaperId {
        self.id
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.positions
            .get(&question_id)
            .map(|&i| &self.questions[i])
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    /// Whether delayed callbacks may still mutate this session.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn remaining(&self) -> u64 {
        self.countdown.remaining()
    }

    pub fn remaining_display(&self) -> String {
        format_remaining(self.remaining())
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn answer(&self, question_id: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn records(&self) -> &[SubmissionRecord] {
        &self.records
    }

    pub fn dispatcher(&self) -> &SubmissionDispatcher {
        &self.dispatcher
    }

    /// Latest evaluation result of a question, if any.
    pub fn result(&self, question_id: QuestionId) -> Option<&EvaluationResult> {
        self.progress
            .get(&question_id)
            .and_then(|p| p.result.as_ref())
    }

    /// How the latest poll of a question ended, if it was polled.
    pub fn last_poll_state(&self, question_id: QuestionId) -> Option<PollState> {
        self.progress
            .get(&question_id)
            .and_then(|p| p.last_poll_state)
    }

    pub fn finalize_outcome(&self) -> Option<&FinalizeOutcome> {
        match &self.finalize {
            FinalizeState::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn flags(&self, question_id: QuestionId) -> QuestionFlags {
        let Some(p) = self.progress.get(&question_id) else {
            return QuestionFlags::default();
        };
        let resolved = p.result.as_ref().filter(|r| r.is_resolved());
        QuestionFlags {
            attempted: p.attempted,
            evaluating: p.pending.is_some(),
            correct: resolved.is_some_and(|r| r.success),
            incorrect: resolved.is_some_and(|r| !r.success),
            unresolved: p.result.as_ref().is_some_and(|r| !r.is_resolved()),
        }
    }

    pub fn attempted_count(&self) -> usize {
        self.progress.values().filter(|p| p.attempted).count()
    }

    pub fn correct_count(&self) -> usize {
        self.progress
            .keys()
            .filter(|&&id| self.flags(id).correct)
            .count()
    }

    pub fn incorrect_count(&self) -> usize {
        self.progress
            .keys()
            .filter(|&&id| self.flags(id).incorrect)
            .count()
    }

    pub fn evaluating_count(&self) -> usize {
        self.progress
            .values()
            .filter(|p| p.pending.is_some())
            .count()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            answerpaper_id: self.id,
            status: self.status,
            current_index: self.current,
            total_questions: self.questions.len(),
            remaining: self.remaining_display(),
            attempted_count: self.attempted_count(),
            correct_count: self.correct_count(),
            incorrect_count: self.incorrect_count(),
            questions: self
                .questions
                .iter()
                .map(|q| QuestionView {
                    id: q.id,
                    summary: q.summary.clone(),
                    flags: self.flags(q.id),
                })
                .collect(),
            current_result: self
                .current_question()
                .and_then(|q| self.result(q.id))
                .cloned(),
        }
    }

    // -----------------------------------------------------------------------
    // Navigation and drafts
    // -----------------------------------------------------------------------

    /// Move to a question by position. Returns `false` if out of bounds.
    pub fn goto(&mut self, index: usize) -> bool {
        if index < self.questions.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    pub fn next(&mut self) -> bool {
        self.goto(self.current + 1)
    }

    pub fn previous(&mut self) -> bool {
        match self.current.checked_sub(1) {
            Some(i) => self.goto(i),
            None => false,
        }
    }

    /// Overwrite the draft answer of a question.
    pub fn set_answer(&mut self, question_id: QuestionId, value: AnswerValue) {
        self.answers.set(question_id, value);
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate the cached draft of a question and assign its sequence number.
    pub fn prepare_submission(
        &mut self,
        question_id: QuestionId,
    ) -> Result<PreparedSubmission, SubmitError> {
        if self.status != AttemptStatus::InProgress || !self.live {
            return Err(SubmitError::NotInProgress);
        }
        let question = self
            .question(question_id)
            .ok_or(SubmitError::UnknownQuestion(question_id))?;
        let prepared = self.dispatcher.prepare(
            self.id,
            question,
            self.answers.get(question_id),
            self.next_seq,
        )?;
        self.next_seq += 1;
        Ok(prepared)
    }

    /// Record a submission the backend accepted.
    pub fn accept_submission(
        &mut self,
        prepared: PreparedSubmission,
        response: SubmitResponse,
    ) -> Acceptance {
        if !self.live {
            debug!(question = prepared.question_id, "discarding submission after teardown");
            return Acceptance::Discarded;
        }

        let outcome = self.dispatcher.classify(&prepared, response);
        self.record_outcome(prepared, outcome)
    }

    fn record_outcome(
        &mut self,
        prepared: PreparedSubmission,
        outcome: SubmissionOutcome,
    ) -> Acceptance {
        let question_id = prepared.question_id;
        let seq = prepared.seq;

        self.records.push(SubmissionRecord {
            question_id,
            seq,
            submitted_value: prepared.value,
            dispatched_at: prepared.dispatched_at,
            resolution: match &outcome {
                SubmissionOutcome::Immediate(r) => Resolution::Immediate(r.clone()),
                SubmissionOutcome::Pending(h) => Resolution::Pending {
                    uid: h.uid().to_string(),
                },
            },
        });

        let progress = self.progress.entry(question_id).or_default();
        progress.attempted = true;

        if progress.latest_seq.is_some_and(|latest| latest > seq) {
            debug!(question = question_id, seq, "accepted submission already superseded");
            return Acceptance::Superseded;
        }
        progress.latest_seq = Some(seq);

        match outcome {
            SubmissionOutcome::Immediate(result) => {
                info!(question = question_id, success = result.success, "answer evaluated");
                progress.pending = None;
                progress.last_poll_state = None;
                progress.result = Some(result.clone());
                Acceptance::Evaluated(result)
            }
            SubmissionOutcome::Pending(handle) => {
                info!(question = question_id, uid = handle.uid(), "evaluation pending");
                progress.pending = Some(seq);
                Acceptance::Pending(handle)
            }
        }
    }

    /// Apply the terminal outcome of a poll. Returns `false` if it was
    /// stale, duplicated, or arrived after teardown.
    pub fn apply_delivery(&mut self, delivery: PollDelivery) -> bool {
        if !self.live {
            debug!(question = delivery.question_id, "discarding evaluation after teardown");
            return false;
        }
        let Some(progress) = self.progress.get_mut(&delivery.question_id) else {
            return false;
        };
        if progress.pending != Some(delivery.seq) {
            debug!(
                question = delivery.question_id,
                seq = delivery.seq,
                "discarding stale evaluation"
            );
            return false;
        }

        progress.pending = None;
        progress.last_poll_state = Some(delivery.state);
        progress.result = Some(delivery.result);
        true
    }

    /// Validate, send, and record a submission in one step.
    ///
    /// On failure nothing changes: the question is not marked attempted and
    /// its draft stays in the cache.
    pub async fn submit(
        &mut self,
        backend: &dyn QuizBackend,
        question_id: QuestionId,
    ) -> Result<Acceptance, SubmitError> {
        if self.status != AttemptStatus::InProgress || !self.live {
            return Err(SubmitError::NotInProgress);
        }
        let question = self
            .question(question_id)
            .ok_or(SubmitError::UnknownQuestion(question_id))?;
        let seq = self.next_seq;

        let submitted = self
            .dispatcher
            .submit(backend, self.id, question, self.answers.get(question_id), seq)
            .await;
        let (prepared, outcome) = match submitted {
            Ok(accepted) => accepted,
            Err(e) => {
                if let SubmitError::Backend(ref err) = e {
                    self.next_seq += 1;
                    warn!(question = question_id, "submission failed: {err}");
                }
                return Err(e);
            }
        };
        self.next_seq += 1;

        if !self.live {
            debug!(question = question_id, "discarding submission after teardown");
            return Ok(Acceptance::Discarded);
        }
        Ok(self.record_outcome(prepared, outcome))
    }

    /// Poll a pending evaluation to completion and apply it.
    pub async fn resolve(&mut self, backend: &dyn QuizBackend, handle: PollHandle) -> bool {
        let config = self.dispatcher.poll_config().clone();
        match poller::poll_to_completion(backend, handle, &config).await {
            Some(delivery) => self.apply_delivery(delivery),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Timer and termination
    // -----------------------------------------------------------------------

    /// Advance the countdown. On expiry the status becomes `Expired`; the
    /// caller finalizes with [`FinalizeReason::Expired`].
    pub fn tick(&mut self, now: Instant) -> TimerEvent {
        if self.status != AttemptStatus::InProgress {
            return TimerEvent::Idle;
        }
        let event = self.countdown.tick(now);
        if event == TimerEvent::Expired {
            info!(answerpaper = self.id, "time is up");
            self.status = AttemptStatus::Expired;
        }
        event
    }

    /// Claim the single finalize slot. Returns `false` if finalization has
    /// already started or finished.
    pub fn begin_finalize(&mut self, reason: FinalizeReason) -> bool {
        if self.finalize != FinalizeState::NotStarted {
            return false;
        }
        self.finalize = FinalizeState::InFlight(reason);
        self.status = match reason {
            FinalizeReason::Quit => AttemptStatus::QuitRequested,
            FinalizeReason::Expired => AttemptStatus::Expired,
        };
        true
    }

    /// Record the finalize call's result and tear the session down.
    ///
    /// A quit ends in `Completed`. An expired attempt stays `Expired`, so
    /// consumers can tell a timeout from a voluntary finish; it accepts no
    /// further work either way.
    pub fn complete_finalize(&mut self, result: Result<(), BackendError>) -> FinalizeOutcome {
        let reason = match self.finalize {
            FinalizeState::InFlight(reason) => reason,
            FinalizeState::Done(ref outcome) => return outcome.clone(),
            FinalizeState::NotStarted => FinalizeReason::Quit,
        };

        let acknowledged = match result {
            Ok(()) => true,
            Err(e) => {
                warn!(answerpaper = self.id, "finalize failed, answers assumed stored: {e}");
                false
            }
        };
        self.status = match reason {
            FinalizeReason::Quit => AttemptStatus::Completed,
            FinalizeReason::Expired => AttemptStatus::Expired,
        };

        let outcome = FinalizeOutcome {
            reason,
            acknowledged,
            status: self.status,
        };
        info!(answerpaper = self.id, ?reason, acknowledged, "attempt finalized");
        self.finalize = FinalizeState::Done(outcome.clone());
        self.teardown();
        outcome
    }

    /// Close the attempt. A no-op returning `None` if already closing or closed.
    pub async fn finalize(
        &mut self,
        backend: &dyn QuizBackend,
        reason: FinalizeReason,
    ) -> Option<FinalizeOutcome> {
        if !self.begin_finalize(reason) {
            debug!(answerpaper = self.id, ?reason, "finalize ignored, already terminal");
            return None;
        }
        let result = backend.quit_attempt(self.id).await;
        Some(self.complete_finalize(result))
    }

    pub async fn quit(&mut self, backend: &dyn QuizBackend) -> Option<FinalizeOutcome> {
        self.finalize(backend, FinalizeReason::Quit).await
    }

    /// Stop accepting delayed results. Pending evaluations are abandoned.
    pub fn teardown(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        for p in self.progress.values_mut() {
            p.pending = None;
        }
        debug!(answerpaper = self.id, "session torn down");
    }
}
