//! Mock backend for testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use quizrt_core::error::BackendError;
use quizrt_core::model::{
    AnswerPaperId, EvaluationResult, Question, QuestionId, QuestionSubmission, SubmissionStatus,
};
use quizrt_core::traits::{
    AnswerPaper, AnswerPayload, AnswerStatus, QuizBackend, StartAttemptResponse, SubmitResponse,
};

/// How the mock answers one submit call.
#[derive(Debug, Clone)]
pub enum MockSubmit {
    /// Graded synchronously.
    Immediate(EvaluationResult),
    /// Graded asynchronously; the status check reports `running` this many
    /// times before `done` with the result.
    Pending {
        running_polls: u32,
        result: EvaluationResult,
    },
    /// Asynchronous grading that never finishes.
    NeverDone,
    /// The submit request itself fails.
    Fail(BackendError),
}

#[derive(Debug, Clone)]
struct ScriptedSubmit {
    reply: MockSubmit,
    delay: Duration,
}

/// A scripted in-memory backend for exercising the attempt runtime
/// without a server.
///
/// Submit replies are queued per question and consumed in order; delays
/// run on tokio time, so paused-clock tests stay deterministic.
pub struct MockBackend {
    start: Result<StartAttemptResponse, BackendError>,
    submits: Mutex<HashMap<QuestionId, VecDeque<ScriptedSubmit>>>,
    statuses: Mutex<HashMap<String, VecDeque<AnswerStatus>>>,
    submitted: Mutex<Vec<(QuestionId, AnswerPayload)>>,
    quit_error: Option<BackendError>,
    submit_calls: AtomicU32,
    status_calls: AtomicU32,
    quit_calls: AtomicU32,
}

impl MockBackend {
    /// Create a mock whose attempt has the given questions and time budget.
    pub fn new(answerpaper_id: AnswerPaperId, questions: Vec<Question>, time_left: u64) -> Self {
        Self::with_start(Ok(StartAttemptResponse {
            answerpaper: AnswerPaper {
                id: answerpaper_id,
                questions,
            },
            time_left,
        }))
    }

    /// Create a mock that refuses to start the attempt.
    pub fn unavailable(message: &str) -> Self {
        Self::with_start(Err(BackendError::QuizUnavailable(message.to_string())))
    }

    fn with_start(start: Result<StartAttemptResponse, BackendError>) -> Self {
        Self {
            start,
            submits: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            quit_error: None,
            submit_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            quit_calls: AtomicU32::new(0),
        }
    }

    /// Make every finalize call fail with `error`.
    pub fn with_quit_error(mut self, error: BackendError) -> Self {
        self.quit_error = Some(error);
        self
    }

    /// Queue the reply for the next submit of a question.
    pub fn on_submit(&self, question_id: QuestionId, reply: MockSubmit) -> &Self {
        self.on_submit_after(question_id, Duration::ZERO, reply)
    }

    /// Queue a reply that is delivered after `delay`.
    pub fn on_submit_after(
        &self,
        question_id: QuestionId,
        delay: Duration,
        reply: MockSubmit,
    ) -> &Self {
        self.submits
            .lock()
            .unwrap()
            .entry(question_id)
            .or_default()
            .push_back(ScriptedSubmit { reply, delay });
        self
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::Relaxed)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::Relaxed)
    }

    pub fn quit_calls(&self) -> u32 {
        self.quit_calls.load(Ordering::Relaxed)
    }

    /// Every payload received, in arrival order.
    pub fn submitted(&self) -> Vec<(QuestionId, AnswerPayload)> {
        self.submitted.lock().unwrap().clone()
    }

    fn register_pending(&self, replies: VecDeque<AnswerStatus>) -> String {
        let uid = Uuid::new_v4().to_string();
        self.statuses.lock().unwrap().insert(uid.clone(), replies);
        uid
    }
}

#[async_trait]
impl QuizBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_attempt(&self, _: u64, _: u64) -> Result<StartAttemptResponse, BackendError> {
        self.start.clone()
    }

    async fn submit_answer(
        &self,
        _answerpaper_id: AnswerPaperId,
        question_id: QuestionId,
        payload: &AnswerPayload,
    ) -> Result<SubmitResponse, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::Relaxed);

        let scripted = self
            .submits
            .lock()
            .unwrap()
            .get_mut(&question_id)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| {
                BackendError::Network(format!("no scripted reply for question {question_id}"))
            })?;

        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }

        let response = match scripted.reply {
            MockSubmit::Fail(e) => return Err(e),
            MockSubmit::Immediate(result) => SubmitResponse::Immediate(result),
            MockSubmit::Pending {
                running_polls,
                result,
            } => {
                let mut replies: VecDeque<AnswerStatus> =
                    (0..running_polls).map(|_| AnswerStatus::Running).collect();
                replies.push_back(AnswerStatus::Done {
                    result: serde_json::to_string(&result).ok(),
                });
                SubmitResponse::Pending {
                    uid: self.register_pending(replies),
                }
            }
            MockSubmit::NeverDone => SubmitResponse::Pending {
                uid: self.register_pending(VecDeque::new()),
            },
        };

        self.submitted
            .lock()
            .unwrap()
            .push((question_id, payload.clone()));
        Ok(response)
    }

    async fn get_answer_result(&self, uid: &str) -> Result<AnswerStatus, BackendError> {
        self.status_calls.fetch_add(1, Ordering::Relaxed);
        let mut statuses = self.statuses.lock().unwrap();
        let queue = statuses
            .get_mut(uid)
            .ok_or_else(|| BackendError::Server {
                status: 404,
                message: format!("unknown uid {uid}"),
            })?;
        // The last scripted status repeats once the queue drains.
        Ok(match queue.len() {
            0 => AnswerStatus::Running,
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or(AnswerStatus::Running),
        })
    }

    async fn quit_attempt(&self, _: AnswerPaperId) -> Result<(), BackendError> {
        self.quit_calls.fetch_add(1, Ordering::Relaxed);
        match &self.quit_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn get_submission_status(
        &self,
        _: AnswerPaperId,
    ) -> Result<SubmissionStatus, BackendError> {
        let questions = match &self.start {
            Ok(start) => &start.answerpaper.questions,
            Err(e) => return Err(e.clone()),
        };
        let attempted: HashSet<QuestionId> =
            self.submitted.lock().unwrap().iter().map(|(q, _)| *q).collect();

        let rows: Vec<QuestionSubmission> = questions
            .iter()
            .map(|q| QuestionSubmission {
                id: q.id,
                summary: Some(q.summary.clone()),
                attempted: attempted.contains(&q.id),
            })
            .collect();
        let attempted_count = rows.iter().filter(|r| r.attempted).count() as u32;

        Ok(SubmissionStatus {
            not_attempted_count: rows.len() as u32 - attempted_count,
            attempted_count,
            questions: rows,
            status: if self.quit_calls() > 0 {
                "completed".into()
            } else {
                "inprogress".into()
            },
            percent: None,
        })
    }
}
