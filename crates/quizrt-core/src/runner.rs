//! Attempt runner.
//!
//! Drives one [`AttemptSession`] on a single task: a countdown ticker, a
//! command channel from the front end, and the in-flight submissions and
//! evaluation polls are multiplexed with `tokio::select!`. Every mutation of
//! the session happens inside this loop, so no locking is needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::dispatcher::{self, PreparedSubmission, SubmissionDispatcher};
use crate::error::{BackendError, SessionError, SubmitError};
use crate::model::{AnswerValue, EvaluationResult, QuestionId};
use crate::poller::{self, PollConfig, PollDelivery, PollHandle};
use crate::session::{Acceptance, AttemptSession, FinalizeOutcome, FinalizeReason, SessionView};
use crate::timer::TimerEvent;
use crate::traits::{QuizBackend, SubmitResponse};

/// Configuration for the attempt runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often the countdown is re-evaluated.
    pub tick_interval: Duration,
    /// Evaluation polling cadence and bound.
    pub polling: PollConfig,
    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            polling: PollConfig::default(),
            command_buffer: 32,
        }
    }
}

/// Progress reporting trait.
pub trait SessionObserver: Send + Sync {
    fn on_tick(&self, remaining: u64);
    fn on_submitted(&self, question_id: QuestionId, acceptance: &Acceptance);
    fn on_submit_failed(&self, question_id: QuestionId, error: &SubmitError);
    fn on_evaluated(&self, question_id: QuestionId, result: &EvaluationResult);
    fn on_finalized(&self, outcome: &FinalizeOutcome);
}

/// No-op observer.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_tick(&self, _: u64) {}
    fn on_submitted(&self, _: QuestionId, _: &Acceptance) {}
    fn on_submit_failed(&self, _: QuestionId, _: &SubmitError) {}
    fn on_evaluated(&self, _: QuestionId, _: &EvaluationResult) {}
    fn on_finalized(&self, _: &FinalizeOutcome) {}
}

/// Requests the front end can send to a running attempt.
#[derive(Debug)]
pub enum Command {
    SetAnswer {
        question_id: QuestionId,
        value: AnswerValue,
    },
    Submit {
        question_id: QuestionId,
    },
    Goto(usize),
    Next,
    Previous,
    Quit,
    /// Reply with the current view immediately.
    Snapshot(oneshot::Sender<SessionView>),
    /// Reply once no submission or poll is in flight.
    Settled(oneshot::Sender<SessionView>),
}

/// Cloneable sender side of a running attempt.
#[derive(Debug, Clone)]
pub struct AttemptHandle {
    tx: mpsc::Sender<Command>,
}

impl AttemptHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("attempt runner has stopped"))
    }

    pub async fn set_answer(&self, question_id: QuestionId, value: AnswerValue) -> Result<()> {
        self.send(Command::SetAnswer { question_id, value }).await
    }

    pub async fn submit(&self, question_id: QuestionId) -> Result<()> {
        self.send(Command::Submit { question_id }).await
    }

    pub async fn goto(&self, index: usize) -> Result<()> {
        self.send(Command::Goto(index)).await
    }

    pub async fn next(&self) -> Result<()> {
        self.send(Command::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.send(Command::Previous).await
    }

    pub async fn quit(&self) -> Result<()> {
        self.send(Command::Quit).await
    }

    pub async fn snapshot(&self) -> Result<SessionView> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.context("attempt runner dropped snapshot request")
    }

    /// Wait until every submission and evaluation in flight has resolved.
    pub async fn settled(&self) -> Result<SessionView> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Settled(tx)).await?;
        rx.await.context("attempt runner stopped before settling")
    }
}

enum Event {
    Submitted {
        prepared: PreparedSubmission,
        result: Result<SubmitResponse, BackendError>,
    },
    Polled {
        question_id: QuestionId,
        seq: u64,
        outcome: Result<Option<PollDelivery>, Aborted>,
    },
}

/// Owns the backend and drives attempts to completion.
pub struct AttemptRunner {
    backend: Arc<dyn QuizBackend>,
    config: RunnerConfig,
}

impl AttemptRunner {
    pub fn new(backend: Arc<dyn QuizBackend>, config: RunnerConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<dyn QuizBackend> {
        &self.backend
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start an attempt with this runner's polling configuration.
    pub async fn start(&self, course_id: u64, quiz_id: u64) -> Result<AttemptSession, SessionError> {
        AttemptSession::start(
            self.backend.as_ref(),
            course_id,
            quiz_id,
            SubmissionDispatcher::new(self.config.polling.clone()),
        )
        .await
    }

    /// Create the command channel for [`AttemptRunner::run`].
    pub fn channel(&self) -> (AttemptHandle, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(self.config.command_buffer.max(1));
        (AttemptHandle { tx }, rx)
    }

    /// Run the attempt until it is finalized, or until every handle is
    /// dropped with nothing left in flight. In the latter case the attempt
    /// is left open on the server.
    pub async fn run(
        &self,
        mut session: AttemptSession,
        mut commands: mpsc::Receiver<Command>,
        observer: &dyn SessionObserver,
    ) -> AttemptSession {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut inflight: FuturesUnordered<BoxFuture<'static, Event>> = FuturesUnordered::new();
        let mut polls: HashMap<QuestionId, (u64, AbortHandle)> = HashMap::new();
        let mut waiters: Vec<oneshot::Sender<SessionView>> = Vec::new();
        let mut commands_open = true;

        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match session.tick(Instant::now()) {
                        TimerEvent::Decrement { remaining } => observer.on_tick(remaining),
                        TimerEvent::Expired => {
                            observer.on_tick(0);
                            break Some(FinalizeReason::Expired);
                        }
                        TimerEvent::Idle => {}
                    }
                }

                command = commands.recv(), if commands_open => {
                    let Some(command) = command else {
                        debug!("command channel closed");
                        commands_open = false;
                        if inflight.is_empty() {
                            break None;
                        }
                        continue;
                    };
                    match command {
                        Command::SetAnswer { question_id, value } => {
                            session.set_answer(question_id, value);
                        }
                        Command::Submit { question_id } => {
                            match session.prepare_submission(question_id) {
                                Ok(prepared) => inflight.push(self.dispatch(prepared)),
                                Err(e) => {
                                    debug!(question = question_id, "submission rejected: {e}");
                                    observer.on_submit_failed(question_id, &e);
                                }
                            }
                        }
                        Command::Goto(index) => {
                            if !session.goto(index) {
                                debug!(index, "navigation out of bounds");
                            }
                        }
                        Command::Next => {
                            session.next();
                        }
                        Command::Previous => {
                            session.previous();
                        }
                        Command::Quit => break Some(FinalizeReason::Quit),
                        Command::Snapshot(reply) => {
                            let _ = reply.send(session.view());
                        }
                        Command::Settled(reply) => {
                            if inflight.is_empty() {
                                let _ = reply.send(session.view());
                            } else {
                                waiters.push(reply);
                            }
                        }
                    }
                }

                Some(event) = inflight.next(), if !inflight.is_empty() => {
                    match event {
                        Event::Submitted { prepared, result } => {
                            let question_id = prepared.question_id;
                            match result {
                                Ok(response) => {
                                    let acceptance = session.accept_submission(prepared, response);
                                    match &acceptance {
                                        Acceptance::Pending(handle) => {
                                            let (abort, future) = self.poll(handle.clone());
                                            if let Some((_, old)) =
                                                polls.insert(question_id, (handle.seq(), abort))
                                            {
                                                old.abort();
                                            }
                                            inflight.push(future);
                                        }
                                        Acceptance::Evaluated(_) => {
                                            if let Some((_, old)) = polls.remove(&question_id) {
                                                old.abort();
                                            }
                                        }
                                        Acceptance::Superseded | Acceptance::Discarded => {}
                                    }
                                    observer.on_submitted(question_id, &acceptance);
                                }
                                Err(e) => {
                                    warn!(question = question_id, "submission failed: {e}");
                                    observer.on_submit_failed(question_id, &SubmitError::Backend(e));
                                }
                            }
                        }
                        Event::Polled { question_id, seq, outcome } => {
                            if polls.get(&question_id).is_some_and(|(s, _)| *s == seq) {
                                polls.remove(&question_id);
                            }
                            if let Ok(Some(delivery)) = outcome {
                                let result = delivery.result.clone();
                                if session.apply_delivery(delivery) {
                                    observer.on_evaluated(question_id, &result);
                                }
                            }
                        }
                    }

                    if inflight.is_empty() {
                        for reply in waiters.drain(..) {
                            let _ = reply.send(session.view());
                        }
                        if !commands_open {
                            break None;
                        }
                    }
                }
            }
        };

        for (_, (_, abort)) in polls.drain() {
            abort.abort();
        }

        match reason {
            Some(reason) => {
                if let Some(outcome) = session.finalize(self.backend.as_ref(), reason).await {
                    observer.on_finalized(&outcome);
                }
            }
            None => {
                info!(answerpaper = session.id(), "leaving attempt open");
                session.teardown();
            }
        }

        for reply in waiters {
            let _ = reply.send(session.view());
        }
        session
    }

    fn dispatch(&self, prepared: PreparedSubmission) -> BoxFuture<'static, Event> {
        let backend = Arc::clone(&self.backend);
        async move {
            let result = dispatcher::send(backend.as_ref(), &prepared).await;
            Event::Submitted { prepared, result }
        }
        .boxed()
    }

    fn poll(&self, handle: PollHandle) -> (AbortHandle, BoxFuture<'static, Event>) {
        let backend = Arc::clone(&self.backend);
        let config = self.config.polling.clone();
        let question_id = handle.question_id();
        let seq = handle.seq();
        let (abort, registration) = AbortHandle::new_pair();

        let future = async move {
            let polling = poller::poll_to_completion(backend.as_ref(), handle, &config);
            let outcome = Abortable::new(polling, registration).await;
            Event::Polled {
                question_id,
                seq,
                outcome,
            }
        }
        .boxed();
        (abort, future)
    }
}
