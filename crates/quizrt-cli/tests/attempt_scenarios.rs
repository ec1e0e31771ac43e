//! End-to-end attempt scenarios against the scripted mock backend.
//!
//! All tests run on tokio's paused clock, so countdowns and the one-second
//! polling cadence advance instantly and deterministically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use quizrt_client::{MockBackend, MockSubmit};
use quizrt_core::error::{BackendError, SubmitError};
use quizrt_core::model::{
    AnswerValue, AttemptStatus, ErrorDetail, EvaluationResult, Question, QuestionId, QuestionType,
};
use quizrt_core::runner::{AttemptRunner, NoopObserver, RunnerConfig, SessionObserver};
use quizrt_core::session::{Acceptance, FinalizeOutcome};

fn question(id: QuestionId, kind: QuestionType, options: &[&str]) -> Question {
    Question {
        id,
        kind,
        summary: format!("question {id}"),
        description: None,
        points: 1.0,
        language: None,
        options: options.iter().map(|s| s.to_string()).collect(),
    }
}

fn mcq_and_code() -> Vec<Question> {
    vec![
        question(1, QuestionType::Mcq, &["3", "4", "5"]),
        question(2, QuestionType::Code, &[]),
    ]
}

fn failed(message: &str) -> EvaluationResult {
    EvaluationResult {
        success: false,
        error: vec![ErrorDetail::Message(message.into())],
        unresolved: None,
    }
}

#[derive(Default)]
struct Recorder {
    failures: Mutex<Vec<(QuestionId, SubmitError)>>,
    evaluated: Mutex<Vec<(QuestionId, EvaluationResult)>>,
    finalized: Mutex<Vec<FinalizeOutcome>>,
    superseded: Mutex<Vec<QuestionId>>,
}

impl SessionObserver for Recorder {
    fn on_tick(&self, _: u64) {}

    fn on_submitted(&self, question_id: QuestionId, acceptance: &Acceptance) {
        if matches!(acceptance, Acceptance::Superseded) {
            self.superseded.lock().unwrap().push(question_id);
        }
    }

    fn on_submit_failed(&self, question_id: QuestionId, error: &SubmitError) {
        self.failures
            .lock()
            .unwrap()
            .push((question_id, error.clone()));
    }

    fn on_evaluated(&self, question_id: QuestionId, result: &EvaluationResult) {
        self.evaluated
            .lock()
            .unwrap()
            .push((question_id, result.clone()));
    }

    fn on_finalized(&self, outcome: &FinalizeOutcome) {
        self.finalized.lock().unwrap().push(outcome.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn objective_then_code_question() {
    let backend = Arc::new(MockBackend::new(10, mcq_and_code(), 1800));
    backend
        .on_submit(1, MockSubmit::Immediate(EvaluationResult::correct()))
        .on_submit(
            2,
            MockSubmit::Pending {
                running_polls: 2,
                result: failed("add(1, 2) returned -1"),
            },
        );

    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let session = runner.start(7, 3).await.unwrap();
    let (handle, commands) = runner.channel();

    let driver = async move {
        handle.set_answer(1, AnswerValue::text("4")).await.unwrap();
        handle.submit(1).await.unwrap();
        let after_mcq = handle.settled().await.unwrap();

        handle.next().await.unwrap();
        handle
            .set_answer(2, AnswerValue::text("def add(a, b):\n    return a - b"))
            .await
            .unwrap();
        handle.submit(2).await.unwrap();
        let after_code = handle.settled().await.unwrap();

        handle.quit().await.unwrap();
        (after_mcq, after_code)
    };

    let (session, (after_mcq, after_code)) =
        tokio::join!(runner.run(session, commands, &NoopObserver), driver);

    assert_eq!(after_mcq.attempted_count, 1);
    assert_eq!(after_mcq.correct_count, 1);

    assert_eq!(after_code.attempted_count, 2);
    assert_eq!(after_code.incorrect_count, 1);
    assert_eq!(after_code.current_index, 1);
    assert_eq!(after_code.current_result, Some(failed("add(1, 2) returned -1")));
    assert_eq!(backend.status_calls(), 3);

    assert_eq!(session.status(), AttemptStatus::Completed);
    assert_eq!(backend.quit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn expiry_auto_finalizes_and_quit_is_noop() {
    let backend = Arc::new(MockBackend::new(11, mcq_and_code(), 1));
    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let recorder = Recorder::default();

    let session = runner.start(1, 1).await.unwrap();
    let (_handle, commands) = runner.channel();

    let start = tokio::time::Instant::now();
    let mut session = runner.run(session, commands, &recorder).await;

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(session.status(), AttemptStatus::Expired);
    assert_eq!(recorder.finalized.lock().unwrap().len(), 1);

    assert!(session.quit(backend.as_ref()).await.is_none());
    assert_eq!(session.status(), AttemptStatus::Expired);
    assert_eq!(backend.quit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn network_failure_leaves_question_unattempted() {
    let backend = Arc::new(MockBackend::new(12, mcq_and_code(), 600));
    backend
        .on_submit(
            1,
            MockSubmit::Fail(BackendError::Network("connection reset".into())),
        )
        .on_submit(1, MockSubmit::Immediate(EvaluationResult::correct()));

    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let recorder = Recorder::default();
    let session = runner.start(1, 1).await.unwrap();
    let (handle, commands) = runner.channel();

    let driver = async move {
        handle.set_answer(1, AnswerValue::text("4")).await.unwrap();
        handle.submit(1).await.unwrap();
        let after_failure = handle.settled().await.unwrap();

        // Resubmitting the unchanged draft succeeds.
        handle.submit(1).await.unwrap();
        let after_retry = handle.settled().await.unwrap();
        (after_failure, after_retry)
    };

    let (session, (after_failure, after_retry)) =
        tokio::join!(runner.run(session, commands, &recorder), driver);

    assert_eq!(after_failure.attempted_count, 0);
    {
        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            (1, SubmitError::Backend(BackendError::Network(_)))
        ));
    }
    assert_eq!(session.answer(1), Some(&AnswerValue::text("4")));

    assert_eq!(after_retry.attempted_count, 1);
    assert_eq!(backend.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn validation_error_never_reaches_backend() {
    let backend = Arc::new(MockBackend::new(13, mcq_and_code(), 600));
    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let recorder = Recorder::default();
    let session = runner.start(1, 1).await.unwrap();
    let (handle, commands) = runner.channel();

    let driver = async move {
        handle.set_answer(1, AnswerValue::text("7")).await.unwrap();
        handle.submit(1).await.unwrap();
        handle.submit(2).await.unwrap();
        handle.settled().await.unwrap()
    };

    let (_, view) = tokio::join!(runner.run(session, commands, &recorder), driver);

    assert_eq!(view.attempted_count, 0);
    assert_eq!(backend.submit_calls(), 0);
    let failures = recorder.failures.lock().unwrap();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|(_, e)| e.is_local()));
}

#[tokio::test(start_paused = true)]
async fn newest_submission_wins_over_slower_poll() {
    let backend = Arc::new(MockBackend::new(14, mcq_and_code(), 600));
    backend
        .on_submit(
            2,
            MockSubmit::Pending {
                running_polls: 10,
                result: EvaluationResult::correct(),
            },
        )
        .on_submit(
            2,
            MockSubmit::Pending {
                running_polls: 0,
                result: failed("wrong output"),
            },
        );

    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let recorder = Recorder::default();
    let session = runner.start(1, 1).await.unwrap();
    let (handle, commands) = runner.channel();

    let driver = async move {
        handle.set_answer(2, AnswerValue::text("A")).await.unwrap();
        handle.submit(2).await.unwrap();
        // Let the first submission reach the backend before the second.
        while !handle.snapshot().await.unwrap().questions[1].flags.evaluating {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.set_answer(2, AnswerValue::text("B")).await.unwrap();
        handle.submit(2).await.unwrap();
        let view = handle.settled().await.unwrap();
        // Give a stale poll every chance to land.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let later = handle.snapshot().await.unwrap();
        (view, later)
    };

    let (session, (view, later)) =
        tokio::join!(runner.run(session, commands, &recorder), driver);

    assert_eq!(view.attempted_count, 1);
    assert_eq!(view.incorrect_count, 1);
    assert_eq!(view.correct_count, 0);
    assert_eq!(later.questions, view.questions);
    assert_eq!(
        (later.attempted_count, later.correct_count, later.incorrect_count),
        (view.attempted_count, view.correct_count, view.incorrect_count)
    );
    assert_eq!(later.current_result, view.current_result);
    assert_eq!(session.result(2), Some(&failed("wrong output")));

    let evaluated = recorder.evaluated.lock().unwrap();
    assert_eq!(evaluated.len(), 1);
    assert_eq!(evaluated[0].1, failed("wrong output"));
}

#[tokio::test(start_paused = true)]
async fn late_reply_to_older_submission_is_superseded() {
    let backend = Arc::new(MockBackend::new(17, mcq_and_code(), 600));
    backend
        .on_submit_after(
            1,
            Duration::from_secs(5),
            MockSubmit::Immediate(EvaluationResult::correct()),
        )
        .on_submit(1, MockSubmit::Immediate(failed("Incorrect answer")));

    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let recorder = Recorder::default();
    let session = runner.start(1, 1).await.unwrap();
    let (handle, commands) = runner.channel();

    let mock = Arc::clone(&backend);
    let driver = async move {
        handle.set_answer(1, AnswerValue::text("4")).await.unwrap();
        handle.submit(1).await.unwrap();
        // The slow reply must belong to the first submission.
        while mock.submit_calls() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.set_answer(1, AnswerValue::text("5")).await.unwrap();
        handle.submit(1).await.unwrap();
        let view = handle.settled().await.unwrap();
        handle.quit().await.unwrap();
        view
    };

    let start = tokio::time::Instant::now();
    let (session, view) = tokio::join!(runner.run(session, commands, &recorder), driver);

    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(view.attempted_count, 1);
    assert_eq!((view.correct_count, view.incorrect_count), (0, 1));
    assert_eq!(session.result(1), Some(&failed("Incorrect answer")));
    assert_eq!(*recorder.superseded.lock().unwrap(), vec![1]);
    assert_eq!(session.records().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn never_finishing_evaluation_times_out() {
    let backend = Arc::new(MockBackend::new(15, mcq_and_code(), 3600));
    backend.on_submit(2, MockSubmit::NeverDone);

    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let session = runner.start(1, 1).await.unwrap();
    let (handle, commands) = runner.channel();

    let driver = async move {
        handle
            .set_answer(2, AnswerValue::text("while True: pass"))
            .await
            .unwrap();
        handle.submit(2).await.unwrap();
        let view = handle.settled().await.unwrap();
        handle.quit().await.unwrap();
        view
    };

    let (session, view) = tokio::join!(runner.run(session, commands, &NoopObserver), driver);

    assert_eq!(backend.status_calls(), 60);
    assert_eq!(view.attempted_count, 1);
    assert_eq!((view.correct_count, view.incorrect_count), (0, 0));
    assert!(view.questions[1].flags.unresolved);
    assert!(!session.result(2).unwrap().is_resolved());
}

#[tokio::test(start_paused = true)]
async fn finalize_failure_is_not_blocking() {
    let backend = Arc::new(
        MockBackend::new(16, mcq_and_code(), 600).with_quit_error(BackendError::Server {
            status: 502,
            message: "bad gateway".into(),
        }),
    );
    backend.on_submit(1, MockSubmit::Immediate(EvaluationResult::correct()));

    let runner = AttemptRunner::new(backend.clone(), RunnerConfig::default());
    let recorder = Recorder::default();
    let session = runner.start(1, 1).await.unwrap();
    let (handle, commands) = runner.channel();

    let driver = async move {
        handle.set_answer(1, AnswerValue::text("4")).await.unwrap();
        handle.submit(1).await.unwrap();
        handle.settled().await.unwrap();
        handle.quit().await.unwrap();
    };

    let (session, ()) = tokio::join!(runner.run(session, commands, &recorder), driver);

    assert_eq!(session.status(), AttemptStatus::Completed);
    let outcome = session.finalize_outcome().unwrap();
    assert!(!outcome.acknowledged);
    assert_eq!(session.attempted_count(), 1);
    assert!(!session.is_live());
}

#[tokio::test]
async fn unavailable_quiz_is_reported_verbatim() {
    let backend = Arc::new(MockBackend::unavailable("You have exhausted all attempts"));
    let runner = AttemptRunner::new(backend, RunnerConfig::default());

    let err = runner.start(1, 1).await.unwrap_err();
    assert_eq!(err.user_message(), "You have exhausted all attempts");
}
