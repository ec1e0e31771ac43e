//! The `quizrt take` command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use quizrt_client::{create_backend, load_config_from};
use quizrt_core::error::SubmitError;
use quizrt_core::feedback::feedback_for;
use quizrt_core::model::{format_remaining, EvaluationResult, Question, QuestionId, QuestionType};
use quizrt_core::runner::{AttemptRunner, SessionObserver};
use quizrt_core::script;
use quizrt_core::session::{Acceptance, AttemptSession, FinalizeOutcome};
use quizrt_core::traits::QuizBackend;

use super::status::print_submission_status;

/// Console progress observer.
struct ConsoleObserver {
    kinds: HashMap<QuestionId, QuestionType>,
}

impl ConsoleObserver {
    fn new(questions: &[Question]) -> Self {
        Self {
            kinds: questions.iter().map(|q| (q.id, q.kind)).collect(),
        }
    }

    fn kind(&self, question_id: QuestionId) -> QuestionType {
        self.kinds
            .get(&question_id)
            .copied()
            .unwrap_or(QuestionType::Other)
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_tick(&self, remaining: u64) {
        if remaining % 60 == 0 || remaining <= 10 {
            eprintln!("  Time left: {}", format_remaining(remaining));
        }
    }

    fn on_submitted(&self, question_id: QuestionId, acceptance: &Acceptance) {
        match acceptance {
            Acceptance::Evaluated(result) => eprintln!(
                "  Submitted: q{question_id} -> {}",
                feedback_for(self.kind(question_id), result).headline()
            ),
            Acceptance::Pending(_) => eprintln!("  Submitted: q{question_id} (evaluating...)"),
            Acceptance::Superseded => {
                eprintln!("  Submitted: q{question_id} (superseded by a newer submission)")
            }
            Acceptance::Discarded => {}
        }
    }

    fn on_submit_failed(&self, question_id: QuestionId, error: &SubmitError) {
        eprintln!("  ERROR: q{question_id}: {error}");
    }

    fn on_evaluated(&self, question_id: QuestionId, result: &EvaluationResult) {
        eprintln!(
            "  Evaluated: q{question_id} -> {}",
            feedback_for(self.kind(question_id), result).headline()
        );
    }

    fn on_finalized(&self, outcome: &FinalizeOutcome) {
        if outcome.acknowledged {
            eprintln!("\nAttempt {}.", outcome.status);
        } else {
            eprintln!(
                "\nAttempt {} (the server did not confirm; answers already submitted are stored).",
                outcome.status
            );
        }
    }
}

pub async fn execute(
    course: u64,
    quiz: u64,
    answers_path: PathBuf,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let script = script::parse_script(&answers_path)?;

    let backend: Arc<dyn QuizBackend> = Arc::from(create_backend(&config)?);
    let runner = AttemptRunner::new(Arc::clone(&backend), config.runner_config());

    let session = runner
        .start(course, quiz)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))
        .with_context(|| format!("could not start quiz {quiz} of course {course}"))?;

    for warning in script::validate_script(&script, session.questions()) {
        eprintln!("Warning: q{}: {}", warning.question_id, warning.message);
    }

    eprintln!(
        "quizrt v{}: answerpaper {}: {} questions, {} left",
        env!("CARGO_PKG_VERSION"),
        session.id(),
        session.questions().len(),
        session.remaining_display()
    );
    eprintln!();

    let observer = ConsoleObserver::new(session.questions());
    let (handle, commands) = runner.channel();
    let driver = async move {
        let played = script::play(&script, &handle).await;
        drop(handle);
        played
    };

    let (session, played) = tokio::join!(runner.run(session, commands, &observer), driver);
    if let Err(e) = played {
        tracing::warn!("answer script stopped early: {e:#}");
    }

    print_summary(&session);

    if json {
        println!("{}", serde_json::to_string_pretty(&session.view())?);
    }

    if session.finalize_outcome().is_some() {
        match backend.get_submission_status(session.id()).await {
            Ok(status) => print_submission_status(session.id(), &status),
            Err(e) => eprintln!("Could not fetch submission status: {e}"),
        }
    } else {
        eprintln!(
            "Attempt left open. Finalize with `quizrt quit --answerpaper {}`.",
            session.id()
        );
    }

    Ok(())
}

fn print_summary(session: &AttemptSession) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Type", "Attempted", "Result"]);

    for (i, q) in session.questions().iter().enumerate() {
        let flags = session.flags(q.id);
        let result = match session.result(q.id) {
            Some(r) => feedback_for(q.kind, r).headline(),
            None if flags.evaluating => "evaluating".to_string(),
            None => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&q.summary),
            Cell::new(q.kind),
            Cell::new(if flags.attempted { "yes" } else { "no" }),
            Cell::new(result),
        ]);
    }

    eprintln!("\n{table}");
    eprintln!(
        "Attempted {}/{}  Correct {}  Incorrect {}",
        session.attempted_count(),
        session.questions().len(),
        session.correct_count(),
        session.incorrect_count()
    );
}
