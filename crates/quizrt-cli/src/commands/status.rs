//! The `quizrt status` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use quizrt_client::{create_backend, load_config_from};
use quizrt_core::model::{AnswerPaperId, SubmissionStatus};

pub async fn execute(answerpaper: AnswerPaperId, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let backend = create_backend(&config)?;

    let status = backend
        .get_submission_status(answerpaper)
        .await
        .with_context(|| format!("failed to fetch submission status of answerpaper {answerpaper}"))?;

    print_submission_status(answerpaper, &status);
    Ok(())
}

pub fn print_submission_status(answerpaper: AnswerPaperId, status: &SubmissionStatus) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Question", "Summary", "Attempted"]);

    for q in &status.questions {
        table.add_row(vec![
            Cell::new(q.id),
            Cell::new(q.summary.as_deref().unwrap_or("")),
            Cell::new(if q.attempted { "yes" } else { "no" }),
        ]);
    }

    println!("Answerpaper {answerpaper}: {}", status.status);
    println!("{table}");
    print!(
        "Attempted: {}  Not attempted: {}",
        status.attempted_count, status.not_attempted_count
    );
    match status.percent {
        Some(p) => println!("  Score: {p:.1}%"),
        None => println!(),
    }
}
