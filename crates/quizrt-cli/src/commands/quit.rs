//! The `quizrt quit` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use quizrt_client::{create_backend, load_config_from};
use quizrt_core::model::AnswerPaperId;

pub async fn execute(answerpaper: AnswerPaperId, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let backend = create_backend(&config)?;

    backend
        .quit_attempt(answerpaper)
        .await
        .with_context(|| format!("failed to finalize answerpaper {answerpaper}"))?;

    println!("Answerpaper {answerpaper} finalized.");
    println!("Run `quizrt status --answerpaper {answerpaper}` to see the submission status.");
    Ok(())
}
