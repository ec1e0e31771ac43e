//! quizrt CLI: headless driver for quiz attempts.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "quizrt", version, about = "Quiz attempt runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a quiz attempt from an answer script
    Take {
        /// Course id
        #[arg(long)]
        course: u64,

        /// Quiz id
        #[arg(long)]
        quiz: u64,

        /// Path to the .toml answer script
        #[arg(long)]
        answers: PathBuf,

        /// Print the final session view as JSON
        #[arg(long)]
        json: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the submission status of an answerpaper
    Status {
        /// Answerpaper id
        #[arg(long)]
        answerpaper: u64,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Finalize an open attempt
    Quit {
        /// Answerpaper id
        #[arg(long)]
        answerpaper: u64,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example answer script
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quizrt=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            course,
            quiz,
            answers,
            json,
            config,
        } => commands::take::execute(course, quiz, answers, json, config).await,
        Commands::Status {
            answerpaper,
            config,
        } => commands::status::execute(answerpaper, config).await,
        Commands::Quit {
            answerpaper,
            config,
        } => commands::quit::execute(answerpaper, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
