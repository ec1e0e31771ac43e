//! The `quizrt init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create quizrt.toml
    if std::path::Path::new("quizrt.toml").exists() {
        println!("quizrt.toml already exists, skipping.");
    } else {
        std::fs::write("quizrt.toml", SAMPLE_CONFIG)?;
        println!("Created quizrt.toml");
    }

    // Create example answer script
    std::fs::create_dir_all("answers")?;
    let example_path = std::path::Path::new("answers/example.toml");
    if example_path.exists() {
        println!("answers/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_ANSWERS)?;
        println!("Created answers/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit quizrt.toml with your server URL and API token");
    println!("  2. Edit answers/example.toml to match your quiz's question ids");
    println!("  3. Run: quizrt take --course <id> --quiz <id> --answers answers/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizrt configuration

base_url = "http://localhost:8000"
api_token = "${QUIZRT_API_TOKEN}"
request_timeout_secs = 30
tick_interval_ms = 1000

[polling]
interval_ms = 1000
max_attempts = 60
"#;

const EXAMPLE_ANSWERS: &str = r#"# Answers are entered and submitted in order.
# Set `quit = false` to leave the attempt open afterwards.
quit = true

[[answers]]
question_id = 1
value = "42"

[[answers]]
question_id = 2
values = ["Option A", "Option C"]

[[answers]]
question_id = 3
value = """
def add(a, b):
    return a + b
"""
"#;
