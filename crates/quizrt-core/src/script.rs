//! TOML answer scripts.
//!
//! A script lists the answers a headless front end enters and submits
//! during an attempt, and whether to quit once every evaluation settles.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{AnswerValue, Question, QuestionId};
use crate::runner::AttemptHandle;
use crate::session::SessionView;

/// A parsed answer script.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerScript {
    pub answers: Vec<ScriptedAnswer>,
    /// Finalize the attempt after the last evaluation settles.
    pub quit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedAnswer {
    pub question_id: QuestionId,
    pub value: AnswerValue,
    /// Only fill the draft when false.
    pub submit: bool,
}

#[derive(Debug, Deserialize)]
struct TomlScript {
    #[serde(default)]
    answers: Vec<TomlAnswer>,
    #[serde(default = "default_true")]
    quit: bool,
}

#[derive(Debug, Deserialize)]
struct TomlAnswer {
    question_id: QuestionId,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    values: Option<Vec<String>>,
    #[serde(default = "default_true")]
    submit: bool,
}

fn default_true() -> bool {
    true
}

/// Parse an answer script file.
pub fn parse_script(path: &Path) -> Result<AnswerScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answer script: {}", path.display()))?;

    parse_script_str(&content, path)
}

/// Parse an answer script from a string.
pub fn parse_script_str(content: &str, source_path: &Path) -> Result<AnswerScript> {
    let parsed: TomlScript = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let answers = parsed
        .answers
        .into_iter()
        .map(|a| {
            let value = match (a.value, a.values) {
                (Some(v), None) => AnswerValue::Text(v),
                (None, Some(vs)) => AnswerValue::Choices(vs),
                (Some(_), Some(_)) => anyhow::bail!(
                    "question {}: set either `value` or `values`, not both",
                    a.question_id
                ),
                (None, None) => {
                    anyhow::bail!("question {}: missing `value` or `values`", a.question_id)
                }
            };
            Ok(ScriptedAnswer {
                question_id: a.question_id,
                value,
                submit: a.submit,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AnswerScript {
        answers,
        quit: parsed.quit,
    })
}

/// A problem found when matching a script against an attempt's questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptWarning {
    pub question_id: QuestionId,
    pub message: String,
}

/// Check a script against the question set of an attempt.
pub fn validate_script(script: &AnswerScript, questions: &[Question]) -> Vec<ScriptWarning> {
    let known: HashMap<QuestionId, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let mut warnings = Vec::new();

    for answer in &script.answers {
        let Some(question) = known.get(&answer.question_id) else {
            warnings.push(ScriptWarning {
                question_id: answer.question_id,
                message: "question is not part of this attempt".into(),
            });
            continue;
        };
        let is_list = matches!(answer.value, AnswerValue::Choices(_));
        if question.kind.is_multi_valued() != is_list {
            let expected = if question.kind.is_multi_valued() {
                "`values`"
            } else {
                "`value`"
            };
            warnings.push(ScriptWarning {
                question_id: answer.question_id,
                message: format!("{} questions take {expected}", question.kind),
            });
        }
    }

    let mut submitted = HashSet::new();
    for answer in script.answers.iter().filter(|a| a.submit) {
        if !submitted.insert(answer.question_id) {
            warnings.push(ScriptWarning {
                question_id: answer.question_id,
                message: "submitted more than once; the last submission wins".into(),
            });
        }
    }

    warnings
}

/// Enter and submit every scripted answer, wait for evaluations to settle,
/// then quit if the script asks for it.
///
/// Returns the view observed once everything settled.
pub async fn play(script: &AnswerScript, handle: &AttemptHandle) -> Result<SessionView> {
    for answer in &script.answers {
        handle
            .set_answer(answer.question_id, answer.value.clone())
            .await?;
        if answer.submit {
            handle.submit(answer.question_id).await?;
        }
    }

    let view = handle.settled().await?;
    if script.quit {
        handle.quit().await?;
    }
    Ok(view)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::QuestionType;

    const SCRIPT: &str = r#"
quit = false

[[answers]]
question_id = 1
value = "42"

[[answers]]
question_id = 2
values = ["b", "a"]

[[answers]]
question_id = 3
value = """
def add(a, b):
    return a + b
"""
submit = false
"#;

    fn question(id: QuestionId) -> Question {
        Question {
            id,
            kind: QuestionType::String,
            summary: String::new(),
            description: None,
            points: 1.0,
            language: None,
            options: vec![],
        }
    }

    #[test]
    fn parse_valid_script() {
        let script = parse_script_str(SCRIPT, &PathBuf::from("answers.toml")).unwrap();
        assert!(!script.quit);
        assert_eq!(script.answers.len(), 3);
        assert_eq!(script.answers[0].value, AnswerValue::text("42"));
        assert_eq!(script.answers[1].value, AnswerValue::choices(["b", "a"]));
        assert!(!script.answers[2].submit);
    }

    #[test]
    fn quit_defaults_to_true() {
        let script = parse_script_str(
            "[[answers]]\nquestion_id = 1\nvalue = \"x\"\n",
            &PathBuf::from("a.toml"),
        )
        .unwrap();
        assert!(script.quit);
        assert!(script.answers[0].submit);
    }

    #[test]
    fn value_and_values_are_exclusive() {
        let both = "[[answers]]\nquestion_id = 1\nvalue = \"x\"\nvalues = [\"y\"]\n";
        assert!(parse_script_str(both, &PathBuf::from("a.toml")).is_err());

        let neither = "[[answers]]\nquestion_id = 1\n";
        let err = parse_script_str(neither, &PathBuf::from("a.toml")).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn parse_malformed_toml() {
        assert!(parse_script_str("answers = [ }{", &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.toml");
        std::fs::write(&path, SCRIPT).unwrap();
        assert_eq!(parse_script(&path).unwrap().answers.len(), 3);

        let missing = parse_script(&dir.path().join("nope.toml")).unwrap_err();
        assert!(missing.to_string().contains("failed to read answer script"));
    }

    #[test]
    fn validate_against_questions() {
        let script = AnswerScript {
            answers: vec![
                ScriptedAnswer {
                    question_id: 1,
                    value: AnswerValue::text("a"),
                    submit: true,
                },
                ScriptedAnswer {
                    question_id: 1,
                    value: AnswerValue::text("b"),
                    submit: true,
                },
                ScriptedAnswer {
                    question_id: 9,
                    value: AnswerValue::text("c"),
                    submit: true,
                },
            ],
            quit: true,
        };
        let warnings = validate_script(&script, &[question(1), question(2)]);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.question_id == 9));
        assert!(warnings.iter().any(|w| w.message.contains("last submission wins")));
    }

    #[test]
    fn validate_answer_shape_per_type() {
        let mut mcc = question(1);
        mcc.kind = QuestionType::Mcc;
        let script = AnswerScript {
            answers: vec![
                ScriptedAnswer {
                    question_id: 1,
                    value: AnswerValue::text("a"),
                    submit: true,
                },
                ScriptedAnswer {
                    question_id: 2,
                    value: AnswerValue::choices(["x"]),
                    submit: true,
                },
            ],
            quit: true,
        };
        let warnings = validate_script(&script, &[mcc, question(2)]);
        assert_eq!(
            warnings,
            vec![
                ScriptWarning {
                    question_id: 1,
                    message: "mcc questions take `values`".into(),
                },
                ScriptWarning {
                    question_id: 2,
                    message: "string questions take `value`".into(),
                },
            ]
        );
    }
}
