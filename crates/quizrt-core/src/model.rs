//! Core data model types for quizrt.
//!
//! These types mirror the JSON the assessment backend exchanges with the
//! client: questions of an answerpaper, draft answer values, evaluation
//! results, and the post-attempt submission status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend identifier of a question.
pub type QuestionId = u64;

/// Backend identifier of an answerpaper (one attempt).
pub type AnswerPaperId = u64;

/// A single question of an attempt. Immutable for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Backend identifier.
    pub id: QuestionId,
    /// Question type; determines the shape of a valid answer.
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Short title.
    #[serde(default)]
    pub summary: String,
    /// Full prompt, may contain HTML.
    #[serde(default)]
    pub description: Option<String>,
    /// Points awarded for a correct answer.
    #[serde(default)]
    pub points: f64,
    /// Programming language of code questions.
    #[serde(default)]
    pub language: Option<String>,
    /// Selectable options for choice questions.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Question {
    /// Text to display as the question prompt.
    pub fn prompt(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => &self.summary,
        }
    }
}

/// Supported question types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Integer,
    Float,
    String,
    Mcq,
    Mcc,
    Code,
    Arrange,
    #[serde(other)]
    Other,
}

impl QuestionType {
    /// Whether answers are a set of selected values rather than a scalar.
    pub fn is_multi_valued(self) -> bool {
        matches!(self, QuestionType::Mcc | QuestionType::Arrange)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionType::Integer => "integer",
            QuestionType::Float => "float",
            QuestionType::String => "string",
            QuestionType::Mcq => "mcq",
            QuestionType::Mcc => "mcc",
            QuestionType::Code => "code",
            QuestionType::Arrange => "arrange",
            QuestionType::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" => Ok(QuestionType::Integer),
            "float" => Ok(QuestionType::Float),
            "string" => Ok(QuestionType::String),
            "mcq" => Ok(QuestionType::Mcq),
            "mcc" => Ok(QuestionType::Mcc),
            "code" => Ok(QuestionType::Code),
            "arrange" => Ok(QuestionType::Arrange),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// A draft answer value, shaped by the question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Free text, a number typed as text, or a single selected option.
    Text(String),
    /// Selected options (mcc) or an ordering (arrange).
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn text(s: impl Into<String>) -> Self {
        AnswerValue::Text(s.into())
    }

    pub fn choices<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::Choices(items.into_iter().map(Into::into).collect())
    }
}

/// Terminal outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Whether the answer was judged correct.
    pub success: bool,
    /// Failure details; empty on success.
    #[serde(default, deserialize_with = "deserialize_error_list")]
    pub error: Vec<ErrorDetail>,
    /// Set only on results synthesized by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unresolved: Option<Unresolved>,
}

impl EvaluationResult {
    pub fn correct() -> Self {
        Self {
            success: true,
            error: Vec::new(),
            unresolved: None,
        }
    }

    /// Synthetic result for an evaluation that did not finish in time.
    pub fn timed_out(attempts: u32) -> Self {
        Self {
            success: false,
            error: vec![ErrorDetail::Message(format!(
                "evaluation did not complete after {attempts} status checks"
            ))],
            unresolved: Some(Unresolved::Timeout { attempts }),
        }
    }

    /// Synthetic result for a status check that itself failed.
    pub fn poll_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: vec![ErrorDetail::Message(message.clone())],
            unresolved: Some(Unresolved::PollFailed { message }),
        }
    }

    /// Whether this result is a real grading verdict rather than a client-side marker.
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_none()
    }

    /// Parse the JSON-encoded result string returned by the status endpoint.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Why a synthetic result carries no verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unresolved {
    Timeout { attempts: u32 },
    PollFailed { message: String },
}

/// One element of an evaluation result's `error` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    TestCase(TestCaseFailure),
    Unrecognized(serde_json::Value),
}

/// Structured failure of one test case of a code question.
///
/// The grader may send `null` for any field and either a single string or a
/// list of lines for program output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestCaseFailure {
    Assertion {
        #[serde(default)]
        test_case: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        exception: String,
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
        #[serde(default)]
        traceback: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        hidden: bool,
    },
    Stdio {
        #[serde(default)]
        given_input: Option<String>,
        #[serde(default, deserialize_with = "deserialize_output_lines")]
        expected_output: Vec<String>,
        #[serde(default, deserialize_with = "deserialize_output_lines")]
        user_output: Vec<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        error_line_numbers: Vec<usize>,
        #[serde(default, deserialize_with = "null_as_default")]
        hidden: bool,
    },
}

impl TestCaseFailure {
    pub fn is_hidden(&self) -> bool {
        match self {
            TestCaseFailure::Assertion { hidden, .. } | TestCaseFailure::Stdio { hidden, .. } => {
                *hidden
            }
        }
    }
}

// The backend sends `error` as a list, a bare string, or null.
fn deserialize_error_list<'de, D>(deserializer: D) -> Result<Vec<ErrorDetail>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<ErrorDetail>),
        One(ErrorDetail),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::List(list)) => list,
        Some(Raw::One(ErrorDetail::Message(m))) if m.is_empty() => Vec::new(),
        Some(Raw::One(detail)) => vec![detail],
        None => Vec::new(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Program output arrives as one string or as a list of lines.
fn deserialize_output_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Lines(Vec<Option<String>>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => text.lines().map(str::to_string).collect(),
        Some(Raw::Lines(lines)) => lines.into_iter().map(Option::unwrap_or_default).collect(),
        None => Vec::new(),
    })
}

/// Lifecycle status of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    QuitRequested,
    Expired,
    Completed,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptStatus::InProgress => "in progress",
            AttemptStatus::QuitRequested => "quit requested",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Post-attempt status page as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStatus {
    #[serde(default)]
    pub questions: Vec<QuestionSubmission>,
    #[serde(default)]
    pub attempted_count: u32,
    #[serde(default)]
    pub not_attempted_count: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub percent: Option<f64>,
}

/// Per-question row of the submission status page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSubmission {
    pub id: QuestionId,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub attempted: bool,
}

/// Format seconds as `MM:SS`. Minutes are not wrapped at one hour.
pub fn format_remaining(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_parse_and_fallback() {
        assert_eq!("MCQ".parse::<QuestionType>().unwrap(), QuestionType::Mcq);
        assert!("upload".parse::<QuestionType>().is_err());

        let q: Question = serde_json::from_value(serde_json::json!({
            "id": 7, "type": "upload", "summary": "Upload a file", "points": 2.0
        }))
        .unwrap();
        assert_eq!(q.kind, QuestionType::Other);
        assert!(q.options.is_empty());
    }

    #[test]
    fn prompt_prefers_description() {
        let mut q = Question {
            id: 1,
            kind: QuestionType::String,
            summary: "Capital".into(),
            description: Some("What is the capital of France?".into()),
            points: 1.0,
            language: None,
            options: vec![],
        };
        assert_eq!(q.prompt(), "What is the capital of France?");
        q.description = Some("   ".into());
        assert_eq!(q.prompt(), "Capital");
    }

    #[test]
    fn answer_value_shapes() {
        let v: AnswerValue = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(v, AnswerValue::text("42"));
        let v: AnswerValue = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(v, AnswerValue::choices(["a", "b"]));
    }

    #[test]
    fn parse_structured_code_result() {
        let raw = r#"{
            "success": false,
            "error": [
                {"type": "assertion", "exception": "AssertionError", "message": "add(1, 2) != 3", "test_case": "assert add(1, 2) == 3"},
                {"type": "stdio", "expected_output": "3\n4", "user_output": "3\n5", "error_line_numbers": [1]},
                {"type": "assertion", "exception": "", "message": "", "hidden": true},
                "Compilation failed"
            ]
        }"#;
        let result = EvaluationResult::from_json_str(raw).unwrap();
        assert!(!result.success);
        assert!(result.is_resolved());
        assert_eq!(result.error.len(), 4);
        assert!(matches!(
            &result.error[0],
            ErrorDetail::TestCase(TestCaseFailure::Assertion { exception, .. }) if exception == "AssertionError"
        ));
        assert!(matches!(
            &result.error[1],
            ErrorDetail::TestCase(TestCaseFailure::Stdio { error_line_numbers, .. }) if error_line_numbers == &vec![1]
        ));
        assert!(matches!(&result.error[2], ErrorDetail::TestCase(f) if f.is_hidden()));
        assert_eq!(
            result.error[3],
            ErrorDetail::Message("Compilation failed".into())
        );
    }

    #[test]
    fn parse_grader_line_lists_and_nulls() {
        let raw = r#"{
            "success": false,
            "error": [
                {"type": "stdio", "given_input": null, "expected_output": ["1", "2"],
                 "user_output": ["1", "3"], "error_line_numbers": [1]},
                {"type": "assertion", "exception": null, "message": null,
                 "test_case": "assert f() == 1", "traceback": null, "hidden": null},
                {"type": "stdio", "expected_output": null, "user_output": "x\ny",
                 "error_line_numbers": null}
            ]
        }"#;
        let result = EvaluationResult::from_json_str(raw).unwrap();
        assert_eq!(
            result.error[0],
            ErrorDetail::TestCase(TestCaseFailure::Stdio {
                given_input: None,
                expected_output: vec!["1".into(), "2".into()],
                user_output: vec!["1".into(), "3".into()],
                error_line_numbers: vec![1],
                hidden: false,
            })
        );
        assert!(matches!(
            &result.error[1],
            ErrorDetail::TestCase(TestCaseFailure::Assertion { exception, message, hidden: false, .. })
                if exception.is_empty() && message.is_empty()
        ));
        assert!(matches!(
            &result.error[2],
            ErrorDetail::TestCase(TestCaseFailure::Stdio { expected_output, user_output, .. })
                if expected_output.is_empty() && user_output == &vec!["x".to_string(), "y".to_string()]
        ));
    }

    #[test]
    fn parse_error_as_string_or_null() {
        let r = EvaluationResult::from_json_str(r#"{"success": true, "error": null}"#).unwrap();
        assert!(r.error.is_empty());
        let r = EvaluationResult::from_json_str(r#"{"success": false, "error": "Incorrect answer"}"#)
            .unwrap();
        assert_eq!(r.error, vec![ErrorDetail::Message("Incorrect answer".into())]);
        let r = EvaluationResult::from_json_str(r#"{"success": false, "error": {"weird": 1}}"#)
            .unwrap();
        assert!(matches!(r.error[0], ErrorDetail::Unrecognized(_)));
    }

    #[test]
    fn synthetic_results_are_unresolved() {
        let t = EvaluationResult::timed_out(60);
        assert!(!t.success);
        assert_eq!(t.unresolved, Some(Unresolved::Timeout { attempts: 60 }));
        assert!(!EvaluationResult::poll_failed("boom").is_resolved());
    }

    #[test]
    fn remaining_time_format() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(65), "01:05");
        assert_eq!(format_remaining(3600), "60:00");
    }
}
