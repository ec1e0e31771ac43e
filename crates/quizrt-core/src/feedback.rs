//! Renderer-facing feedback built from an evaluation result.
//!
//! A wrong answer is a normal outcome, not a system failure: every result
//! maps to some [`Feedback`] value, including the client-side timeout and
//! status-check markers.

use serde::Serialize;

use crate::model::{ErrorDetail, EvaluationResult, QuestionType, TestCaseFailure, Unresolved};

/// What the student should be shown for one evaluated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    Correct,
    Incorrect {
        messages: Vec<String>,
    },
    /// A test case the student may not see failed.
    HiddenTestFailed,
    Assertion {
        test_case: Option<String>,
        exception: String,
        message: String,
        traceback: Option<String>,
    },
    StdioMismatch {
        given_input: Option<String>,
        lines: Vec<LineDiff>,
    },
    TimedOut {
        attempts: u32,
    },
    EvaluationError {
        message: String,
    },
}

/// One line of an expected-versus-actual output comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineDiff {
    /// 1-based line number.
    pub line: usize,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub mismatch: bool,
}

impl Feedback {
    /// One-line summary for tables and logs.
    pub fn headline(&self) -> String {
        match self {
            Feedback::Correct => "correct".into(),
            Feedback::Incorrect { messages } => match messages.first() {
                Some(first) => format!("incorrect: {first}"),
                None => "incorrect".into(),
            },
            Feedback::HiddenTestFailed => "hidden test case failed".into(),
            Feedback::Assertion { exception, .. } => format!("failed with {exception}"),
            Feedback::StdioMismatch { lines, .. } => {
                let bad = lines.iter().filter(|l| l.mismatch).count();
                format!("output mismatch on {bad} line(s)")
            }
            Feedback::TimedOut { attempts } => {
                format!("evaluation timed out after {attempts} checks")
            }
            Feedback::EvaluationError { message } => format!("evaluation error: {message}"),
        }
    }
}

/// Build the feedback for one result.
///
/// Code questions report their first failed test case in structured form,
/// unless the grader led with a plain message such as a compile error; then
/// every message is shown. Other types report the plain messages.
pub fn feedback_for(kind: QuestionType, result: &EvaluationResult) -> Feedback {
    match &result.unresolved {
        Some(Unresolved::Timeout { attempts }) => {
            return Feedback::TimedOut {
                attempts: *attempts,
            }
        }
        Some(Unresolved::PollFailed { message }) => {
            return Feedback::EvaluationError {
                message: message.clone(),
            }
        }
        None => {}
    }

    if result.success {
        return Feedback::Correct;
    }

    let leads_with_message = matches!(result.error.first(), Some(ErrorDetail::Message(_)));
    if kind == QuestionType::Code && !leads_with_message {
        let first_failure = result.error.iter().find_map(|e| match e {
            ErrorDetail::TestCase(failure) => Some(failure),
            _ => None,
        });
        if let Some(failure) = first_failure {
            return test_case_feedback(failure);
        }
    }

    Feedback::Incorrect {
        messages: result.error.iter().filter_map(message_of).collect(),
    }
}

fn test_case_feedback(failure: &TestCaseFailure) -> Feedback {
    if failure.is_hidden() {
        return Feedback::HiddenTestFailed;
    }
    match failure {
        TestCaseFailure::Assertion {
            test_case,
            exception,
            message,
            traceback,
            ..
        } => Feedback::Assertion {
            test_case: test_case.clone(),
            exception: exception.clone(),
            message: message.clone(),
            traceback: traceback.clone(),
        },
        TestCaseFailure::Stdio {
            given_input,
            expected_output,
            user_output,
            error_line_numbers,
            ..
        } => Feedback::StdioMismatch {
            given_input: given_input.clone(),
            lines: line_diff(
                expected_output.as_slice(),
                user_output.as_slice(),
                error_line_numbers,
            ),
        },
    }
}

fn message_of(detail: &ErrorDetail) -> Option<String> {
    match detail {
        ErrorDetail::Message(m) if m.trim().is_empty() => None,
        ErrorDetail::Message(m) => Some(m.clone()),
        ErrorDetail::TestCase(failure) if failure.is_hidden() => {
            Some("hidden test case failed".into())
        }
        ErrorDetail::TestCase(TestCaseFailure::Assertion {
            exception, message, ..
        }) => Some(match (exception.is_empty(), message.is_empty()) {
            (_, false) => message.clone(),
            (false, true) => exception.clone(),
            (true, true) => "test case failed".into(),
        }),
        ErrorDetail::TestCase(TestCaseFailure::Stdio { .. }) => {
            Some("output did not match".into())
        }
        ErrorDetail::Unrecognized(value) => Some(value.to_string()),
    }
}

/// Pair expected and actual output line by line.
///
/// `flagged` holds 0-based line indices the grader marked as wrong; lines
/// that differ textually are marked as well.
pub fn line_diff<S: AsRef<str>>(expected: &[S], actual: &[S], flagged: &[usize]) -> Vec<LineDiff> {
    let len = expected.len().max(actual.len());

    (0..len)
        .map(|i| {
            let e = expected.get(i).map(|s| s.as_ref().to_string());
            let a = actual.get(i).map(|s| s.as_ref().to_string());
            LineDiff {
                line: i + 1,
                mismatch: e != a || flagged.contains(&i),
                expected: e,
                actual: a,
            }
        })
        .collect()
}
