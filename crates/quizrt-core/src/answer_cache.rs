//! In-memory draft answers, keyed by question.
//!
//! No validation happens here; see [`crate::dispatcher::validate`].

use std::collections::HashMap;

use crate::model::{AnswerValue, QuestionId};

#[derive(Debug, Clone, Default)]
pub struct AnswerCache {
    drafts: HashMap<QuestionId, AnswerValue>,
}

impl AnswerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the draft for a question.
    pub fn set(&mut self, question_id: QuestionId, value: AnswerValue) {
        self.drafts.insert(question_id, value);
    }

    pub fn get(&self, question_id: QuestionId) -> Option<&AnswerValue> {
        self.drafts.get(&question_id)
    }

    pub fn clear(&mut self) {
        self.drafts.clear();
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}
