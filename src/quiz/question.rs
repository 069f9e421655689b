use rand::Rng;
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};

use super::{QuizError, Result};
use crate::content::QuestionRecord;

pub const MISSING_EXPLANATION: &str = "Sin explicación disponible.";

/// Position of a question in the loaded pool. Assigned once at load time and
/// carried through every shuffled copy, so seen-tracking never has to match
/// questions by their text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnswerOption {
    pub key: String,
    pub text: String,
}

impl AnswerOption {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealedAnswer {
    pub correct_key: String,
    pub explanation: String,
}

/// A single trivia question. Fields are private and there are no setters, so a
/// constructed question never changes; shuffling produces a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<AnswerOption>,
    correct_key: String,
    explanation: String,
}

impl Question {
    pub fn new(
        id: QuestionId,
        text: &str,
        options: Vec<AnswerOption>,
        correct_key: &str,
        explanation: &str,
    ) -> Result<Self> {
        validate(text, &options, correct_key)?;

        Ok(Self {
            id,
            text: text.trim().to_string(),
            options,
            correct_key: correct_key.to_string(),
            explanation: explanation.trim().to_string(),
        })
    }

    pub fn from_record(id: QuestionId, record: QuestionRecord) -> Result<Self> {
        Self::new(
            id,
            &record.question_text,
            record.options,
            &record.correct_answer_key,
            &record.explanation,
        )
    }

    /// Runs the construction checks without building a question.
    pub fn validate_record(record: &QuestionRecord) -> Result<()> {
        validate(
            &record.question_text,
            &record.options,
            &record.correct_answer_key,
        )
    }

    pub fn id(&self) -> QuestionId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    pub fn is_correct(&self, selected_key: &str) -> bool {
        selected_key == self.correct_key
    }

    pub fn reveal_answer(&self) -> RevealedAnswer {
        let explanation = if self.explanation.is_empty() {
            MISSING_EXPLANATION.to_string()
        } else {
            self.explanation.clone()
        };

        RevealedAnswer {
            correct_key: self.correct_key.clone(),
            explanation,
        }
    }

    pub fn with_shuffled_options(&self) -> Self {
        self.with_shuffled_options_using(&mut thread_rng())
    }

    /// Same as [`Question::with_shuffled_options`] with a caller-provided
    /// random source. `shuffle` is a Fisher-Yates pass.
    pub fn with_shuffled_options_using<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut options = self.options.clone();
        options.shuffle(rng);

        Self {
            id: self.id,
            text: self.text.clone(),
            options,
            correct_key: self.correct_key.clone(),
            explanation: self.explanation.clone(),
        }
    }
}

fn validate(text: &str, options: &[AnswerOption], correct_key: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(QuizError::Validation("Question text is required".to_string()));
    }

    if options.len() < 2 {
        return Err(QuizError::Validation(
            "Question must have at least 2 options".to_string(),
        ));
    }

    if correct_key.is_empty() {
        return Err(QuizError::Validation(
            "Question must have a correct answer".to_string(),
        ));
    }

    if !options.iter().any(|option| option.key == correct_key) {
        return Err(QuizError::Validation(
            "Correct answer key must match one of the options".to_string(),
        ));
    }

    Ok(())
}
