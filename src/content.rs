use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RepositoryError;
use crate::quiz::{AnswerOption, Question};

/// Canonical shape of a question as stored by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_text: String,
    pub options: Vec<AnswerOption>,
    pub correct_answer_key: String,
    #[serde(default)]
    pub explanation: String,
}

/// Keys show up as strings in most banks and as bare numbers in a few.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawKey {
    Text(String),
    Number(serde_json::Number),
}

impl RawKey {
    fn normalized(&self) -> String {
        match self {
            RawKey::Text(text) => text.trim().to_lowercase(),
            RawKey::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOption {
    #[serde(alias = "option_key", alias = "id")]
    pub key: RawKey,
    #[serde(alias = "label", alias = "value")]
    pub text: String,
}

/// Every question shape the known banks have used. Anything else is rejected
/// instead of guessed at.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawQuestionRecord {
    /// Firestore and Supabase: `question_text` / `correct_answer_key`.
    Canonical {
        question_text: String,
        #[serde(default)]
        options: Vec<Value>,
        correct_answer_key: RawKey,
        #[serde(default, alias = "detail")]
        explanation: Option<String>,
    },
    /// Local JSON exports: `question` / `correctAnswerKey`.
    CamelCase {
        question: String,
        #[serde(default)]
        options: Vec<Value>,
        #[serde(rename = "correctAnswerKey")]
        correct_answer_key: RawKey,
        #[serde(default, alias = "detail")]
        explanation: Option<String>,
    },
    /// Oldest bank format: `question` / `answer`.
    Legacy {
        question: String,
        #[serde(default)]
        options: Vec<Value>,
        answer: RawKey,
        #[serde(default, alias = "detail")]
        explanation: Option<String>,
    },
}

impl From<RawQuestionRecord> for QuestionRecord {
    fn from(raw: RawQuestionRecord) -> Self {
        let (text, options, key, explanation) = match raw {
            RawQuestionRecord::Canonical {
                question_text,
                options,
                correct_answer_key,
                explanation,
            } => (question_text, options, correct_answer_key, explanation),
            RawQuestionRecord::CamelCase {
                question,
                options,
                correct_answer_key,
                explanation,
            } => (question, options, correct_answer_key, explanation),
            RawQuestionRecord::Legacy {
                question,
                options,
                answer,
                explanation,
            } => (question, options, answer, explanation),
        };

        QuestionRecord {
            question_text: text.trim().to_string(),
            options: normalize_options(options),
            correct_answer_key: key.normalized(),
            explanation: explanation.unwrap_or_default().trim().to_string(),
        }
    }
}

fn normalize_options(options: Vec<Value>) -> Vec<AnswerOption> {
    options
        .into_iter()
        .filter_map(|value| serde_json::from_value::<RawOption>(value).ok())
        .map(|raw| AnswerOption::new(raw.key.normalized(), raw.text.trim()))
        .filter(|option| !option.key.is_empty() && !option.text.is_empty())
        .collect()
}

/// Converts raw backend documents into valid question records. Documents of an
/// unknown shape, or that would not make a valid question, are skipped.
#[tracing::instrument(skip(values), fields(records.count = values.len()))]
pub fn normalize_records(values: Vec<Value>) -> Vec<QuestionRecord> {
    let total = values.len();
    let records: Vec<QuestionRecord> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let raw = match serde_json::from_value::<RawQuestionRecord>(value) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(record.index = index, error = %e, "Skipping record of unknown shape");
                    return None;
                }
            };
            let record = QuestionRecord::from(raw);
            match Question::validate_record(&record) {
                Ok(()) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        record.index = index,
                        record.preview = %record.question_text.chars().take(60).collect::<String>(),
                        error = %e,
                        "Skipping invalid question"
                    );
                    None
                }
            }
        })
        .collect();

    if records.len() < total {
        tracing::info!(
            records.valid = records.len(),
            records.skipped = total - records.len(),
            "Normalized question records"
        );
    }
    records
}

/// Parses a question bank stored as a JSON array.
#[tracing::instrument(skip(content), fields(content.length = content.len()))]
pub fn parse_question_bank(content: &str) -> Result<Vec<QuestionRecord>, RepositoryError> {
    tracing::debug!("Parsing question bank JSON");

    let values: Vec<Value> = serde_json::from_str(content)
        .map_err(|e| RepositoryError::Parse(format!("Failed to parse question bank: {}", e)))?;

    Ok(normalize_records(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_canonical_bank() {
        let content = r#"[
  {
    "question_text": "  What is the capital of Sweden?  ",
    "options": [
      { "key": "a", "text": "Oslo" },
      { "key": "b", "text": "Stockholm" }
    ],
    "correct_answer_key": "b",
    "explanation": "Stockholm has been the capital since the 13th century."
  }
]"#;

        let records = parse_question_bank(content).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question_text, "What is the capital of Sweden?");
        assert_eq!(records[0].options.len(), 2);
        assert_eq!(records[0].correct_answer_key, "b");
        assert!(records[0].explanation.starts_with("Stockholm"));
    }

    #[test]
    fn test_known_shapes_normalize_to_same_record() {
        let shapes = vec![
            json!({
                "question_text": "2+2?",
                "options": [{"key": "A", "text": "4"}, {"key": "B", "text": "5"}],
                "correct_answer_key": "A"
            }),
            json!({
                "question": "2+2?",
                "options": [{"option_key": "a", "label": "4"}, {"id": "b", "value": "5"}],
                "correctAnswerKey": " a "
            }),
            json!({
                "question": "2+2?",
                "options": [{"key": "a", "text": " 4 "}, {"key": "b", "text": "5"}],
                "answer": "a",
                "detail": ""
            }),
        ];

        let records = normalize_records(shapes);
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record, &records[0]);
        }
        assert_eq!(records[0].correct_answer_key, "a");
        assert_eq!(records[0].options[0], AnswerOption::new("a", "4"));
    }

    #[test]
    fn test_numeric_keys_are_accepted() {
        let records = normalize_records(vec![json!({
            "question": "Pick one",
            "options": [{"key": 1, "text": "One"}, {"key": 2, "text": "Two"}],
            "answer": 2
        })]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].correct_answer_key, "2");
    }

    #[test]
    fn test_unknown_and_invalid_records_are_skipped() {
        let records = normalize_records(vec![
            json!({"prompt": "No known fields", "choices": ["x", "y"]}),
            json!({
                "question_text": "Only one usable option",
                "options": [{"key": "a", "text": "Yes"}, {"key": "", "text": "Blank key"}, {"text": "No key"}],
                "correct_answer_key": "a"
            }),
            json!({
                "question_text": "Answer key missing from options",
                "options": [{"key": "a", "text": "Yes"}, {"key": "b", "text": "No"}],
                "correct_answer_key": "c"
            }),
            json!("not even an object"),
            json!({
                "question_text": "Valid",
                "options": [{"key": "a", "text": "Yes"}, {"key": "b", "text": "No"}],
                "correct_answer_key": "b"
            }),
        ]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question_text, "Valid");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let err = parse_question_bank(r#"{"questions": []}"#).unwrap_err();
        assert!(matches!(err, RepositoryError::Parse(_)));
    }
}
