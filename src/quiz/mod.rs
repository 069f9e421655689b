use thiserror::Error;

pub mod engine;
pub mod question;
pub mod score;
pub mod seen;
pub mod session;

pub use engine::{EngineState, QuizEngine, SaveScoreError, StartedQuiz};
pub use question::{AnswerOption, Question};
pub use seen::{InMemorySeenQuestions, JsonFileSeenQuestions, SeenQuestionsStorage};
pub use session::{AnswerOutcome, LeaderboardEntry, Progress, SessionSummary};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizError {
    /// Malformed input when building a question or a session.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Operation not allowed in the current state of the engine or session.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T, E = QuizError> = std::result::Result<T, E>;
