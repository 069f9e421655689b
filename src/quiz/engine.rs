use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::question::{Question, QuestionId};
use super::seen::SeenQuestionsStorage;
use super::session::{AnswerOutcome, LeaderboardEntry, Progress, QuizSession, SessionSummary};
use super::{QuizError, Result};
use crate::content::QuestionRecord;
use crate::error::RepositoryError;
use crate::repository::ScoreRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Idle,
    Ready,
    Playing,
    Complete,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "IDLE",
            EngineState::Ready => "READY",
            EngineState::Playing => "PLAYING",
            EngineState::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SaveScoreError {
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error("Failed to save score: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct StartedQuiz {
    pub question: Question,
    pub progress: Progress,
}

/// Drives one player's quizzes: IDLE → READY → PLAYING → COMPLETE, and back to
/// READY through `restart`. Callers serialize access; nothing here locks.
#[derive(Debug)]
pub struct QuizEngine {
    state: EngineState,
    pool: Vec<Question>,
    session: Option<QuizSession>,
    seen: Option<Box<dyn SeenQuestionsStorage>>,
    score_repository: Arc<dyn ScoreRepository>,
}

impl QuizEngine {
    pub fn new(
        score_repository: Arc<dyn ScoreRepository>,
        seen: Option<Box<dyn SeenQuestionsStorage>>,
    ) -> Self {
        Self {
            state: EngineState::Idle,
            pool: Vec::new(),
            session: None,
            seen,
            score_repository,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == EngineState::Idle
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    pub fn is_complete(&self) -> bool {
        self.state == EngineState::Complete
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Builds the question pool. Only the first call has any effect; later
    /// calls are logged and ignored.
    pub fn load_questions(&mut self, records: Vec<QuestionRecord>) -> Result<()> {
        if self.state != EngineState::Idle {
            tracing::warn!(engine.state = %self.state, "Questions already loaded");
            return Ok(());
        }

        let pool = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| Question::from_record(QuestionId(index), record))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(questions.count = pool.len(), "Question pool loaded");
        self.pool = pool;
        self.state = EngineState::Ready;
        Ok(())
    }

    pub fn start(&mut self, player_name: &str, question_count: usize) -> Result<StartedQuiz> {
        if self.pool.is_empty() {
            return Err(QuizError::InvalidState(
                "No questions available".to_string(),
            ));
        }

        if !matches!(self.state, EngineState::Ready | EngineState::Complete) {
            return Err(QuizError::InvalidState(format!(
                "Cannot start from state: {}",
                self.state
            )));
        }

        if question_count > self.pool.len() {
            return Err(QuizError::InvalidState(format!(
                "Only {} questions available",
                self.pool.len()
            )));
        }

        let selection = self.choose_question_indices(question_count);
        let questions = selection
            .indices
            .iter()
            .map(|&index| self.pool[index].with_shuffled_options())
            .collect();

        let session = QuizSession::new(player_name, questions)?;
        if let Some(seen) = self.seen.as_mut() {
            if selection.new_cycle {
                seen.clear_seen_questions();
            }
            seen.add_seen_question_ids(&selection.indices);
        }

        tracing::info!(
            player.name = %session.player_name(),
            questions.count = question_count,
            pool.size = self.pool.len(),
            "Quiz started"
        );

        let started = StartedQuiz {
            question: session
                .current_question()
                .cloned()
                .ok_or_else(|| QuizError::InvalidState("Session has no questions".to_string()))?,
            progress: session.progress(),
        };

        self.session = Some(session);
        self.state = EngineState::Playing;
        Ok(started)
    }

    pub fn answer_current_question(&mut self, selected_key: &str) -> Result<AnswerOutcome> {
        let session = match (self.state, self.session.as_mut()) {
            (EngineState::Playing, Some(session)) => session,
            _ => {
                return Err(QuizError::InvalidState(
                    "No active quiz session".to_string(),
                ));
            }
        };

        let outcome = session.answer(selected_key)?;
        if outcome.is_session_complete {
            tracing::info!(
                player.name = %session.player_name(),
                "Quiz complete"
            );
            self.state = EngineState::Complete;
        }

        Ok(outcome)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.session.as_ref()?.current_question()
    }

    pub fn current_progress(&self) -> Progress {
        self.session
            .as_ref()
            .map(QuizSession::progress)
            .unwrap_or_else(Progress::empty)
    }

    /// Summary of the current session, complete or not, so scores can be shown
    /// while playing.
    pub fn results(&self) -> SessionSummary {
        self.session
            .as_ref()
            .map(QuizSession::summary)
            .unwrap_or_else(SessionSummary::placeholder)
    }

    /// Hands the finished session to the score sink. Sink failures come back
    /// unchanged; the engine stays COMPLETE either way.
    pub async fn save_score(&self) -> Result<LeaderboardEntry, SaveScoreError> {
        let session = match (self.state, self.session.as_ref()) {
            (EngineState::Complete, Some(session)) => session,
            _ => {
                return Err(QuizError::InvalidState(
                    "Cannot save incomplete quiz".to_string(),
                )
                .into());
            }
        };

        let entry = session.to_leaderboard_entry();
        self.score_repository.save_score(&entry).await?;

        tracing::info!(
            player.name = %entry.player_name,
            score = entry.score,
            total = entry.total_questions_in_quiz,
            "Score saved"
        );
        Ok(entry)
    }

    pub fn restart(&mut self) -> Result<()> {
        if self.state != EngineState::Complete {
            return Err(QuizError::InvalidState(
                "Can only restart completed quiz".to_string(),
            ));
        }

        self.session = None;
        self.state = EngineState::Ready;
        Ok(())
    }

    /// Picks `count` distinct pool indices the player has not seen yet. When
    /// fewer than `count` unseen questions remain the whole pool is eligible
    /// again and the selection asks for the seen-set to be cleared. Nothing is
    /// written to storage here.
    fn choose_question_indices(&self, count: usize) -> Selection {
        let seen: HashSet<usize> = self
            .seen
            .as_ref()
            .map(|storage| storage.seen_question_ids().into_iter().collect())
            .unwrap_or_default();

        let mut available: Vec<usize> = (0..self.pool.len())
            .filter(|index| !seen.contains(index))
            .collect();

        let new_cycle = available.len() < count;
        if new_cycle {
            tracing::info!(
                questions.unseen = available.len(),
                questions.requested = count,
                "All questions seen, starting a new cycle through the bank"
            );
            available = (0..self.pool.len()).collect();
        }

        available.shuffle(&mut thread_rng());
        available.truncate(count);
        Selection {
            indices: available,
            new_cycle,
        }
    }
}

struct Selection {
    indices: Vec<usize>,
    new_cycle: bool,
}
