use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::{AnswerOption, Question, RevealedAnswer};
use super::score::{Score, ScoreCalculator, Streaks, is_streak_milestone};
use super::{QuizError, Result};

#[derive(Debug, Clone)]
pub struct AnswerRecord {
    pub question: Question,
    pub selected_key: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// 1-based position of the question being shown.
    pub current: usize,
    pub total: usize,
    pub percentage: u32,
}

impl Progress {
    pub fn at(index: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (index as f64 / total as f64 * 100.0).round() as u32
        } else {
            0
        };

        Self {
            current: index + 1,
            total,
            percentage,
        }
    }

    pub fn empty() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0,
        }
    }
}

/// Result of answering one question. `correct_answer` always describes the
/// question that was just answered, not the next one.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_answer: RevealedAnswer,
    pub progress: Progress,
    pub is_session_complete: bool,
    pub current_streak: usize,
    pub streak_milestone: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnsweredQuestion {
    pub question_text: String,
    pub selected_key: String,
    pub correct_key: String,
    pub explanation: String,
    pub is_correct: bool,
    pub options: Vec<AnswerOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub player_name: String,
    pub score: Score,
    pub streaks: Streaks,
    pub answers: Vec<AnsweredQuestion>,
    pub duration_ms: i64,
}

impl SessionSummary {
    /// Zeroed results for an engine that has never started a session.
    pub fn placeholder() -> Self {
        Self {
            player_name: String::new(),
            score: Score::default(),
            streaks: Streaks::default(),
            answers: Vec::new(),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_name: String,
    pub score: usize,
    pub total_questions_in_quiz: usize,
    pub created_at: DateTime<Utc>,
}

/// One player's run through a fixed list of questions.
#[derive(Debug)]
pub struct QuizSession {
    player_name: String,
    questions: Vec<Question>,
    answers: Vec<AnswerRecord>,
    current_index: usize,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl QuizSession {
    pub fn new(player_name: &str, questions: Vec<Question>) -> Result<Self> {
        Self::started_at(player_name, questions, Utc::now())
    }

    pub fn started_at(
        player_name: &str,
        questions: Vec<Question>,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(QuizError::Validation("Player name is required".to_string()));
        }

        if questions.is_empty() {
            return Err(QuizError::Validation(
                "Session must have at least one question".to_string(),
            ));
        }

        Ok(Self {
            player_name: player_name.to_string(),
            questions,
            answers: Vec::new(),
            current_index: 0,
            started_at,
            completed_at: None,
        })
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.questions.len()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn answer(&mut self, selected_key: &str) -> Result<AnswerOutcome> {
        let Some(question) = self.current_question().cloned() else {
            return Err(QuizError::InvalidState(
                "Cannot answer - quiz is complete".to_string(),
            ));
        };

        let is_correct = question.is_correct(selected_key);
        let correct_answer = question.reveal_answer();
        let now = Utc::now();

        self.answers.push(AnswerRecord {
            question,
            selected_key: selected_key.to_string(),
            is_correct,
            answered_at: now,
        });
        self.current_index += 1;

        if self.is_complete() {
            self.completed_at = Some(now);
        }

        let current_streak = self.calculate_streaks().current;

        Ok(AnswerOutcome {
            is_correct,
            correct_answer,
            progress: self.progress(),
            is_session_complete: self.is_complete(),
            current_streak,
            streak_milestone: is_correct && is_streak_milestone(current_streak),
        })
    }

    pub fn progress(&self) -> Progress {
        Progress::at(self.current_index, self.total_questions())
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn calculate_score(&self) -> Score {
        ScoreCalculator::calculate(self.answers.iter().map(|a| a.is_correct))
    }

    pub fn calculate_streaks(&self) -> Streaks {
        ScoreCalculator::calculate_streaks(self.answers.iter().map(|a| a.is_correct))
    }

    pub fn summary(&self) -> SessionSummary {
        let answers = self
            .answers
            .iter()
            .map(|record| {
                let revealed = record.question.reveal_answer();
                AnsweredQuestion {
                    question_text: record.question.text().to_string(),
                    selected_key: record.selected_key.clone(),
                    correct_key: revealed.correct_key,
                    explanation: revealed.explanation,
                    is_correct: record.is_correct,
                    options: record.question.options().to_vec(),
                }
            })
            .collect();

        let finished_at = self.completed_at.unwrap_or_else(Utc::now);

        SessionSummary {
            player_name: self.player_name.clone(),
            score: self.calculate_score(),
            streaks: self.calculate_streaks(),
            answers,
            duration_ms: (finished_at - self.started_at).num_milliseconds(),
        }
    }

    pub fn to_leaderboard_entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            player_name: self.player_name.clone(),
            score: self.calculate_score().correct,
            total_questions_in_quiz: self.total_questions(),
            created_at: self.completed_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::question::QuestionId;
    use chrono::Duration;

    fn question(n: usize) -> Question {
        Question::new(
            QuestionId(n),
            &format!("Question {}", n),
            vec![AnswerOption::new("a", "Right"), AnswerOption::new("b", "Wrong")],
            "a",
            "",
        )
        .unwrap()
    }

    fn session_of(count: usize) -> QuizSession {
        QuizSession::new("Ana", (0..count).map(question).collect()).unwrap()
    }

    #[test]
    fn test_rejects_blank_player_and_empty_questions() {
        assert_eq!(
            QuizSession::new("   ", vec![question(0)]).unwrap_err(),
            QuizError::Validation("Player name is required".to_string())
        );
        assert!(matches!(
            QuizSession::new("Ana", Vec::new()),
            Err(QuizError::Validation(_))
        ));
    }

    #[test]
    fn test_player_name_is_trimmed() {
        let session = QuizSession::new("  Ana ", vec![question(0)]).unwrap();
        assert_eq!(session.player_name(), "Ana");
    }

    #[test]
    fn test_completes_after_last_answer_only() {
        let mut session = session_of(3);

        for round in 0..3 {
            assert!(!session.is_complete(), "complete too early at {}", round);
            let outcome = session.answer("a").unwrap();
            assert_eq!(outcome.is_session_complete, round == 2);
        }

        assert!(session.is_complete());
        assert!(session.current_question().is_none());
        assert_eq!(
            session.answer("a").unwrap_err(),
            QuizError::InvalidState("Cannot answer - quiz is complete".to_string())
        );
        assert_eq!(session.answers().len(), 3);
    }

    #[test]
    fn test_outcome_describes_answered_question() {
        let mut session = session_of(2);
        let outcome = session.answer("b").unwrap();

        assert!(!outcome.is_correct);
        assert_eq!(outcome.correct_answer.correct_key, "a");
        assert_eq!(outcome.progress.current, 2);
        assert_eq!(outcome.progress.percentage, 50);
        assert_eq!(session.current_question().unwrap().text(), "Question 1");
    }

    #[test]
    fn test_progress_percentage() {
        let mut session = session_of(4);
        assert_eq!(session.progress(), Progress::at(0, 4));
        assert_eq!(session.progress().current, 1);
        assert_eq!(session.progress().percentage, 0);

        session.answer("a").unwrap();
        assert_eq!(session.progress().current, 2);
        assert_eq!(session.progress().percentage, 25);

        assert_eq!(Progress::at(1, 3).percentage, 33);
        assert_eq!(Progress::at(2, 3).percentage, 67);
    }

    #[test]
    fn test_streak_reported_with_each_answer() {
        let mut session = session_of(5);
        let streaks: Vec<(usize, bool)> = ["a", "a", "a", "b", "a"]
            .iter()
            .map(|key| {
                let outcome = session.answer(key).unwrap();
                (outcome.current_streak, outcome.streak_milestone)
            })
            .collect();
        assert_eq!(
            streaks,
            vec![(1, false), (2, false), (3, true), (0, false), (1, false)]
        );
    }

    #[test]
    fn test_summary_and_leaderboard_entry() {
        let started = Utc::now() - Duration::seconds(30);
        let mut session =
            QuizSession::started_at("Ana", vec![question(0), question(1)], started).unwrap();

        let live = session.summary();
        assert!(live.duration_ms >= 30_000);
        assert!(live.answers.is_empty());

        session.answer("a").unwrap();
        session.answer("b").unwrap();

        let summary = session.summary();
        assert_eq!(summary.player_name, "Ana");
        assert_eq!(summary.score.correct, 1);
        assert_eq!(summary.score.total, 2);
        assert_eq!(summary.streaks.longest, 1);
        assert_eq!(summary.answers[1].selected_key, "b");
        assert_eq!(summary.answers[1].correct_key, "a");
        assert!(!summary.answers[1].is_correct);
        assert_eq!(summary.answers[1].options.len(), 2);

        let entry = session.to_leaderboard_entry();
        assert_eq!(entry.player_name, "Ana");
        assert_eq!(entry.score, 1);
        assert_eq!(entry.total_questions_in_quiz, 2);
        assert_eq!(
            summary.duration_ms,
            (entry.created_at - started).num_milliseconds()
        );
    }
}
