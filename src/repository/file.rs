use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{QuestionRepository, ScoreRepository, rank_leaderboard};
use crate::content::{QuestionRecord, parse_question_bank};
use crate::error::RepositoryError;
use crate::quiz::LeaderboardEntry;

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Question bank stored as a local JSON array.
#[derive(Debug)]
pub struct FileQuestionRepository {
    path: PathBuf,
}

impl FileQuestionRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuestionRepository for FileQuestionRepository {
    #[tracing::instrument(skip(self), fields(file.path = %self.path.display()))]
    async fn load_questions(&self) -> Result<Vec<QuestionRecord>, RepositoryError> {
        tracing::info!("Reading question bank from file");
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RepositoryError::FileRead {
                path: display(&self.path),
                source: e,
            })?;

        let records = parse_question_bank(&content)?;
        tracing::info!(questions.count = records.len(), "Question bank loaded");
        Ok(records)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Leaderboard kept as a JSON array of entries. A missing file is an empty
/// leaderboard.
#[derive(Debug)]
pub struct FileScoreRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileScoreRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_entries(&self) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RepositoryError::FileRead {
                    path: display(&self.path),
                    source: e,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            RepositoryError::Parse(format!(
                "Leaderboard file {} is not valid: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl ScoreRepository for FileScoreRepository {
    #[tracing::instrument(skip(self, entry), fields(
        file.path = %self.path.display(),
        player.name = %entry.player_name
    ))]
    async fn save_score(&self, entry: &LeaderboardEntry) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_entries().await?;
        entries.push(entry.clone());

        let serialized = serde_json::to_string_pretty(&entries)
            .map_err(|e| RepositoryError::Parse(format!("Failed to serialize leaderboard: {}", e)))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RepositoryError::FileWrite {
                    path: display(parent),
                    source: e,
                })?;
        }

        tokio::fs::write(&self.path, serialized)
            .await
            .map_err(|e| RepositoryError::FileWrite {
                path: display(&self.path),
                source: e,
            })?;

        tracing::debug!(leaderboard.size = entries.len(), "Score appended");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(file.path = %self.path.display()))]
    async fn fetch_leaderboard(
        &self,
        question_count: usize,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        let entries = self.read_entries().await?;
        Ok(rank_leaderboard(entries, question_count, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("trivia_quiz_repo_{}", uuid::Uuid::new_v4()))
    }

    fn entry(name: &str, score: usize, total: usize) -> LeaderboardEntry {
        LeaderboardEntry {
            player_name: name.to_string(),
            score,
            total_questions_in_quiz: total,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_questions_from_file() {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("questions.json");
        tokio::fs::write(
            &path,
            r#"[
  {"question": "Largest planet?", "options": [{"key": "a", "text": "Jupiter"}, {"key": "b", "text": "Mars"}], "answer": "a"},
  {"question": "Broken", "options": [], "answer": "a"}
]"#,
        )
        .await
        .unwrap();

        let repository = FileQuestionRepository::new(&path);
        let records = repository.load_questions().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question_text, "Largest planet?");
        assert_eq!(repository.backend_name(), "file");
    }

    #[tokio::test]
    async fn test_missing_question_file_is_an_error() {
        let repository = FileQuestionRepository::new(temp_dir().join("nope.json"));
        let err = repository.load_questions().await.unwrap_err();
        assert!(matches!(err, RepositoryError::FileRead { .. }));
    }

    #[tokio::test]
    async fn test_scores_persist_and_rank() {
        let path = temp_dir().join("nested").join("leaderboard.json");
        let repository = FileScoreRepository::new(&path);
        assert!(repository.fetch_leaderboard(10, 5).await.unwrap().is_empty());

        repository.save_score(&entry("Ana", 7, 10)).await.unwrap();
        repository.save_score(&entry("Bea", 9, 10)).await.unwrap();
        repository.save_score(&entry("Cy", 15, 15)).await.unwrap();

        let reopened = FileScoreRepository::new(&path);
        let top = reopened.fetch_leaderboard(10, 5).await.unwrap();
        let names: Vec<&str> = top.iter().map(|e| e.player_name.as_str()).collect();
        assert_eq!(names, vec!["Bea", "Ana"]);

        let top_one = reopened.fetch_leaderboard(10, 1).await.unwrap();
        assert_eq!(top_one.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_leaderboard_is_reported() {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("leaderboard.json");
        tokio::fs::write(&path, "{oops").await.unwrap();

        let repository = FileScoreRepository::new(&path);
        let err = repository.save_score(&entry("Ana", 1, 5)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Parse(_)));
    }
}
