use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ContentConfig, ContentSourceType};
use crate::content::{QuestionRecord, parse_question_bank};
use crate::error::RepositoryError;
use crate::quiz::LeaderboardEntry;

pub mod file;
pub mod firestore;
pub mod supabase;

pub use self::file::{FileQuestionRepository, FileScoreRepository};
pub use self::firestore::FirestoreRepository;
pub use self::supabase::SupabaseRepository;

/// Source of raw question records. Implementations return records already
/// normalized; loading happens once at startup.
#[async_trait]
pub trait QuestionRepository: Send + Sync + Debug {
    async fn load_questions(&self) -> Result<Vec<QuestionRecord>, RepositoryError>;

    fn backend_name(&self) -> &'static str;
}

/// Sink and query side of the leaderboard.
#[async_trait]
pub trait ScoreRepository: Send + Sync + Debug {
    async fn save_score(&self, entry: &LeaderboardEntry) -> Result<(), RepositoryError>;

    /// Best entries for quizzes of `question_count` questions, highest score
    /// first, earlier submissions winning ties.
    async fn fetch_leaderboard(
        &self,
        question_count: usize,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, RepositoryError>;
}

/// Passes successful responses through; anything else becomes
/// `RepositoryError::Status` with the response body attached.
pub(crate) async fn ensure_success(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error body".to_string());
    tracing::error!(http.status = status.as_u16(), url = %url, body = %body, "Backend request failed");
    Err(RepositoryError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Filters, orders and truncates entries the way every backend's leaderboard
/// query does.
pub fn rank_leaderboard(
    entries: impl IntoIterator<Item = LeaderboardEntry>,
    question_count: usize,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<LeaderboardEntry> = entries
        .into_iter()
        .filter(|entry| entry.total_questions_in_quiz == question_count)
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    ranked.truncate(limit);
    ranked
}

/// Wraps a remote question source with a local copy of the last good bank.
#[derive(Debug)]
pub struct CachingQuestionRepository {
    inner: Arc<dyn QuestionRepository>,
    cache_path: PathBuf,
}

impl CachingQuestionRepository {
    pub fn new(inner: Arc<dyn QuestionRepository>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            cache_path: cache_path.into(),
        }
    }

    async fn write_cache(&self, records: &[QuestionRecord]) {
        let serialized = match serde_json::to_string_pretty(records) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize question cache");
                return;
            }
        };

        if let Some(parent) = self.cache_path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!(dir.path = %parent.display(), error = %e, "Failed to create cache directory");
            return;
        }

        match tokio::fs::write(&self.cache_path, serialized).await {
            Ok(()) => tracing::debug!(
                file.path = %self.cache_path.display(),
                questions.count = records.len(),
                "Question cache updated"
            ),
            Err(e) => tracing::warn!(
                file.path = %self.cache_path.display(),
                error = %e,
                "Failed to write question cache"
            ),
        }
    }

    async fn read_cache(&self) -> Result<Vec<QuestionRecord>, RepositoryError> {
        let content = tokio::fs::read_to_string(&self.cache_path)
            .await
            .map_err(|e| RepositoryError::FileRead {
                path: self.cache_path.display().to_string(),
                source: e,
            })?;
        parse_question_bank(&content)
    }
}

#[async_trait]
impl QuestionRepository for CachingQuestionRepository {
    #[tracing::instrument(skip(self), fields(
        backend = self.inner.backend_name(),
        cache.path = %self.cache_path.display()
    ))]
    async fn load_questions(&self) -> Result<Vec<QuestionRecord>, RepositoryError> {
        match self.inner.load_questions().await {
            Ok(records) => {
                self.write_cache(&records).await;
                Ok(records)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Question backend unavailable, trying local cache");
                match self.read_cache().await {
                    Ok(records) if !records.is_empty() => {
                        tracing::info!(
                            questions.count = records.len(),
                            "Serving questions from local cache"
                        );
                        Ok(records)
                    }
                    Ok(_) => Err(e),
                    Err(cache_err) => {
                        tracing::debug!(error = %cache_err, "No usable question cache");
                        Err(e)
                    }
                }
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[derive(Debug, Clone)]
pub struct Repositories {
    pub questions: Arc<dyn QuestionRepository>,
    pub scores: Arc<dyn ScoreRepository>,
}

/// Builds the question source and score sink for the configured backend.
pub fn build_repositories(config: &ContentConfig) -> Result<Repositories, RepositoryError> {
    let (questions, scores): (Arc<dyn QuestionRepository>, Arc<dyn ScoreRepository>) =
        match config.source_type {
            ContentSourceType::File => (
                Arc::new(FileQuestionRepository::new(&config.file_path)),
                Arc::new(FileScoreRepository::new(&config.leaderboard_path)),
            ),
            ContentSourceType::Supabase => {
                let settings = config.supabase.as_ref().ok_or_else(|| {
                    RepositoryError::Config("Supabase settings missing".to_string())
                })?;
                let repository = Arc::new(SupabaseRepository::new(settings.clone())?);
                (
                    repository.clone() as Arc<dyn QuestionRepository>,
                    repository as Arc<dyn ScoreRepository>,
                )
            }
            ContentSourceType::Firestore => {
                let settings = config.firestore.as_ref().ok_or_else(|| {
                    RepositoryError::Config("Firestore settings missing".to_string())
                })?;
                let repository = Arc::new(FirestoreRepository::new(settings.clone())?);
                (
                    repository.clone() as Arc<dyn QuestionRepository>,
                    repository as Arc<dyn ScoreRepository>,
                )
            }
        };

    let questions: Arc<dyn QuestionRepository> = match (&config.source_type, &config.cache_path) {
        (ContentSourceType::File, Some(_)) => {
            tracing::debug!("Question cache ignored for file backend");
            questions
        }
        (_, Some(cache_path)) => Arc::new(CachingQuestionRepository::new(questions, cache_path)),
        (_, None) => questions,
    };

    tracing::info!(
        backend = questions.backend_name(),
        "Content repositories configured"
    );
    Ok(Repositories { questions, scores })
}
