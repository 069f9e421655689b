use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use super::{QuestionRepository, ScoreRepository, ensure_success};
use crate::config::SupabaseConfig;
use crate::content::{QuestionRecord, normalize_records};
use crate::error::RepositoryError;
use crate::quiz::LeaderboardEntry;

const QUESTIONS_TABLE: &str = "questions";
const LEADERBOARD_TABLE: &str = "leaderboard";
const LEADERBOARD_COLUMNS: &str = "player_name,score,total_questions_in_quiz,created_at";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Questions and leaderboard served by a Supabase project through PostgREST.
#[derive(Debug, Clone)]
pub struct SupabaseRepository {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseRepository {
    pub fn new(config: SupabaseConfig) -> Result<Self, RepositoryError> {
        if config.url.trim().is_empty() || config.anon_key.trim().is_empty() {
            return Err(RepositoryError::Config(
                "Supabase url and anon_key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RepositoryError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    fn questions_request(&self) -> RequestBuilder {
        self.authorized(self.client.get(self.table_url(QUESTIONS_TABLE)))
            .query(&[("select", "*")])
    }

    fn insert_score_request(&self, entry: &LeaderboardEntry) -> RequestBuilder {
        self.authorized(self.client.post(self.table_url(LEADERBOARD_TABLE)))
            .header("Prefer", "return=minimal")
            .json(entry)
    }

    fn leaderboard_request(&self, question_count: usize, limit: usize) -> RequestBuilder {
        let count_filter = format!("eq.{}", question_count);
        let limit = limit.to_string();
        self.authorized(self.client.get(self.table_url(LEADERBOARD_TABLE)))
            .query(&[
                ("select", LEADERBOARD_COLUMNS),
                ("total_questions_in_quiz", count_filter.as_str()),
                ("order", "score.desc,created_at.asc"),
                ("limit", limit.as_str()),
            ])
    }

    fn fetch_error(url: &str) -> impl FnOnce(reqwest::Error) -> RepositoryError + '_ {
        move |e| RepositoryError::HttpFetch {
            url: url.to_string(),
            source: e,
        }
    }
}

#[async_trait]
impl QuestionRepository for SupabaseRepository {
    #[tracing::instrument(skip(self), fields(supabase.url = %self.base_url))]
    async fn load_questions(&self) -> Result<Vec<QuestionRecord>, RepositoryError> {
        let url = self.table_url(QUESTIONS_TABLE);
        tracing::info!("Fetching questions from Supabase");

        let response = self
            .questions_request()
            .send()
            .await
            .map_err(Self::fetch_error(&url))?;
        let rows: Vec<Value> = ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(Self::fetch_error(&url))?;

        let records = normalize_records(rows);
        tracing::info!(questions.count = records.len(), "Questions loaded from Supabase");
        Ok(records)
    }

    fn backend_name(&self) -> &'static str {
        "supabase"
    }
}

#[async_trait]
impl ScoreRepository for SupabaseRepository {
    #[tracing::instrument(skip(self, entry), fields(player.name = %entry.player_name))]
    async fn save_score(&self, entry: &LeaderboardEntry) -> Result<(), RepositoryError> {
        let url = self.table_url(LEADERBOARD_TABLE);
        let response = self
            .insert_score_request(entry)
            .send()
            .await
            .map_err(Self::fetch_error(&url))?;
        ensure_success(&url, response).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_leaderboard(
        &self,
        question_count: usize,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        let url = self.table_url(LEADERBOARD_TABLE);
        let response = self
            .leaderboard_request(question_count, limit)
            .send()
            .await
            .map_err(Self::fetch_error(&url))?;
        let entries: Vec<LeaderboardEntry> = ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(Self::fetch_error(&url))?;

        tracing::debug!(leaderboard.size = entries.len(), "Leaderboard fetched");
        Ok(entries)
    }
}
