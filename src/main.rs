use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod content;
mod error;
mod quiz;
mod repository;
mod sessions;
mod state;
mod web;

use crate::config::load_settings;
use crate::error::Result as AppResult;
use crate::repository::build_repositories;
use crate::sessions::{SessionManagerHandle, SessionSettings};
use crate::state::AppState;
use crate::web::run_server;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=info,tower_http=debug", env!("CARGO_PKG_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_settings = load_settings()?;
    tracing::info!(
        content.source = ?app_settings.content.source_type,
        quiz.default_length = app_settings.quiz.default_length,
        quiz.allowed_lengths = ?app_settings.quiz.allowed_lengths,
        "Configuration loaded"
    );

    let repositories = build_repositories(&app_settings.content)?;
    let pool = repositories.questions.load_questions().await?;
    if pool.is_empty() {
        tracing::warn!("Question bank is empty; quizzes cannot be started");
    } else {
        tracing::info!(questions.count = pool.len(), "Question pool ready");
    }
    let pool_size = pool.len();

    let sessions = SessionManagerHandle::spawn(
        32,
        SessionSettings {
            pool: Arc::new(pool),
            score_repository: Arc::clone(&repositories.scores),
            seen_questions_dir: app_settings.quiz.seen_questions_dir.clone().map(PathBuf::from),
            inactivity_timeout: Duration::from_secs(app_settings.sessions.inactivity_timeout_secs),
        },
    );

    let app_state = AppState {
        sessions,
        score_repository: repositories.scores,
        backend_name: repositories.questions.backend_name(),
        quiz_config: Arc::new(app_settings.quiz),
        leaderboard_config: app_settings.leaderboard,
        pool_size,
    };

    run_server(app_state, app_settings.server).await?;

    Ok(())
}
