use std::sync::Arc;

use crate::config::{LeaderboardConfig, QuizConfig};
use crate::repository::ScoreRepository;
use crate::sessions::SessionManagerHandle;

#[derive(Clone, Debug)]
pub struct AppState {
    pub sessions: SessionManagerHandle,
    pub score_repository: Arc<dyn ScoreRepository>,
    pub quiz_config: Arc<QuizConfig>,
    pub leaderboard_config: LeaderboardConfig,
    pub backend_name: &'static str,
    pub pool_size: usize,
}
