use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Result as WebResult, WebError};
use crate::config::QuizConfig;
use crate::quiz::{
    AnswerOption, AnswerOutcome, EngineState, LeaderboardEntry, Progress, Question,
    SessionSummary,
};
use crate::sessions::{SessionActorHandle, SessionDetails};
use crate::state::AppState;

const ANONYMOUS_PLAYER: &str = "Anónimo";

/// A question as clients see it before answering: no correct key, no
/// explanation.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub question_id: usize,
    pub question_text: String,
    pub options: Vec<AnswerOption>,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        QuestionView {
            question_id: question.id().0,
            question_text: question.text().to_string(),
            options: question.options().to_vec(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateSessionRequest {
    pub client_id: Option<Uuid>,
}

#[derive(Deserialize, Debug)]
pub struct StartRequest {
    pub player_name: String,
    pub question_count: Option<usize>,
}

#[derive(Serialize, Debug)]
pub struct StartResponse {
    pub state: EngineState,
    pub question: QuestionView,
    pub progress: Progress,
}

#[derive(Serialize, Debug)]
pub struct QuestionResponse {
    pub state: EngineState,
    pub question: Option<QuestionView>,
    pub progress: Progress,
}

#[derive(Deserialize, Debug)]
pub struct AnswerRequest {
    pub selected_key: String,
}

#[derive(Serialize, Debug)]
pub struct AnswerResponse {
    #[serde(flatten)]
    pub outcome: AnswerOutcome,
    pub next_question: Option<QuestionView>,
    pub state: EngineState,
}

#[derive(Serialize, Debug)]
pub struct StateResponse {
    pub state: EngineState,
}

#[derive(Deserialize, Debug, Default)]
pub struct LeaderboardQuery {
    pub question_count: Option<usize>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub position: usize,
    pub player_name: String,
    pub score: usize,
    pub score_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct LeaderboardResponse {
    pub question_count: usize,
    pub entries: Vec<LeaderboardRow>,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub pool_size: usize,
}

/// Trimmed name, or an error when its length is outside the configured bounds.
pub fn validate_player_name(name: &str, config: &QuizConfig) -> WebResult<String> {
    let trimmed = name.trim();
    let length = trimmed.chars().count();
    if length < config.min_name_length || length > config.max_name_length {
        return Err(WebError::BadRequest(format!(
            "Player name must be between {} and {} characters",
            config.min_name_length, config.max_name_length
        )));
    }
    Ok(trimmed.to_string())
}

pub fn resolve_question_count(requested: Option<usize>, config: &QuizConfig) -> WebResult<usize> {
    let count = requested.unwrap_or(config.default_length);
    if !config.allowed_lengths.contains(&count) {
        return Err(WebError::BadRequest(format!(
            "Quiz length must be one of {:?}",
            config.allowed_lengths
        )));
    }
    Ok(count)
}

pub fn format_leaderboard(entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardRow> {
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let name = entry.player_name.trim();
            LeaderboardRow {
                position: index + 1,
                player_name: if name.is_empty() {
                    ANONYMOUS_PLAYER.to_string()
                } else {
                    name.to_string()
                },
                score: entry.score,
                score_text: format!("{}/{}", entry.score, entry.total_questions_in_quiz),
                created_at: entry.created_at,
            }
        })
        .collect()
}

async fn session_handle(app_state: &AppState, session_id: Uuid) -> WebResult<SessionActorHandle> {
    app_state
        .sessions
        .get_session_handle(session_id)
        .await
        .ok_or(WebError::SessionNotFound(session_id))
}

pub async fn create_session_handler(
    State(app_state): State<AppState>,
    payload: Option<Json<CreateSessionRequest>>,
) -> WebResult<Json<SessionDetails>> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    tracing::debug!(client.id = ?payload.client_id, "HTTP: Received create_session request");
    let details = app_state.sessions.create_session(payload.client_id).await?;
    Ok(Json(details))
}

pub async fn start_quiz_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<StartRequest>,
) -> WebResult<Json<StartResponse>> {
    let player_name = validate_player_name(&payload.player_name, &app_state.quiz_config)?;
    let question_count = resolve_question_count(payload.question_count, &app_state.quiz_config)?;

    let started = session_handle(&app_state, session_id)
        .await?
        .start(player_name, question_count)
        .await?;

    Ok(Json(StartResponse {
        state: EngineState::Playing,
        question: QuestionView::from(&started.question),
        progress: started.progress,
    }))
}

pub async fn current_question_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<QuestionResponse>> {
    let snapshot = session_handle(&app_state, session_id)
        .await?
        .current_question()
        .await?;

    Ok(Json(QuestionResponse {
        state: snapshot.state,
        question: snapshot.question.as_ref().map(QuestionView::from),
        progress: snapshot.progress,
    }))
}

pub async fn answer_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> WebResult<Json<AnswerResponse>> {
    let reply = session_handle(&app_state, session_id)
        .await?
        .answer(payload.selected_key)
        .await?;

    Ok(Json(AnswerResponse {
        next_question: reply.next_question.as_ref().map(QuestionView::from),
        outcome: reply.outcome,
        state: reply.state,
    }))
}

pub async fn results_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<SessionSummary>> {
    let summary = session_handle(&app_state, session_id)
        .await?
        .results()
        .await?;
    Ok(Json(summary))
}

pub async fn save_score_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<LeaderboardEntry>> {
    let entry = session_handle(&app_state, session_id)
        .await?
        .save_score()
        .await
        .map_err(|e| {
            tracing::error!(session.id = %session_id, error = %e, "Failed to save score");
            WebError::from(e)
        })?;
    Ok(Json(entry))
}

pub async fn restart_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<StateResponse>> {
    let state = session_handle(&app_state, session_id)
        .await?
        .restart()
        .await?;
    Ok(Json(StateResponse { state }))
}

pub async fn leaderboard_handler(
    State(app_state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> WebResult<Json<LeaderboardResponse>> {
    let question_count = query
        .question_count
        .unwrap_or(app_state.quiz_config.default_length);

    let entries = app_state
        .score_repository
        .fetch_leaderboard(question_count, app_state.leaderboard_config.max_entries)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch leaderboard");
            WebError::Upstream(e.to_string())
        })?;

    Ok(Json(LeaderboardResponse {
        question_count,
        entries: format_leaderboard(entries),
    }))
}

pub async fn health_handler(State(app_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: app_state.backend_name,
        pool_size: app_state.pool_size,
    })
}
