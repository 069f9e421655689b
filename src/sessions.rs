use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::content::QuestionRecord;
use crate::error::RepositoryError;
use crate::quiz::{
    AnswerOutcome, EngineState, InMemorySeenQuestions, JsonFileSeenQuestions, LeaderboardEntry,
    Progress, Question, QuizEngine, QuizError, SaveScoreError, SeenQuestionsStorage,
    SessionSummary, StartedQuiz,
};
use crate::repository::ScoreRepository;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("Session {0} is no longer running")]
    Closed(Uuid),
    #[error("Session manager is not running")]
    ManagerUnavailable,
}

impl From<SaveScoreError> for SessionError {
    fn from(err: SaveScoreError) -> Self {
        match err {
            SaveScoreError::Quiz(e) => SessionError::Quiz(e),
            SaveScoreError::Repository(e) => SessionError::Repository(e),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetails {
    pub session_id: Uuid,
    pub state: EngineState,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct QuestionSnapshot {
    pub state: EngineState,
    pub question: Option<Question>,
    pub progress: Progress,
}

#[derive(Debug, Clone)]
pub struct AnswerReply {
    pub outcome: AnswerOutcome,
    pub next_question: Option<Question>,
    pub state: EngineState,
}

/// Everything a new session needs from the server.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub pool: Arc<Vec<QuestionRecord>>,
    pub score_repository: Arc<dyn ScoreRepository>,
    pub seen_questions_dir: Option<PathBuf>,
    pub inactivity_timeout: Duration,
}

#[derive(Debug)]
pub enum SessionManagerMessage {
    CreateSession {
        client_id: Option<Uuid>,
        respond_to: oneshot::Sender<Result<SessionDetails, SessionError>>,
    },
    GetSessionHandle {
        session_id: Uuid,
        respond_to: oneshot::Sender<Option<SessionActorHandle>>,
    },
    SessionActorShutdown {
        session_id: Uuid,
    },
}

pub struct SessionManagerActor {
    receiver: mpsc::Receiver<SessionManagerMessage>,
    sessions: HashMap<Uuid, SessionActorHandle>,
    self_sender: mpsc::Sender<SessionManagerMessage>,
    settings: SessionSettings,
}

impl SessionManagerActor {
    fn new(
        receiver: mpsc::Receiver<SessionManagerMessage>,
        self_sender: mpsc::Sender<SessionManagerMessage>,
        settings: SessionSettings,
    ) -> Self {
        SessionManagerActor {
            receiver,
            sessions: HashMap::new(),
            self_sender,
            settings,
        }
    }

    fn seen_storage(&self, client_id: Option<Uuid>) -> Box<dyn SeenQuestionsStorage> {
        match (&self.settings.seen_questions_dir, client_id) {
            (Some(dir), Some(client_id)) => {
                Box::new(JsonFileSeenQuestions::new(dir.join(format!("{}.json", client_id))))
            }
            _ => Box::new(InMemorySeenQuestions::new()),
        }
    }

    fn create_session(&mut self, client_id: Option<Uuid>) -> Result<SessionDetails, SessionError> {
        let session_id = Uuid::new_v4();
        let mut engine = QuizEngine::new(
            Arc::clone(&self.settings.score_repository),
            Some(self.seen_storage(client_id)),
        );
        engine.load_questions(self.settings.pool.as_ref().clone())?;

        let details = SessionDetails {
            session_id,
            state: engine.state(),
            pool_size: engine.pool_size(),
        };

        let manager_handle = SessionManagerHandle {
            sender: self.self_sender.clone(),
        };
        let handle = SessionActorHandle::spawn(
            session_id,
            32,
            manager_handle,
            engine,
            self.settings.inactivity_timeout,
        );
        self.sessions.insert(session_id, handle);

        tracing::info!(
            session.id = %session_id,
            client.id = ?client_id,
            sessions.active = self.sessions.len(),
            "Quiz session created"
        );
        Ok(details)
    }

    #[tracing::instrument(skip(self, msg), fields(
        msg_type = %std::any::type_name_of_val(&msg)
    ))]
    async fn handle_message(&mut self, msg: SessionManagerMessage) {
        match msg {
            SessionManagerMessage::CreateSession {
                client_id,
                respond_to,
            } => {
                let result = self.create_session(client_id);
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Failed to create quiz session");
                }
                let _ = respond_to.send(result);
            }
            SessionManagerMessage::GetSessionHandle {
                session_id,
                respond_to,
            } => {
                tracing::debug!(session.id = %session_id, "Received GetSessionHandle request");
                let _ = respond_to.send(self.sessions.get(&session_id).cloned());
            }
            SessionManagerMessage::SessionActorShutdown { session_id } => {
                if self.sessions.remove(&session_id).is_some() {
                    tracing::info!(
                        session.id = %session_id,
                        sessions.active = self.sessions.len(),
                        "Cleaning up session after actor shutdown"
                    );
                } else {
                    tracing::warn!(session.id = %session_id, "Received shutdown for unknown session");
                }
            }
        }
    }
}

#[tracing::instrument(skip(actor))]
pub async fn run_session_manager_actor(mut actor: SessionManagerActor) {
    tracing::info!("SessionManager actor started");
    while let Some(msg) = actor.receiver.recv().await {
        actor.handle_message(msg).await;
    }
    tracing::info!("SessionManager actor stopped");
}

#[derive(Clone, Debug)]
pub struct SessionManagerHandle {
    sender: mpsc::Sender<SessionManagerMessage>,
}

impl SessionManagerHandle {
    pub fn spawn(buffer_size: usize, settings: SessionSettings) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = SessionManagerActor::new(receiver, sender.clone(), settings);
        tokio::spawn(run_session_manager_actor(actor));
        Self { sender }
    }

    pub async fn create_session(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<SessionDetails, SessionError> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(SessionManagerMessage::CreateSession {
                client_id,
                respond_to,
            })
            .await
            .map_err(|_| SessionError::ManagerUnavailable)?;
        rx.await.map_err(|_| SessionError::ManagerUnavailable)?
    }

    pub async fn get_session_handle(&self, session_id: Uuid) -> Option<SessionActorHandle> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionManagerMessage::GetSessionHandle {
                session_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn notify_session_shutdown(&self, session_id: Uuid) -> Result<(), String> {
        self.sender
            .send(SessionManagerMessage::SessionActorShutdown { session_id })
            .await
            .map_err(|e| format!("Failed to send SessionActorShutdown: {}", e))
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    Start {
        player_name: String,
        question_count: usize,
        respond_to: oneshot::Sender<Result<StartedQuiz, SessionError>>,
    },
    CurrentQuestion {
        respond_to: oneshot::Sender<QuestionSnapshot>,
    },
    Answer {
        selected_key: String,
        respond_to: oneshot::Sender<Result<AnswerReply, SessionError>>,
    },
    Results {
        respond_to: oneshot::Sender<SessionSummary>,
    },
    SaveScore {
        respond_to: oneshot::Sender<Result<LeaderboardEntry, SessionError>>,
    },
    Restart {
        respond_to: oneshot::Sender<Result<EngineState, SessionError>>,
    },
}

/// Owns one engine; every call on it goes through this actor's mailbox.
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionCommand>,
    session_id: Uuid,
    engine: QuizEngine,
    manager_handle: SessionManagerHandle,
}

impl SessionActor {
    fn new(
        receiver: mpsc::Receiver<SessionCommand>,
        session_id: Uuid,
        engine: QuizEngine,
        manager_handle: SessionManagerHandle,
    ) -> Self {
        SessionActor {
            receiver,
            session_id,
            engine,
            manager_handle,
        }
    }

    #[tracing::instrument(skip(self, msg), fields(
        session.id = %self.session_id,
        engine.state = %self.engine.state(),
        msg_type = %std::any::type_name_of_val(&msg)
    ))]
    async fn handle_message(&mut self, msg: SessionCommand) {
        match msg {
            SessionCommand::Start {
                player_name,
                question_count,
                respond_to,
            } => {
                let result = self
                    .engine
                    .start(&player_name, question_count)
                    .map_err(SessionError::from);
                let _ = respond_to.send(result);
            }
            SessionCommand::CurrentQuestion { respond_to } => {
                let _ = respond_to.send(QuestionSnapshot {
                    state: self.engine.state(),
                    question: self.engine.current_question().cloned(),
                    progress: self.engine.current_progress(),
                });
            }
            SessionCommand::Answer {
                selected_key,
                respond_to,
            } => {
                let result = self
                    .engine
                    .answer_current_question(&selected_key)
                    .map(|outcome| AnswerReply {
                        outcome,
                        next_question: self.engine.current_question().cloned(),
                        state: self.engine.state(),
                    })
                    .map_err(SessionError::from);
                let _ = respond_to.send(result);
            }
            SessionCommand::Results { respond_to } => {
                let _ = respond_to.send(self.engine.results());
            }
            SessionCommand::SaveScore { respond_to } => {
                let result = self.engine.save_score().await.map_err(SessionError::from);
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Failed to save score");
                }
                let _ = respond_to.send(result);
            }
            SessionCommand::Restart { respond_to } => {
                let result = self
                    .engine
                    .restart()
                    .map(|()| self.engine.state())
                    .map_err(SessionError::from);
                let _ = respond_to.send(result);
            }
        }
    }
}

#[tracing::instrument(skip(actor), fields(session.id = %actor.session_id))]
pub async fn run_session_actor(mut actor: SessionActor, inactivity_timeout: Duration) {
    tracing::debug!("Session actor started");
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            maybe_msg = actor.receiver.recv() => {
                match maybe_msg {
                    Some(msg) => {
                        last_activity = Instant::now();
                        actor.handle_message(msg).await;
                    }
                    None => {
                        tracing::info!("Session actor channel closed. Shutting down");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(last_activity + inactivity_timeout) => {
                tracing::info!("Session inactivity timeout. Notifying manager for shutdown");
                if let Err(e) = actor.manager_handle.notify_session_shutdown(actor.session_id).await {
                    tracing::error!(error = %e, "Failed to notify SessionManager of shutdown");
                }
                break;
            }
        }
    }

    tracing::debug!("Session actor stopped");
}

#[derive(Clone, Debug)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionCommand>,
    pub session_id: Uuid,
}

impl SessionActorHandle {
    pub fn spawn(
        session_id: Uuid,
        buffer_size: usize,
        manager_handle: SessionManagerHandle,
        engine: QuizEngine,
        inactivity_timeout: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = SessionActor::new(receiver, session_id, engine, manager_handle);
        tokio::spawn(run_session_actor(actor, inactivity_timeout));
        Self { sender, session_id }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| SessionError::Closed(self.session_id))?;
        rx.await.map_err(|_| SessionError::Closed(self.session_id))
    }

    pub async fn start(
        &self,
        player_name: String,
        question_count: usize,
    ) -> Result<StartedQuiz, SessionError> {
        self.request(|respond_to| SessionCommand::Start {
            player_name,
            question_count,
            respond_to,
        })
        .await?
    }

    pub async fn current_question(&self) -> Result<QuestionSnapshot, SessionError> {
        self.request(|respond_to| SessionCommand::CurrentQuestion { respond_to })
            .await
    }

    pub async fn answer(&self, selected_key: String) -> Result<AnswerReply, SessionError> {
        self.request(|respond_to| SessionCommand::Answer {
            selected_key,
            respond_to,
        })
        .await?
    }

    pub async fn results(&self) -> Result<SessionSummary, SessionError> {
        self.request(|respond_to| SessionCommand::Results { respond_to })
            .await
    }

    pub async fn save_score(&self) -> Result<LeaderboardEntry, SessionError> {
        self.request(|respond_to| SessionCommand::SaveScore { respond_to })
            .await?
    }

    pub async fn restart(&self) -> Result<EngineState, SessionError> {
        self.request(|respond_to| SessionCommand::Restart { respond_to })
            .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::AnswerOption;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MemoryScores {
        saved: Mutex<Vec<LeaderboardEntry>>,
    }

    #[async_trait]
    impl ScoreRepository for MemoryScores {
        async fn save_score(&self, entry: &LeaderboardEntry) -> Result<(), RepositoryError> {
            self.saved.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn fetch_leaderboard(
            &self,
            _question_count: usize,
            _limit: usize,
        ) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
            Ok(self.saved.lock().unwrap().clone())
        }
    }

    fn pool(count: usize) -> Arc<Vec<QuestionRecord>> {
        Arc::new(
            (0..count)
                .map(|n| QuestionRecord {
                    question_text: format!("Question {}", n),
                    options: vec![AnswerOption::new("a", "Right"), AnswerOption::new("b", "Wrong")],
                    correct_answer_key: "a".to_string(),
                    explanation: format!("Because {}", n),
                })
                .collect(),
        )
    }

    fn manager(
        scores: Arc<MemoryScores>,
        seen_questions_dir: Option<PathBuf>,
        inactivity_timeout: Duration,
    ) -> SessionManagerHandle {
        SessionManagerHandle::spawn(
            8,
            SessionSettings {
                pool: pool(4),
                score_repository: scores,
                seen_questions_dir,
                inactivity_timeout,
            },
        )
    }

    #[tokio::test]
    async fn test_session_plays_through_and_saves() {
        let scores = Arc::new(MemoryScores::default());
        let manager = manager(scores.clone(), None, Duration::from_secs(60));

        let details = manager.create_session(None).await.unwrap();
        assert_eq!(details.state, EngineState::Ready);
        assert_eq!(details.pool_size, 4);

        let session = manager.get_session_handle(details.session_id).await.unwrap();
        let started = session.start("Ana".to_string(), 2).await.unwrap();
        assert_eq!(started.progress.total, 2);

        let snapshot = session.current_question().await.unwrap();
        assert_eq!(snapshot.state, EngineState::Playing);
        assert_eq!(snapshot.question.unwrap().id(), started.question.id());

        let first = session.answer("a".to_string()).await.unwrap();
        assert!(first.outcome.is_correct);
        assert!(first.next_question.is_some());
        assert_eq!(first.state, EngineState::Playing);

        let err = session.save_score().await.unwrap_err();
        assert!(matches!(err, SessionError::Quiz(QuizError::InvalidState(_))));

        let last = session.answer("b".to_string()).await.unwrap();
        assert!(last.outcome.is_session_complete);
        assert!(last.next_question.is_none());
        assert_eq!(last.state, EngineState::Complete);

        let entry = session.save_score().await.unwrap();
        assert_eq!(entry.score, 1);
        assert_eq!(scores.saved.lock().unwrap().len(), 1);

        let results = session.results().await.unwrap();
        assert_eq!(results.score.total, 2);

        assert_eq!(session.restart().await.unwrap(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_engine_errors_reach_the_caller() {
        let manager = manager(Arc::new(MemoryScores::default()), None, Duration::from_secs(60));
        let details = manager.create_session(None).await.unwrap();
        let session = manager.get_session_handle(details.session_id).await.unwrap();

        let err = session.answer("a".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::Quiz(QuizError::InvalidState(msg)) if msg == "No active quiz session"));

        let err = session.start("Ana".to_string(), 9).await.unwrap_err();
        assert!(matches!(err, SessionError::Quiz(QuizError::InvalidState(msg)) if msg == "Only 4 questions available"));
    }

    #[tokio::test]
    async fn test_unknown_session_has_no_handle() {
        let manager = manager(Arc::new(MemoryScores::default()), None, Duration::from_secs(60));
        assert!(manager.get_session_handle(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_session_shuts_down() {
        let manager = manager(Arc::new(MemoryScores::default()), None, Duration::from_millis(50));
        let details = manager.create_session(None).await.unwrap();
        let session = manager.get_session_handle(details.session_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(manager.get_session_handle(details.session_id).await.is_none());
        let err = session.results().await.unwrap_err();
        assert!(matches!(err, SessionError::Closed(id) if id == details.session_id));
    }

    #[tokio::test]
    async fn test_client_seen_set_spans_sessions() {
        let dir = std::env::temp_dir().join(format!("trivia_quiz_sessions_{}", Uuid::new_v4()));
        let manager = manager(
            Arc::new(MemoryScores::default()),
            Some(dir.clone()),
            Duration::from_secs(60),
        );
        let client_id = Uuid::new_v4();

        let mut served = Vec::new();
        for _ in 0..2 {
            let details = manager.create_session(Some(client_id)).await.unwrap();
            let session = manager.get_session_handle(details.session_id).await.unwrap();
            session.start("Ana".to_string(), 2).await.unwrap();
            loop {
                let snapshot = session.current_question().await.unwrap();
                let Some(question) = snapshot.question else {
                    break;
                };
                served.push(question.id());
                session.answer("a".to_string()).await.unwrap();
            }
        }

        served.sort_by_key(|id| id.0);
        served.dedup();
        assert_eq!(served.len(), 4);
        assert!(dir.join(format!("{}.json", client_id)).exists());
    }
}
