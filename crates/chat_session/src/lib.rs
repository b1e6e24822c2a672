use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_types::{ChatId, Completer, ConversationTurn, DispatchFailure, RequestConfig, TurnRole};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const NEW_CHAT_TITLE: &str = "New chat";
const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("chat `{0}` does not exist")]
    UnknownChat(ChatId),
    #[error("message is empty")]
    EmptyMessage,
    #[error("chat `{chat_id}` did not get a reply: {source}")]
    Completion {
        chat_id: ChatId,
        #[source]
        source: DispatchFailure,
    },
    #[error("failed to decode chat history: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatThread {
    pub id: ChatId,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
}

impl ChatThread {
    fn new() -> Self {
        Self {
            id: ChatId::new_v4(),
            title: NEW_CHAT_TITLE.to_string(),
            updated_at: Utc::now(),
            turns: Vec::new(),
        }
    }
}

pub fn derive_title(turns: &[ConversationTurn]) -> Option<String> {
    let first = turns.iter().find(|turn| turn.role == TurnRole::User)?;
    let mut chars = first.content.chars();
    let mut title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        title.push_str("...");
    }
    Some(title)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatHistory {
    chats: Vec<ChatThread>,
    current: Option<ChatId>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_chat(&mut self) -> ChatId {
        let chat = ChatThread::new();
        let id = chat.id;
        self.chats.insert(0, chat);
        self.current = Some(id);
        id
    }

    pub fn select_chat(&mut self, id: ChatId) -> Result<(), SessionError> {
        if self.get(id).is_none() {
            return Err(SessionError::UnknownChat(id));
        }
        self.current = Some(id);
        Ok(())
    }

    pub fn current_id(&self) -> Option<ChatId> {
        self.current
    }

    pub fn current_chat(&self) -> Option<&ChatThread> {
        self.current.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: ChatId) -> Option<&ChatThread> {
        self.chats.iter().find(|chat| chat.id == id)
    }

    pub fn list(&self) -> &[ChatThread] {
        &self.chats
    }

    pub fn delete_chat(&mut self, id: ChatId) -> bool {
        let before = self.chats.len();
        self.chats.retain(|chat| chat.id != id);
        if self.current == Some(id) {
            self.current = None;
        }
        self.chats.len() != before
    }

    pub fn update_chat(
        &mut self,
        id: ChatId,
        turns: Vec<ConversationTurn>,
    ) -> Result<(), SessionError> {
        let chat = self
            .chats
            .iter_mut()
            .find(|chat| chat.id == id)
            .ok_or(SessionError::UnknownChat(id))?;
        if let Some(title) = derive_title(&turns) {
            chat.title = title;
        }
        chat.turns = turns;
        chat.updated_at = Utc::now();
        Ok(())
    }

    fn push_turn(&mut self, id: ChatId, turn: ConversationTurn) -> Result<(), SessionError> {
        let mut turns = self
            .get(id)
            .map(|chat| chat.turns.clone())
            .ok_or(SessionError::UnknownChat(id))?;
        turns.push(turn);
        self.update_chat(id, turns)
    }
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub chat_id: ChatId,
    pub turn: ConversationTurn,
}

pub struct SessionController {
    history: RwLock<ChatHistory>,
    completer: Arc<dyn Completer>,
}

impl SessionController {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self::with_history(ChatHistory::new(), completer)
    }

    pub fn with_history(history: ChatHistory, completer: Arc<dyn Completer>) -> Self {
        Self {
            history: RwLock::new(history),
            completer,
        }
    }

    pub fn create_chat(&self) -> ChatId {
        self.history.write().create_chat()
    }

    pub fn select_chat(&self, id: ChatId) -> Result<(), SessionError> {
        self.history.write().select_chat(id)
    }

    pub fn delete_chat(&self, id: ChatId) -> bool {
        self.history.write().delete_chat(id)
    }

    pub fn current_chat(&self) -> Option<ChatThread> {
        self.history.read().current_chat().cloned()
    }

    pub fn chat(&self, id: ChatId) -> Option<ChatThread> {
        self.history.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<ChatThread> {
        self.history.read().list().to_vec()
    }

    pub async fn send_message(
        &self,
        chat_id: Option<ChatId>,
        text: &str,
        config: &RequestConfig,
    ) -> Result<Reply, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let (chat_id, turns) = {
            let mut history = self.history.write();
            let chat_id = match chat_id.or(history.current_id()) {
                Some(id) => id,
                None => history.create_chat(),
            };
            history.push_turn(chat_id, ConversationTurn::user(text))?;
            let turns = history
                .get(chat_id)
                .map(|chat| chat.turns.clone())
                .unwrap_or_default();
            (chat_id, turns)
        };

        match self.completer.complete(&turns, config).await {
            Ok(content) => {
                let turn = ConversationTurn::assistant(content);
                self.history.write().push_turn(chat_id, turn.clone())?;
                info!(chat = %chat_id, turns = turns.len() + 1, "assistant reply stored");
                Ok(Reply { chat_id, turn })
            }
            Err(source) => {
                warn!(chat = %chat_id, error = %source, "completion failed");
                Err(SessionError::Completion { chat_id, source })
            }
        }
    }

    pub fn snapshot(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(&*self.history.read())?)
    }

    pub fn restore(&self, json: &str) -> Result<(), SessionError> {
        let history: ChatHistory = serde_json::from_str(json)?;
        *self.history.write() = history;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use core_types::AttemptError;
    use parking_lot::Mutex;

    use super::*;

    struct ScriptedCompleter {
        reply: Result<String, DispatchFailure>,
        seen: Mutex<Vec<usize>>,
    }

    impl ScriptedCompleter {
        fn new(reply: Result<String, DispatchFailure>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(
            &self,
            turns: &[ConversationTurn],
            _config: &RequestConfig,
        ) -> Result<String, DispatchFailure> {
            self.seen.lock().push(turns.len());
            self.reply.clone()
        }
    }

    fn config() -> RequestConfig {
        RequestConfig {
            model_id: "openrouter/auto".to_string(),
            temperature: 0.7,
            persona_prompt: "You are helpful.".to_string(),
        }
    }

    #[test]
    fn new_chats_are_listed_newest_first() {
        let mut history = ChatHistory::new();
        let first = history.create_chat();
        let second = history.create_chat();
        let ids: Vec<ChatId> = history.list().iter().map(|chat| chat.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(history.current_id(), Some(second));
        assert_eq!(history.list()[0].title, NEW_CHAT_TITLE);
    }

    #[test]
    fn deleting_current_chat_clears_selection() {
        let mut history = ChatHistory::new();
        let first = history.create_chat();
        let second = history.create_chat();
        history.select_chat(first).expect("select");

        assert!(history.delete_chat(second));
        assert_eq!(history.current_id(), Some(first));
        assert!(history.delete_chat(first));
        assert!(history.current_chat().is_none());
        assert!(!history.delete_chat(first));
    }

    #[test]
    fn title_comes_from_first_user_turn() {
        let mut history = ChatHistory::new();
        let id = history.create_chat();
        let long = "x".repeat(60);
        history
            .update_chat(
                id,
                vec![
                    ConversationTurn::assistant("greeting"),
                    ConversationTurn::user(long.clone()),
                ],
            )
            .expect("update");
        assert_eq!(history.get(id).expect("chat").title, format!("{}...", &long[..50]));

        history
            .update_chat(id, vec![ConversationTurn::user("Short question")])
            .expect("update");
        assert_eq!(history.get(id).expect("chat").title, "Short question");

        let err = history
            .update_chat(ChatId::new_v4(), Vec::new())
            .expect_err("unknown chat");
        assert!(matches!(err, SessionError::UnknownChat(_)));
    }

    #[tokio::test]
    async fn send_message_creates_chat_and_stores_reply() {
        let completer = ScriptedCompleter::new(Ok("Hi there".to_string()));
        let session = SessionController::new(completer.clone());

        let reply = session
            .send_message(None, "  Hello  ", &config())
            .await
            .expect("reply");

        let chat = session.chat(reply.chat_id).expect("chat");
        let contents: Vec<&str> = chat.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["Hello", "Hi there"]);
        assert_eq!(chat.title, "Hello");
        assert_eq!(*completer.seen.lock(), vec![1]);
        assert_eq!(session.current_chat().map(|c| c.id), Some(reply.chat_id));
    }

    #[tokio::test]
    async fn failed_completion_keeps_user_turn() {
        let failure = DispatchFailure::Exhausted {
            attempts: 2,
            last: AttemptError::Transport("connection refused".to_string()),
        };
        let session = SessionController::new(ScriptedCompleter::new(Err(failure.clone())));

        let err = session
            .send_message(None, "Hello", &config())
            .await
            .expect_err("must fail");
        let SessionError::Completion { chat_id, source } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(source, failure);

        let chat = session.chat(chat_id).expect("chat");
        assert_eq!(chat.turns.len(), 1);
        assert_eq!(chat.turns[0].role, TurnRole::User);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let completer = ScriptedCompleter::new(Ok("unused".to_string()));
        let session = SessionController::new(completer.clone());
        let err = session
            .send_message(None, "   ", &config())
            .await
            .expect_err("must fail");
        assert!(matches!(err, SessionError::EmptyMessage));
        assert!(session.list().is_empty());
        assert!(completer.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn snapshot_restores_history() {
        let session = SessionController::new(ScriptedCompleter::new(Ok("Hi".to_string())));
        let reply = session
            .send_message(None, "Hello", &config())
            .await
            .expect("reply");
        let json = session.snapshot().expect("snapshot");

        let restored = SessionController::new(ScriptedCompleter::new(Ok("Hi".to_string())));
        restored.restore(&json).expect("restore");
        assert_eq!(restored.list(), session.list());
        assert_eq!(restored.current_chat().map(|c| c.id), Some(reply.chat_id));
        assert!(restored.restore("not json").is_err());
    }
}
