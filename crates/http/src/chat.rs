//! Conversations and messages for the signed-in user

use crate::interceptor::SessionClient;
use crate::session::SessionError;
use distributech_core::types::{
    Conversation, FindByUsernameRequest, Listing, MarkReadRequest, Message, SendMessageRequest,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Chat endpoint paths, relative to the API root
pub mod paths {
    pub const CONVERSATIONS: &str = "/conversations/";
    pub const FIND_BY_USERNAME: &str = "/conversations/find_by_username/";
    pub const MARK_READ: &str = "/messages/mark_read/";

    pub fn conversation(id: i64) -> String {
        format!("/conversations/{id}/")
    }

    pub fn conversation_messages(id: i64) -> String {
        format!("/conversations/{id}/messages/")
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("No conversation is open")]
    NoActiveConversation,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("{message}")]
    Request {
        message: String,
        #[source]
        source: SessionError,
    },
}

impl ChatError {
    pub fn requires_login(&self) -> bool {
        match self {
            Self::NotAuthenticated => true,
            Self::Request { source, .. } => source.requires_login(),
            Self::NoActiveConversation => false,
        }
    }
}

/// What the chat view shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub conversations: Vec<Conversation>,
    pub current: Option<Conversation>,
    pub messages: Vec<Message>,
    /// Message of the last failed operation, cleared by the next success
    pub error: Option<String>,
}

/// Chat operations on top of an authenticated client
#[derive(Clone)]
pub struct ChatService {
    client: SessionClient,
    state: Arc<RwLock<ChatState>>,
}

impl ChatService {
    pub fn new(client: SessionClient) -> Self {
        Self {
            client,
            state: Arc::default(),
        }
    }

    pub async fn snapshot(&self) -> ChatState {
        self.state.read().await.clone()
    }

    /// Reload the conversation list
    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        if !self.client.session().is_authenticated() {
            return Err(ChatError::NotAuthenticated);
        }

        match self
            .client
            .get::<Listing<Conversation>>(paths::CONVERSATIONS)
            .await
        {
            Ok(listing) => {
                let conversations = listing.into_vec();
                debug!(count = conversations.len(), "Fetched conversations");
                let mut state = self.state.write().await;
                state.conversations = conversations.clone();
                state.error = None;
                Ok(conversations)
            }
            Err(err) => Err(self.fail("Failed to load conversations", err).await),
        }
    }

    /// Make `id` the open conversation and mark its messages read
    pub async fn open_conversation(&self, id: i64) -> Result<Conversation, ChatError> {
        let conversation = match self
            .client
            .get::<Conversation>(&paths::conversation(id))
            .await
        {
            Ok(conversation) => conversation,
            Err(err) => return Err(self.fail("Failed to load messages", err).await),
        };

        {
            let mut state = self.state.write().await;
            state.messages = conversation.messages.clone();
            state.current = Some(conversation.clone());
            state.error = None;
        }

        if let Err(err) = self
            .client
            .post::<_, Value>(paths::MARK_READ, &MarkReadRequest { conversation_id: id })
            .await
        {
            return Err(self.fail("Failed to load messages", err).await);
        }

        Ok(conversation)
    }

    /// Post `content` to the open conversation as the signed-in user
    pub async fn send_message(&self, content: &str) -> Result<Message, ChatError> {
        let conversation_id = self
            .state
            .read()
            .await
            .current
            .as_ref()
            .map(|c| c.id)
            .ok_or(ChatError::NoActiveConversation)?;
        let sender_id = self
            .client
            .session()
            .user()
            .map(|user| user.id)
            .ok_or(ChatError::NotAuthenticated)?;

        let body = SendMessageRequest {
            content: content.to_string(),
            conversation: conversation_id,
            sender_id,
        };

        match self
            .client
            .post::<_, Message>(&paths::conversation_messages(conversation_id), &body)
            .await
        {
            Ok(message) => {
                let mut state = self.state.write().await;
                if state.current.as_ref().is_some_and(|c| c.id == conversation_id) {
                    state.messages.push(message.clone());
                }
                state.error = None;
                Ok(message)
            }
            Err(err) => Err(self.fail("Failed to send message", err).await),
        }
    }

    /// Find or create the conversation with `username` and open it
    pub async fn start_conversation(&self, username: &str) -> Result<Conversation, ChatError> {
        let request = FindByUsernameRequest {
            username: username.to_string(),
        };
        let conversation = match self
            .client
            .post::<_, Conversation>(paths::FIND_BY_USERNAME, &request)
            .await
        {
            Ok(conversation) => conversation,
            Err(err) => {
                let message = err
                    .server_detail()
                    .unwrap_or_else(|| "Failed to start conversation".to_string());
                return Err(self.fail(&message, err).await);
            }
        };

        if let Err(e) = self.fetch_conversations().await {
            warn!(error = %e, "Conversation list not refreshed after starting a conversation");
        }

        let mut state = self.state.write().await;
        state.messages = conversation.messages.clone();
        state.current = Some(conversation.clone());
        state.error = None;
        info!(conversation = conversation.id, username, "Conversation opened");
        Ok(conversation)
    }

    /// Reload the conversation list and the open conversation
    pub async fn sync(&self) -> Result<ChatState, ChatError> {
        self.fetch_conversations().await?;

        let current = self.state.read().await.current.as_ref().map(|c| c.id);
        if let Some(id) = current {
            self.open_conversation(id).await?;
        }

        Ok(self.snapshot().await)
    }

    async fn fail(&self, message: &str, source: SessionError) -> ChatError {
        warn!(error = %source, "{message}");
        self.state.write().await.error = Some(message.to_string());
        ChatError::Request {
            message: message.to_string(),
            source,
        }
    }
}
