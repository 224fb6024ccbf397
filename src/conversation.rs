//! Conversation state for a chat session.
//!
//! A [`ConversationState`] holds the system messages fixed at construction and
//! the append-only history of User and Assistant messages.  Only the
//! [`DialogueEngine`](crate::DialogueEngine) appends to the history.

use crate::types::{ChatMessage, Role};

/// The ordered messages of one chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    system_messages: Vec<ChatMessage>,
    history: Vec<ChatMessage>,
}

impl ConversationState {
    /// Creates a conversation with the given system messages and no history.
    pub fn new<I, S>(system_messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            system_messages: system_messages
                .into_iter()
                .map(ChatMessage::system)
                .collect(),
            history: Vec::new(),
        }
    }

    /// The system messages, in the order supplied at construction.
    pub fn system_messages(&self) -> &[ChatMessage] {
        &self.system_messages
    }

    /// The User and Assistant messages exchanged so far, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The number of messages in the history.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True if nothing has been exchanged yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// The most recent message of the history.
    pub fn last(&self) -> Option<&ChatMessage> {
        self.history.last()
    }

    /// The messages of a request: all system messages, then the history.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        self.system_messages
            .iter()
            .chain(self.history.iter())
            .cloned()
            .collect()
    }

    pub(crate) fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::new(Role::User, content));
    }

    pub(crate) fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::new(Role::Assistant, content));
    }
}
