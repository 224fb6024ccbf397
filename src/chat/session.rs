//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation
//! state for the lifetime of the process and routes chat text and
//! code-assistance directives to the dialogue engine.

use crate::assist::{CodeAssist, CodeTask};
use crate::chat::config::ChatConfig;
use crate::conversation::ConversationState;
use crate::dialogue::DialogueEngine;
use crate::error::Result;
use crate::gateway::ChatGateway;
use crate::render::Renderer;
use crate::types::Model;

/// A chat session: one conversation and the engine that advances it.
pub struct ChatSession<G: ChatGateway> {
    engine: DialogueEngine<G>,
    state: ConversationState,
    assist: CodeAssist,
    streaming: bool,
}

impl<G: ChatGateway> ChatSession<G> {
    /// Creates a new chat session with the given gateway and configuration.
    pub fn new(gateway: G, config: ChatConfig) -> Self {
        let assist = config.code_assist();
        let engine = DialogueEngine::new(gateway, config.model).with_max_tokens(config.max_tokens);
        Self {
            engine,
            state: ConversationState::new(config.system_messages),
            assist,
            streaming: config.streaming,
        }
    }

    /// Sends a line of chat text and shows the reply.
    pub async fn send(&mut self, text: &str, renderer: &mut dyn Renderer) -> Result<String> {
        if self.streaming {
            self.engine
                .send_text_stream(&mut self.state, text, renderer)
                .await
        } else {
            self.engine.send_text(&mut self.state, text, renderer).await
        }
    }

    /// Runs a code-assistance directive.  The conversation is left untouched.
    pub async fn run_code_task(
        &self,
        task: CodeTask,
        line: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        self.assist
            .run(&self.engine, task, line, renderer, self.streaming)
            .await
    }

    /// The conversation so far.
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// The dialogue engine.
    pub fn engine(&self) -> &DialogueEngine<G> {
        &self.engine
    }

    /// Returns the current model.
    pub fn model(&self) -> &Model {
        self.engine.model()
    }

    /// Returns the number of messages in the history.
    pub fn message_count(&self) -> usize {
        self.state.len()
    }

    /// Whether replies are streamed.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}
