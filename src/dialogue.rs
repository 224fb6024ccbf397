//! The dialogue engine: one piece of user text in, one completed exchange out.
//!
//! Every call appends the User message to the conversation before the provider
//! is contacted, and appends exactly one Assistant message only once the call
//! succeeds.  A failed call leaves the User message in place without a reply.
//! For streamed replies, fragments already shown on the terminal stay there even
//! when the stream fails, but they are not recorded in the conversation.

use std::time::Instant;

use futures::StreamExt;

use crate::conversation::ConversationState;
use crate::error::{Error, Result};
use crate::gateway::ChatGateway;
use crate::observability::{
    DIALOGUE_FAILED_TURNS, DIALOGUE_TURN_DURATION, DIALOGUE_TURNS, STREAM_EMPTY_EVENTS,
};
use crate::render::Renderer;
use crate::types::{ChatCompletionRequest, ChatMessage, Model};

/// Builds requests from conversation state and runs them against a gateway.
pub struct DialogueEngine<G: ChatGateway> {
    gateway: G,
    model: Model,
    max_tokens: Option<u32>,
}

impl<G: ChatGateway> DialogueEngine<G> {
    /// Creates an engine that sends requests for `model` through `gateway`.
    pub fn new(gateway: G, model: Model) -> Self {
        Self {
            gateway,
            model,
            max_tokens: None,
        }
    }

    /// Sets the maximum number of tokens per reply.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The gateway requests go through.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// The model requests are sent for.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The per-reply token limit, if any.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Builds a request for the given messages.
    pub fn build_request(&self, messages: Vec<ChatMessage>, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest::new(self.model.clone(), messages)
            .with_stream(stream)
            .with_max_tokens(self.max_tokens)
    }

    /// Sends `text` as the next User turn and waits for the whole reply.
    ///
    /// On success the reply is shown with [`Renderer::write_line`], appended to
    /// the history as an Assistant message, and returned.
    pub async fn send_text(
        &self,
        state: &mut ConversationState,
        text: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        state.push_user(text);
        let start = Instant::now();
        let result = self.complete(state.request_messages(), renderer).await;
        self.finish_turn(state, result, start)
    }

    /// Sends `text` as the next User turn and streams the reply.
    ///
    /// Each fragment is shown as it arrives.  When the stream reaches its end
    /// the fragments, joined in arrival order, are appended to the history as a
    /// single Assistant message and returned.
    pub async fn send_text_stream(
        &self,
        state: &mut ConversationState,
        text: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        state.push_user(text);
        let start = Instant::now();
        let result = self.stream(state.request_messages(), renderer).await;
        self.finish_turn(state, result, start)
    }

    /// Sends a standalone prompt and waits for the whole reply.
    ///
    /// No conversation is read or written.
    pub async fn ask_once(&self, prompt: &str, renderer: &mut dyn Renderer) -> Result<String> {
        self.complete(vec![ChatMessage::user(prompt)], renderer)
            .await
    }

    /// Sends a standalone prompt and streams the reply.
    ///
    /// No conversation is read or written.
    pub async fn ask_stream(&self, prompt: &str, renderer: &mut dyn Renderer) -> Result<String> {
        self.stream(vec![ChatMessage::user(prompt)], renderer).await
    }

    fn finish_turn(
        &self,
        state: &mut ConversationState,
        result: Result<String>,
        start: Instant,
    ) -> Result<String> {
        DIALOGUE_TURN_DURATION.add(start.elapsed().as_secs_f64());
        match result {
            Ok(content) => {
                DIALOGUE_TURNS.click();
                state.push_assistant(content.clone());
                Ok(content)
            }
            Err(err) => {
                DIALOGUE_FAILED_TURNS.click();
                Err(err)
            }
        }
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        let request = self.build_request(messages, false);
        tracing::debug!(model = %self.model, messages = request.messages.len(), "sending chat completion");

        let response = self
            .gateway
            .complete_once(request)
            .await
            .inspect_err(|err| tracing::error!(error = %err, "Error creating chat completion"))?;

        let Some(choice) = response.choices.into_iter().next() else {
            tracing::error!(error = %Error::NoChoices, "Error creating chat completion");
            return Err(Error::NoChoices);
        };

        let content = choice.message.content;
        renderer.write_line(&content);
        Ok(content)
    }

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        let request = self.build_request(messages, true);
        tracing::debug!(model = %self.model, messages = request.messages.len(), "opening chat completion stream");

        let mut stream = self.gateway.complete_stream(request).await.inspect_err(|err| {
            tracing::error!(error = %err, "Error creating chat completion stream")
        })?;

        renderer.start_response();
        let mut fragments = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    renderer.finish_response();
                    tracing::error!(
                        error = %err,
                        received = fragments.len(),
                        "Error receiving chat completion stream"
                    );
                    return Err(err);
                }
            };
            let Some(fragment) = chunk.fragment() else {
                STREAM_EMPTY_EVENTS.click();
                tracing::debug!("skipping stream chunk without choices");
                continue;
            };
            renderer.write_fragment(fragment);
            fragments.push(fragment.to_string());
        }
        drop(stream);
        renderer.finish_response();

        Ok(fragments.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChunkStream;
    use crate::render::BufferRenderer;
    use crate::types::{ChatCompletion, ChatCompletionChunk, KnownModel, Role};

    /// Answers every call with the same text, split into two fragments when streamed.
    struct Echo;

    #[async_trait::async_trait]
    impl ChatGateway for Echo {
        async fn complete_once(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
            assert!(!request.stream);
            Ok(ChatCompletion::from_text(format!(
                "{} messages",
                request.messages.len()
            )))
        }

        async fn complete_stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream> {
            assert!(request.stream);
            let chunks = vec![
                Ok(ChatCompletionChunk::text(request.messages.len().to_string())),
                Ok(ChatCompletionChunk::text(" messages")),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[test]
    fn build_request_carries_settings() {
        let engine = DialogueEngine::new(Echo, Model::Known(KnownModel::Gpt4o))
            .with_max_tokens(Some(64));
        let request = engine.build_request(vec![ChatMessage::user("x")], true);
        assert_eq!(request.model, Model::Known(KnownModel::Gpt4o));
        assert_eq!(request.max_tokens, Some(64));
        assert!(request.stream);
    }

    #[tokio::test]
    async fn requests_see_growing_history() {
        let engine = DialogueEngine::new(Echo, Model::default());
        let mut state = ConversationState::new(["system"]);
        let mut renderer = BufferRenderer::new();

        let first = engine
            .send_text(&mut state, "one", &mut renderer)
            .await
            .unwrap();
        assert_eq!(first, "2 messages");

        let second = engine
            .send_text_stream(&mut state, "two", &mut renderer)
            .await
            .unwrap();
        assert_eq!(second, "4 messages");

        let roles: Vec<Role> = state.history().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(renderer.lines, vec!["2 messages"]);
        assert_eq!(renderer.fragments, vec!["4", " messages"]);
    }

    #[tokio::test]
    async fn ask_leaves_no_trace() {
        let engine = DialogueEngine::new(Echo, Model::default());
        let mut renderer = BufferRenderer::new();
        assert_eq!(
            engine.ask_once("prompt", &mut renderer).await.unwrap(),
            "1 messages"
        );
        assert_eq!(
            engine.ask_stream("prompt", &mut renderer).await.unwrap(),
            "1 messages"
        );
    }
}
