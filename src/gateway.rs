//! The provider capability consumed by the dialogue engine.
//!
//! A [`ChatGateway`] knows how to answer a [`ChatCompletionRequest`] either in
//! one piece or as a stream of [`ChatCompletionChunk`]s.  The HTTP client in
//! [`crate::client`] is the production implementation; tests substitute
//! scripted gateways.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::error::Result;
use crate::types::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest};

/// A lazy, finite, non-restartable sequence of streamed deltas.
///
/// The stream yields `Ok` chunks until the provider's end-of-stream marker,
/// after which it yields `None`.  An `Err` item is a transport failure.
/// Dropping the stream releases the underlying connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// A chat completion provider.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// Complete the request in a single response.
    async fn complete_once(&self, request: ChatCompletionRequest) -> Result<ChatCompletion>;

    /// Open a streamed completion of the request.
    async fn complete_stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream>;
}

#[async_trait::async_trait]
impl<G: ChatGateway + ?Sized> ChatGateway for Arc<G> {
    async fn complete_once(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
        self.as_ref().complete_once(request).await
    }

    async fn complete_stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream> {
        self.as_ref().complete_stream(request).await
    }
}
