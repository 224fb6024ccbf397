//! Integration tests for the confab library.
//!
//! The dialogue tests run against a scripted in-memory gateway.  The HTTP tests
//! run the real client against a one-shot local server.  The live tests at the
//! end require an API key in the environment and skip themselves otherwise.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;

use confab::{
    BufferRenderer, ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatGateway,
    ChatMessage, ChunkStream, ConversationState, DialogueEngine, Error, Model, Result, Role,
};

/// A stream of prepared items that counts how often it is dropped.
struct CountedStream {
    items: VecDeque<Result<ChatCompletionChunk>>,
    drops: Arc<AtomicUsize>,
}

impl Stream for CountedStream {
    type Item = Result<ChatCompletionChunk>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.items.pop_front())
    }
}

impl Drop for CountedStream {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

enum Reply {
    Once(Result<ChatCompletion>),
    Stream(Vec<Result<ChatCompletionChunk>>),
    OpenFails(Error),
}

/// A gateway that answers calls from a script, in order.
#[derive(Default)]
struct ScriptedGateway {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
    drops: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    fn next_reply(&self, request: ChatCompletionRequest) -> Reply {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("gateway called more often than scripted")
    }

    fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatGateway for ScriptedGateway {
    async fn complete_once(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
        match self.next_reply(request) {
            Reply::Once(result) => result,
            _ => panic!("expected a single-shot call"),
        }
    }

    async fn complete_stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream> {
        match self.next_reply(request) {
            Reply::Stream(items) => Ok(Box::pin(CountedStream {
                items: items.into(),
                drops: Arc::clone(&self.drops),
            })),
            Reply::OpenFails(err) => Err(err),
            Reply::Once(_) => panic!("expected a streaming call"),
        }
    }
}

fn text_chunks(fragments: &[&str]) -> Vec<Result<ChatCompletionChunk>> {
    fragments
        .iter()
        .map(|fragment| Ok(ChatCompletionChunk::text(*fragment)))
        .collect()
}

fn engine(replies: Vec<Reply>) -> DialogueEngine<ScriptedGateway> {
    DialogueEngine::new(ScriptedGateway::new(replies), Model::default())
}

#[tokio::test]
async fn single_shot_success_appends_a_turn() {
    let engine = engine(vec![Reply::Once(Ok(ChatCompletion::from_text("Hi there")))]);
    let mut state = ConversationState::new(["You are terse."]);
    let mut renderer = BufferRenderer::new();

    let reply = engine
        .send_text(&mut state, "Hello", &mut renderer)
        .await
        .unwrap();

    assert_eq!(reply, "Hi there");
    assert_eq!(
        state.history(),
        [ChatMessage::user("Hello"), ChatMessage::assistant("Hi there")]
    );
    assert_eq!(renderer.lines, vec!["Hi there"]);
}

#[tokio::test]
async fn streamed_fragments_are_committed_in_order() {
    let engine = engine(vec![Reply::Stream(text_chunks(&["Hel", "lo", ", ", "world"]))]);
    let mut state = ConversationState::default();
    let mut renderer = BufferRenderer::new();

    let reply = engine
        .send_text_stream(&mut state, "Greet me", &mut renderer)
        .await
        .unwrap();

    assert_eq!(reply, "Hello, world");
    assert_eq!(state.len(), 2);
    assert_eq!(state.last(), Some(&ChatMessage::assistant("Hello, world")));
    assert_eq!(renderer.fragments.concat(), "Hello, world");
    assert_eq!((renderer.started, renderer.finished), (1, 1));
    assert_eq!(engine.gateway().drops(), 1);
}

#[tokio::test]
async fn empty_choice_chunks_are_skipped() {
    let engine = engine(vec![Reply::Stream(vec![
        Ok(ChatCompletionChunk::text("Hel")),
        Ok(ChatCompletionChunk::empty()),
        Ok(ChatCompletionChunk::text("lo")),
    ])]);
    let mut state = ConversationState::default();
    let mut renderer = BufferRenderer::new();

    let reply = engine
        .send_text_stream(&mut state, "hi", &mut renderer)
        .await
        .unwrap();

    assert_eq!(reply, "Hello");
    assert_eq!(renderer.fragments, vec!["Hel", "lo"]);
    assert_eq!(state.len(), 2);
    assert_eq!(engine.gateway().drops(), 1);
}

#[tokio::test]
async fn mid_stream_failure_commits_only_the_user_message() {
    let engine = engine(vec![Reply::Stream(vec![
        Ok(ChatCompletionChunk::text("Hel")),
        Err(Error::connection("connection reset", None)),
        Ok(ChatCompletionChunk::text("never read")),
    ])]);
    let mut state = ConversationState::default();
    let mut renderer = BufferRenderer::new();

    let err = engine
        .send_text_stream(&mut state, "hi", &mut renderer)
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(state.history(), [ChatMessage::user("hi")]);
    // The fragment stays on screen even though it is not recorded.
    assert_eq!(renderer.fragments, vec!["Hel"]);
    assert_eq!(renderer.finished, 1);
    assert_eq!(engine.gateway().drops(), 1);
}

#[tokio::test]
async fn failed_calls_keep_the_user_message() {
    let engine = engine(vec![
        Reply::Once(Err(Error::rate_limit("slow down", Some(1)))),
        Reply::Once(Ok(ChatCompletion::from_choices(Vec::new()))),
        Reply::OpenFails(Error::authentication("bad key")),
    ]);
    let mut state = ConversationState::default();
    let mut renderer = BufferRenderer::new();

    let err = engine
        .send_text(&mut state, "one", &mut renderer)
        .await
        .unwrap_err();
    assert!(err.is_rate_limit());
    assert_eq!(state.len(), 1);

    let err = engine
        .send_text(&mut state, "two", &mut renderer)
        .await
        .unwrap_err();
    assert!(err.is_no_choices());
    assert!(!err.is_transport());
    assert_eq!(state.len(), 2);

    let err = engine
        .send_text_stream(&mut state, "three", &mut renderer)
        .await
        .unwrap_err();
    assert!(err.is_authentication());
    assert_eq!(state.len(), 3);
    assert!(state.history().iter().all(|m| m.role == Role::User));
    assert_eq!((renderer.started, renderer.finished), (0, 0));
    assert!(renderer.text().is_empty());
}

#[tokio::test]
async fn retry_after_failure_repeats_the_user_turn() {
    let engine = engine(vec![
        Reply::Once(Err(Error::timeout("timed out", Some(60.0)))),
        Reply::Once(Ok(ChatCompletion::from_text("pong"))),
    ]);
    let mut state = ConversationState::default();
    let mut renderer = BufferRenderer::new();

    assert!(
        engine
            .send_text(&mut state, "ping", &mut renderer)
            .await
            .is_err()
    );
    engine
        .send_text(&mut state, "ping", &mut renderer)
        .await
        .unwrap();

    assert_eq!(
        state.history(),
        [
            ChatMessage::user("ping"),
            ChatMessage::user("ping"),
            ChatMessage::assistant("pong"),
        ]
    );
    let second = &engine.gateway().requests()[1];
    assert_eq!(second.messages.len(), 2);
}

#[tokio::test]
async fn system_messages_lead_every_request() {
    let engine = engine(vec![
        Reply::Once(Ok(ChatCompletion::from_text("a"))),
        Reply::Stream(text_chunks(&["b"])),
        Reply::Once(Err(Error::connection("refused", None))),
        Reply::Stream(text_chunks(&["d"])),
    ]);
    let system = ["First rule.", "Second rule."];
    let mut state = ConversationState::new(system);
    let mut renderer = BufferRenderer::new();

    engine.send_text(&mut state, "1", &mut renderer).await.unwrap();
    engine
        .send_text_stream(&mut state, "2", &mut renderer)
        .await
        .unwrap();
    let _ = engine.send_text(&mut state, "3", &mut renderer).await;
    engine
        .send_text_stream(&mut state, "4", &mut renderer)
        .await
        .unwrap();

    let requests = engine.gateway().requests();
    assert_eq!(requests.len(), 4);
    for (turn, request) in requests.iter().enumerate() {
        assert_eq!(request.messages[0], ChatMessage::system("First rule."));
        assert_eq!(request.messages[1], ChatMessage::system("Second rule."));
        assert!(request.messages[2..].iter().all(|m| m.role != Role::System));
        assert_eq!(
            request.messages.last(),
            Some(&ChatMessage::user((turn + 1).to_string()))
        );
    }
    assert_eq!(requests[3].messages.len(), 2 + 6);
    assert_eq!(state.system_messages().len(), 2);
    assert_eq!(state.system_messages()[1], ChatMessage::system("Second rule."));
}

#[tokio::test]
async fn every_stream_is_released_once() {
    let engine = engine(vec![
        Reply::Stream(text_chunks(&["ok"])),
        Reply::Stream(vec![Ok(ChatCompletionChunk::empty())]),
        Reply::Stream(vec![Err(Error::streaming("server went away", None))]),
        Reply::Stream(Vec::new()),
    ]);
    let mut state = ConversationState::default();
    let mut renderer = BufferRenderer::new();

    for expected in 1..=4 {
        let _ = engine
            .send_text_stream(&mut state, "x", &mut renderer)
            .await;
        assert_eq!(engine.gateway().drops(), expected);
    }
    // An empty stream is a successful, empty reply.
    assert_eq!(state.last(), Some(&ChatMessage::assistant("")));
}

mod http {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use confab::{BufferRenderer, ConversationState, DialogueEngine, Model, OpenAi};

    /// Serves one HTTP response on a local port and returns the raw request.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: String,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn client(base_url: String) -> OpenAi {
        OpenAi::with_options(Some("sk-test".to_string()), Some(base_url), None).unwrap()
    }

    #[tokio::test]
    async fn streamed_reply_over_http() {
        let body = [
            r#"data: {"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
            ": keep-alive",
            r#"data: {"id":"c1","choices":[]}"#,
            r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"lo"}}]}"#,
            r#"data: {"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ]
        .map(|event| format!("{event}\n\n"))
        .concat();
        let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;

        let engine = DialogueEngine::new(client(base_url), Model::default());
        let mut state = ConversationState::new(["Be nice."]);
        let mut renderer = BufferRenderer::new();
        let reply = engine
            .send_text_stream(&mut state, "Say hello", &mut renderer)
            .await
            .unwrap();

        assert_eq!(reply, "Hello");
        assert_eq!(state.len(), 2);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions "));
        let lowered = request.to_lowercase();
        assert!(lowered.contains("authorization: bearer sk-test"));
        assert!(lowered.contains("accept: text/event-stream"));
        assert!(request.contains(r#""stream":true"#));
        assert!(request.contains(r#"{"role":"system","content":"Be nice."}"#));
    }

    #[tokio::test]
    async fn single_shot_reply_over_http() {
        let body = r#"{"id":"c2","model":"gpt-3.5-turbo","choices":[{"index":0,"message":{"role":"assistant","content":"Hi!"},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#;
        let (base_url, server) = serve_once("200 OK", "application/json", body.to_string()).await;

        let engine = DialogueEngine::new(client(base_url), Model::default());
        let mut state = ConversationState::default();
        let mut renderer = BufferRenderer::new();
        let reply = engine
            .send_text(&mut state, "Hello", &mut renderer)
            .await
            .unwrap();

        assert_eq!(reply, "Hi!");
        assert_eq!(renderer.lines, vec!["Hi!"]);
        let request = server.await.unwrap();
        assert!(request.contains(r#""model":"gpt-3.5-turbo""#));
    }

    #[tokio::test]
    async fn http_errors_map_to_error_kinds() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        let (base_url, server) =
            serve_once("429 Too Many Requests", "application/json", body.to_string()).await;

        let engine = DialogueEngine::new(client(base_url), Model::default());
        let mut state = ConversationState::default();
        let mut renderer = BufferRenderer::new();
        let err = engine
            .send_text_stream(&mut state, "Hello", &mut renderer)
            .await
            .unwrap_err();

        assert!(err.is_rate_limit());
        assert!(err.is_transport());
        assert!(err.to_string().contains("Rate limit reached"));
        assert_eq!(state.len(), 1);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_event_mid_stream() {
        let body = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"par\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n",
        );
        let (base_url, server) =
            serve_once("200 OK", "text/event-stream", body.to_string()).await;

        let engine = DialogueEngine::new(client(base_url), Model::default());
        let mut state = ConversationState::default();
        let mut renderer = BufferRenderer::new();
        let err = engine
            .send_text_stream(&mut state, "Hello", &mut renderer)
            .await
            .unwrap_err();

        assert!(err.is_streaming());
        assert_eq!(renderer.fragments, vec!["par"]);
        assert_eq!(state.len(), 1);
        server.await.unwrap();
    }
}

mod live {
    use confab::{
        API_KEY_ENV, BufferRenderer, ConversationState, DialogueEngine, KnownModel, Model, OpenAi,
    };

    fn live_engine() -> Option<DialogueEngine<OpenAi>> {
        let Ok(api_key) = std::env::var(API_KEY_ENV) else {
            eprintln!("Skipping test: {API_KEY_ENV} not set");
            return None;
        };
        let client = OpenAi::new(Some(api_key)).expect("Failed to create client");
        Some(
            DialogueEngine::new(client, Model::Known(KnownModel::Gpt4oMini))
                .with_max_tokens(Some(16)),
        )
    }

    #[tokio::test]
    async fn test_simple_request() {
        let Some(engine) = live_engine() else {
            return;
        };
        let mut state = ConversationState::default();
        let mut renderer = BufferRenderer::new();
        let response = engine
            .send_text(&mut state, "Say 'test passed'", &mut renderer)
            .await;
        assert!(response.is_ok(), "Request should succeed with valid API key");
        assert_eq!(state.len(), 2);
    }

    #[tokio::test]
    async fn test_streaming_response() {
        let Some(engine) = live_engine() else {
            return;
        };
        let mut state = ConversationState::default();
        let mut renderer = BufferRenderer::new();
        let response = engine
            .send_text_stream(&mut state, "Count to 3", &mut renderer)
            .await;
        assert!(response.is_ok(), "Stream request should succeed");
        assert_eq!(renderer.fragments.concat(), response.unwrap());
    }
}
