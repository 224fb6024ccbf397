//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module turns the raw byte stream of a streamed chat completion into a
//! stream of [`ChatCompletionChunk`]s.  Each event carries one JSON chunk on its
//! `data:` line; the event `data: [DONE]` marks the end of the stream.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::{ChatCompletionChunk, Error, Result};

/// The payload that marks the end of a stream.
const DONE_MARKER: &str = "[DONE]";

/// Process a stream of bytes into a stream of completion chunks.
///
/// The returned stream ends after the `[DONE]` marker (or when the body ends).
/// It yields at most one error, after which it is exhausted.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    stream::unfold(
        Some((stream, Vec::<u8>::new())),
        |state| async move {
            let (mut stream, mut buffer) = state?;
            loop {
                // First check if we have a complete event in the buffer
                if let Some(frame) = take_frame(&mut buffer) {
                    match parse_frame(&frame) {
                        Frame::Skip => continue,
                        Frame::Done => return None,
                        Frame::Chunk(Ok(chunk)) => {
                            STREAM_EVENTS.click();
                            return Some((Ok(chunk), Some((stream, buffer))));
                        }
                        Frame::Chunk(Err(err)) => {
                            STREAM_ERRORS.click();
                            return Some((Err(err), None));
                        }
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(err)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(err), None));
                    }
                    None => {
                        // Body ended without a trailing blank line.
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let frame = std::mem::take(&mut buffer);
                        return match parse_frame(&frame) {
                            Frame::Chunk(Ok(chunk)) => {
                                STREAM_EVENTS.click();
                                Some((Ok(chunk), None))
                            }
                            Frame::Chunk(Err(err)) => {
                                STREAM_ERRORS.click();
                                Some((Err(err), None))
                            }
                            Frame::Skip | Frame::Done => None,
                        };
                    }
                }
            }
        },
    )
}

enum Frame {
    Chunk(Result<ChatCompletionChunk>),
    Done,
    Skip,
}

#[derive(Deserialize)]
struct StreamErrorBody {
    error: StreamErrorDetail,
}

#[derive(Deserialize)]
struct StreamErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

/// Remove the first complete event (terminated by a blank line) from the buffer.
fn take_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let mut frame: Vec<u8> = buffer.drain(..end + 2).collect();
    frame.truncate(end);
    Some(frame)
}

fn parse_frame(frame: &[u8]) -> Frame {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(err) => return Frame::Chunk(Err(err.into())),
    };

    let mut data_lines = Vec::new();
    for line in text.lines() {
        // Comment lines are keep-alives.
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return Frame::Skip;
    }

    let data = data_lines.join("\n");
    let data = data.trim();
    if data == DONE_MARKER {
        return Frame::Done;
    }

    if let Ok(body) = serde_json::from_str::<StreamErrorBody>(data) {
        let message = body
            .error
            .message
            .unwrap_or_else(|| "provider reported an error".to_string());
        let message = match body.error.error_type {
            Some(error_type) => format!("{error_type}: {message}"),
            None => message,
        };
        return Frame::Chunk(Err(Error::streaming(message, None)));
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => Frame::Chunk(Ok(chunk)),
        Err(e) => Frame::Chunk(Err(Error::serialization(
            format!("Failed to parse chunk JSON: {e}"),
            Some(Box::new(e)),
        ))),
    }
}
