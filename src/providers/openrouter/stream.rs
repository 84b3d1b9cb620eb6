use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::models::{ErrorResponse, StreamChunk, Usage};
use crate::providers::types::StreamEvent;

/// Outcome of feeding one complete line to the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Token(String),
    Error(String),
    Done,
}

/// Incremental decoder for the `data:` line protocol used by the
/// chat-completions endpoint. Bytes may arrive split at arbitrary points,
/// including inside a UTF-8 sequence or a line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    raw: BytesMut,
    line_buf: String,
    usage: Option<Usage>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns the frames completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.raw.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.raw) {
                Ok(text) => {
                    self.line_buf.push_str(&text.replace("\r\n", "\n"));
                    self.raw.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // Invalid bytes become U+FFFD one sequence at a time so a
                    // split character after them is still decoded intact.
                    let (consumed, done) = match e.error_len() {
                        Some(bad) => (valid + bad, false),
                        None => (valid, true),
                    };
                    let text = String::from_utf8_lossy(&self.raw[..consumed]).replace("\r\n", "\n");
                    self.line_buf.push_str(&text);
                    self.raw.advance(consumed);
                    if done {
                        break;
                    }
                }
            }
        }

        self.drain_lines()
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<Frame> {
        if !self.raw.is_empty() {
            let rest = String::from_utf8_lossy(&self.raw).into_owned();
            self.raw.clear();
            self.line_buf.push_str(&rest);
        }
        let line = std::mem::take(&mut self.line_buf);
        self.decode_line(&line).into_iter().collect()
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    fn drain_lines(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            if let Some(frame) = self.decode_line(&line) {
                let done = frame == Frame::Done;
                frames.push(frame);
                if done {
                    self.line_buf.clear();
                    break;
                }
            }
        }
        frames
    }

    fn decode_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.trim();
        // Blank separators and `:` keep-alive comments carry no data.
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == "[DONE]" {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                if chunk.usage.is_some() {
                    self.usage = chunk.usage;
                }
                let text: String = chunk
                    .choices
                    .into_iter()
                    .filter_map(|c| c.delta.content)
                    .collect();
                if text.is_empty() {
                    if let Ok(err) = serde_json::from_str::<ErrorResponse>(payload) {
                        return Some(Frame::Error(err.error.message));
                    }
                    None
                } else {
                    Some(Frame::Token(text))
                }
            }
            Err(e) => {
                if let Ok(err) = serde_json::from_str::<ErrorResponse>(payload) {
                    return Some(Frame::Error(err.error.message));
                }
                tracing::warn!("Skipping unparseable stream payload: {}", e);
                None
            }
        }
    }
}

/// Drives an SSE byte stream to completion, forwarding tokens to `tx` and
/// finishing with a single `Done` or `Error`.
pub async fn forward_sse_stream<S, E>(mut stream: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();

    while let Some(chunk_result) = stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error(format!("Stream error: {}", e)))
                    .await;
                return;
            }
        };

        for frame in decoder.push(&bytes) {
            if !emit(&tx, &decoder, frame).await {
                return;
            }
        }
    }

    for frame in decoder.finish() {
        if !emit(&tx, &decoder, frame).await {
            return;
        }
    }

    // Body ended without [DONE]; treat end of body as completion.
    let _ = tx.send(done_event(&decoder)).await;
}

/// Returns false when the stream is over, either because a terminal frame was
/// sent or because the receiver went away.
async fn emit(tx: &mpsc::Sender<StreamEvent>, decoder: &SseDecoder, frame: Frame) -> bool {
    match frame {
        Frame::Token(text) => tx.send(StreamEvent::Token(text)).await.is_ok(),
        Frame::Error(message) => {
            let _ = tx.send(StreamEvent::Error(message)).await;
            false
        }
        Frame::Done => {
            let _ = tx.send(done_event(decoder)).await;
            false
        }
    }
}

fn done_event(decoder: &SseDecoder) -> StreamEvent {
    let usage = decoder.usage();
    StreamEvent::Done {
        tokens_in: usage.and_then(|u| u.prompt_tokens),
        tokens_out: usage.and_then(|u| u.completion_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(frames: &[Frame]) -> String {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decodes_complete_lines() {
        let mut d = SseDecoder::new();
        let frames = d.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        );
        assert_eq!(tokens(&frames), "Hello");
    }

    #[test]
    fn keeps_partial_line_until_newline() {
        let mut d = SseDecoder::new();
        assert!(d.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let frames = d.push(b"tent\":\"Hi\"}}]}\n");
        assert_eq!(frames, vec![Frame::Token("Hi".into())]);
    }

    #[test]
    fn handles_multibyte_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo 🌍\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('🌍').unwrap() + 2;
        let mut d = SseDecoder::new();
        let mut frames = d.push(&bytes[..split]);
        frames.extend(d.push(&bytes[split..]));
        assert_eq!(tokens(&frames), "héllo 🌍");
    }

    #[test]
    fn invalid_byte_does_not_corrupt_following_split_character() {
        let mut first = b"data: {\"choices\":[{\"delta\":{\"content\":\"a".to_vec();
        first.push(0xFF);
        let globe = "🌍".as_bytes();
        first.extend_from_slice(&globe[..2]);
        let mut second = globe[2..].to_vec();
        second.extend_from_slice(b"\"}}]}\n");

        let mut d = SseDecoder::new();
        let mut frames = d.push(&first);
        frames.extend(d.push(&second));
        assert_eq!(tokens(&frames), "a\u{FFFD}🌍");
    }

    #[test]
    fn normalizes_crlf_and_skips_comments() {
        let mut d = SseDecoder::new();
        let frames = d.push(
            b": OPENROUTER PROCESSING\r\n\r\ndata:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n",
        );
        assert_eq!(frames, vec![Frame::Token("x".into())]);
    }

    #[test]
    fn done_stops_decoding() {
        let mut d = SseDecoder::new();
        let frames = d.push(
            b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        );
        assert_eq!(frames, vec![Frame::Done]);
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let mut d = SseDecoder::new();
        let frames = d.push(
            b"data: {not json\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        assert_eq!(frames, vec![Frame::Token("ok".into())]);
    }

    #[test]
    fn empty_deltas_produce_nothing() {
        let mut d = SseDecoder::new();
        let frames = d.push(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn error_payload_becomes_error_frame() {
        let mut d = SseDecoder::new();
        let frames = d.push(b"data: {\"error\":{\"message\":\"Provider overloaded\",\"code\":502}}\n");
        assert_eq!(frames, vec![Frame::Error("Provider overloaded".into())]);
    }

    #[test]
    fn usage_is_captured() {
        let mut d = SseDecoder::new();
        d.push(b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":34}}\n");
        let usage = d.usage().unwrap();
        assert_eq!(usage.prompt_tokens, Some(12));
        assert_eq!(usage.completion_tokens, Some(34));
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut d = SseDecoder::new();
        assert!(d.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}").is_empty());
        assert_eq!(d.finish(), vec![Frame::Token("tail".into())]);
    }

    async fn collect(chunks: Vec<&'static [u8]>) -> Vec<StreamEvent> {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(bytes::Bytes::from_static(c))),
        );
        let (tx, mut rx) = mpsc::channel(16);
        forward_sse_stream(stream, tx).await;
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn forwards_tokens_then_done() {
        let events = collect(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\ndata: [DONE]\n",
        ])
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("a".into()),
                StreamEvent::Token("b".into()),
                StreamEvent::Done {
                    tokens_in: None,
                    tokens_out: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn end_of_body_without_done_still_completes() {
        let events = collect(vec![b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}"]).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn transport_error_is_terminal() {
        let stream = futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            )),
            Err(std::io::Error::other("connection reset")),
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        forward_sse_stream(stream, tx).await;
        assert_eq!(rx.recv().await, Some(StreamEvent::Token("a".into())));
        match rx.recv().await {
            Some(StreamEvent::Error(msg)) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(rx.recv().await, None);
    }
}
