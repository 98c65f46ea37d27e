//! Upstream response reading
//!
//! The upstream answers either with one JSON document or with a
//! server-sent-event stream:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"content":"lo","completionTokenCount":2}
//!
//! data: [DONE]
//! ```
//!
//! Both are reduced to a single [`Completion`].

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::error::{GaiaError, Result};
use crate::upstream::budget::estimate_tokens;

/// Sentinel that terminates an event stream
const DONE_SENTINEL: &str = "[DONE]";

/// Longest event-stream line accepted before the body is treated as malformed
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Accumulated upstream answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Concatenated, trimmed text
    pub content: String,
    /// Reported completion tokens, or an estimate when none were reported
    pub completion_tokens: u64,
}

impl Completion {
    fn new(content: &str, reported_tokens: Option<u64>) -> Self {
        let content = content.trim().to_string();
        let completion_tokens = match reported_tokens {
            Some(tokens) => tokens,
            None => estimate_tokens(&content),
        };
        Self {
            content,
            completion_tokens,
        }
    }
}

/// Represents one meaningful SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Data line payload with the `data:` prefix removed
    Data(String),
    /// Terminal [DONE] marker
    Done,
}

impl SseEvent {
    /// Classify a single line; blank lines, comments and other fields yield `None`
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim();
        if data == DONE_SENTINEL {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

/// One decoded `data:` payload
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
    #[serde(default)]
    completion_token_count: Option<u64>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl StreamChunk {
    fn text(&self) -> Option<&str> {
        self.choices
            .as_ref()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
            .or(self.content.as_deref())
    }

    fn tokens(&self) -> Option<u64> {
        self.completion_token_count
            .or_else(|| self.usage.as_ref().and_then(|u| u.completion_tokens))
    }
}

/// Folds SSE lines into a [`Completion`]
#[derive(Debug, Default)]
pub struct SseAccumulator {
    content: String,
    reported_tokens: Option<u64>,
    done: bool,
    chunks: usize,
    skipped: usize,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns `false` once the `[DONE]` sentinel was seen.
    pub fn push_line(&mut self, line: &str) -> bool {
        if self.done {
            return false;
        }

        match SseEvent::parse_line(line) {
            None => {}
            Some(SseEvent::Done) => self.done = true,
            Some(SseEvent::Data(data)) => match serde_json::from_str::<StreamChunk>(&data) {
                Ok(chunk) => {
                    self.chunks += 1;
                    if let Some(tokens) = chunk.tokens() {
                        self.reported_tokens = Some(self.reported_tokens.unwrap_or(0) + tokens);
                    }
                    if let Some(text) = chunk.text() {
                        self.content.push_str(text);
                    }
                }
                Err(e) => {
                    self.skipped += 1;
                    tracing::debug!("Skipping malformed SSE chunk: {e}");
                }
            },
        }

        !self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of chunks that decoded successfully
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Number of data lines that were not valid chunks
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> Completion {
        Completion::new(&self.content, self.reported_tokens)
    }
}

/// Accumulate a fully buffered event-stream body
pub fn accumulate_sse(raw: &str) -> Completion {
    let mut acc = SseAccumulator::new();
    for line in raw.lines() {
        if !acc.push_line(line) {
            break;
        }
    }
    acc.finish()
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

/// Known shapes of a non-streamed reply, tried in declaration order
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseShape {
    /// `{"content": "..."}`
    Flat {
        content: String,
        #[serde(default, rename = "completionTokenCount")]
        completion_token_count: Option<u64>,
        #[serde(default)]
        usage: Option<Usage>,
    },
    /// OpenAI-style `{"choices": [{"message": {"content": "..."}}]}`
    Chat {
        choices: Vec<ChatChoice>,
        #[serde(default, rename = "completionTokenCount")]
        completion_token_count: Option<u64>,
        #[serde(default)]
        usage: Option<Usage>,
    },
}

/// Decode a non-streamed JSON reply
pub fn parse_json_body(body: &[u8]) -> Result<Completion> {
    let shape: ResponseShape = serde_json::from_slice(body)
        .map_err(|e| GaiaError::ResponseFormat(format!("Unexpected upstream response format: {e}")))?;

    let (content, counted, usage) = match shape {
        ResponseShape::Flat {
            content,
            completion_token_count,
            usage,
        } => (content, completion_token_count, usage),
        ResponseShape::Chat {
            choices,
            completion_token_count,
            usage,
        } => {
            let first = choices.into_iter().next().ok_or_else(|| {
                GaiaError::ResponseFormat("Upstream response has an empty choices list".into())
            })?;
            let content = first
                .message
                .and_then(|m| m.content)
                .unwrap_or_default();
            (content, completion_token_count, usage)
        }
    };

    let reported = counted.or_else(|| usage.and_then(|u| u.completion_tokens));
    Ok(Completion::new(&content, reported))
}

/// Text decoding for event-stream lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCharset {
    Utf8,
    Latin1,
}

impl LineCharset {
    /// Charset declared in a `content-type` header; UTF-8 when absent or unsupported
    pub fn from_content_type(content_type: &str) -> Self {
        let declared = content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').to_lowercase());

        match declared.as_deref() {
            None | Some("utf-8" | "utf8") => LineCharset::Utf8,
            Some("iso-8859-1" | "latin1" | "latin-1" | "us-ascii" | "ascii") => {
                LineCharset::Latin1
            }
            Some(other) => {
                tracing::debug!("Unsupported event-stream charset '{other}', decoding as UTF-8");
                LineCharset::Utf8
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            LineCharset::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => String::from_utf8_lossy(bytes).into_owned(),
            },
            LineCharset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Splits a byte stream into `\n`-terminated lines
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Bytes of `buf` already known to hold no newline
    scanned: usize,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Append a chunk and drain every complete line (terminator stripped)
    ///
    /// # Errors
    /// * `ResponseFormat` - the pending unterminated line grew past the limit
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            let mut line = self.buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            lines.push(line.freeze());
            self.scanned = 0;
        }
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_line {
            return Err(GaiaError::ResponseFormat(format!(
                "event stream line exceeds {} bytes",
                self.max_line
            )));
        }
        Ok(lines)
    }

    /// Trailing bytes not followed by a newline
    pub fn finish(self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.freeze())
        }
    }
}

/// Whether a `content-type` value denotes an event stream
pub fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
        .unwrap_or(false)
}

/// Consumes an upstream HTTP response into a [`Completion`]
pub struct StreamingResponseReader;

impl StreamingResponseReader {
    /// Read the whole response, streaming or not.
    ///
    /// Body read failures surface as `Network`, undecodable JSON bodies as
    /// `ResponseFormat`; the caller decides whether either is retried.
    pub async fn read(response: reqwest::Response) -> Result<Completion> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if is_event_stream(&content_type) {
            Self::read_event_stream(response, &content_type).await
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|e| GaiaError::Network(format!("Failed to read response body: {e}")))?;
            parse_json_body(&body)
        }
    }

    async fn read_event_stream(response: reqwest::Response, content_type: &str) -> Result<Completion> {
        let charset = LineCharset::from_content_type(content_type);
        let mut lines = LineBuffer::new();
        let mut acc = SseAccumulator::new();
        let mut stream = response.bytes_stream();

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| GaiaError::Network(format!("Failed to read event stream: {e}")))?;
            for line in lines.push(&chunk)? {
                if !acc.push_line(&charset.decode(&line)) {
                    break 'read;
                }
            }
        }

        if !acc.is_done() {
            if let Some(rest) = lines.finish() {
                acc.push_line(&charset.decode(&rest));
            }
        }

        tracing::debug!(
            chunks = acc.chunk_count(),
            skipped = acc.skipped_count(),
            complete = acc.is_done(),
            "Event stream consumed"
        );
        Ok(acc.finish())
    }
}
