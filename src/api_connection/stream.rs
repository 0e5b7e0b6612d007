use super::connection::ApiConnectionError;
use super::endpoints::ChatCompletionChunk;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

/// Incremental decoder for `text/event-stream` completion bodies.
///
/// Network reads may split a line anywhere, including inside a multi-byte
/// character, so bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` marker has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds raw bytes and returns the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, ApiConnectionError> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.decode_line(&line, &mut events)?;
        }
        Ok(events)
    }

    /// Decodes whatever is left once the body has ended without a newline.
    pub fn finish(&mut self) -> Result<Vec<SseEvent>, ApiConnectionError> {
        let rest = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        self.decode_line(&rest, &mut events)?;
        Ok(events)
    }

    fn decode_line(
        &mut self,
        raw: &[u8],
        events: &mut Vec<SseEvent>,
    ) -> Result<(), ApiConnectionError> {
        if self.done {
            return Ok(());
        }
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);

        // Blank separators, comments and non-data fields carry no content.
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return Ok(());
        };
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.trim() == DONE_MARKER {
            self.done = true;
            events.push(SseEvent::Done);
            return Ok(());
        }
        if data.trim().is_empty() {
            return Ok(());
        }

        let chunk: ChatCompletionChunk =
            serde_json::from_str(data).map_err(|source| ApiConnectionError::MalformedChunk {
                payload: data.to_string(),
                source,
            })?;
        if let Some(error) = &chunk.error {
            return Err(ApiConnectionError::StreamError(error.to_string()));
        }
        events.push(SseEvent::Chunk(chunk));
        Ok(())
    }
}

/// Appends the text of each chunk in arrival order, skipping chunks that
/// carry no content.
pub fn collect_fragments<I>(chunks: I) -> String
where
    I: IntoIterator<Item = ChatCompletionChunk>,
{
    let mut answer = String::new();
    for chunk in chunks {
        if let Some(text) = chunk.content() {
            answer.push_str(text);
        }
    }
    answer
}
