// NDJSON stream parsing
// The agent CLI writes one JSON record per line to stdout. Chunks arrive with
// arbitrary boundaries, so lines are reassembled before decoding; anything
// that fails to decode is transport noise and is silently skipped.

use serde_json::Value;

/// Reassembles newline-delimited records from arbitrary byte chunks.
///
/// An incomplete trailing fragment is carried forward and prefixed onto the
/// next chunk. Splitting happens on raw bytes so a UTF-8 sequence broken
/// across chunks is never mangled.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk, returning the complete lines it finished.
    /// Whitespace-only lines are discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let rest = self.carry.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.carry, rest);
            line.pop(); // trailing '\n'

            let text = String::from_utf8_lossy(&line);
            if !text.trim().is_empty() {
                lines.push(text.into_owned());
            }
        }
        lines
    }

    /// Flush the carried fragment at stream end, if it holds anything.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.carry);
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            None
        } else {
            Some(text.into_owned())
        }
    }
}

/// Semantic effect of one complete stream line
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    /// Displayable text fragment
    Text(String),
    /// Terminal record: result text plus the continuation token
    Result { result: String, session_id: String },
    /// Non-text event, unknown shape, or undecodable line
    Ignored,
}

/// Classify one stream line.
///
/// Recognized record shapes:
/// - `content_block_delta` — a small streaming text chunk
/// - `assistant` — a full message; text blocks are joined with newlines
/// - `result` — the terminal record carrying the result and session id
///
/// Decode failures and unrecognized shapes never raise; they are swallowed.
pub fn parse_stream_line(line: &str) -> StreamLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return StreamLine::Ignored;
    }

    let obj: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return StreamLine::Ignored,
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            match obj.pointer("/delta/text").and_then(Value::as_str) {
                Some(text) if !text.is_empty() => StreamLine::Text(text.to_string()),
                _ => StreamLine::Ignored,
            }
        }
        Some("assistant") => {
            let blocks = match obj.pointer("/message/content").and_then(Value::as_array) {
                Some(blocks) => blocks,
                None => return StreamLine::Ignored,
            };
            let text = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            if text.is_empty() {
                StreamLine::Ignored
            } else {
                StreamLine::Text(text)
            }
        }
        Some("result") => {
            let result = obj.get("result").and_then(Value::as_str);
            let session_id = obj.get("session_id").and_then(Value::as_str);
            match (result, session_id) {
                (Some(result), Some(session_id)) => StreamLine::Result {
                    result: result.to_string(),
                    session_id: session_id.to_string(),
                },
                _ => StreamLine::Ignored,
            }
        }
        _ => StreamLine::Ignored,
    }
}
