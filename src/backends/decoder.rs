use serde_json::Value;
use std::borrow::Cow;

/// Incremental decoder for command-line output that mixes JSON lines and
/// plain text.
///
/// Bytes are buffered until a newline arrives, so a line split across
/// chunks (or a UTF-8 sequence split across chunks) is only parsed once it
/// is complete. Lines that are not JSON are kept verbatim.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    output: String,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of raw output
    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]).into_owned();
            self.decode_line(&line);
            start = end + 1;
        }
        self.pending.drain(..start);
    }

    /// Text accumulated so far, not counting the unterminated tail
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Flush the unterminated tail and return everything decoded
    pub fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&tail).into_owned();
            self.decode_line(&line);
        }
        self.output
    }

    fn decode_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                if let Some(text) = extract_text(&value) {
                    self.output.push_str(&text);
                }
            }
            Err(_) => {
                self.output.push_str(line.trim_end_matches('\r'));
                self.output.push('\n');
            }
        }
    }
}

/// Text carried by one parsed line.
///
/// Precedence: `content`, then `text`, then `choices[0].delta.content`,
/// then the value itself when it is a bare string. A field holding a
/// non-zero number or `true` contributes its printed form; empty strings,
/// zero, `false` and `null` fall through to the next shape.
fn extract_text(value: &Value) -> Option<Cow<'_, str>> {
    scalar_text(value.get("content"))
        .or_else(|| scalar_text(value.get("text")))
        .or_else(|| scalar_text(value.pointer("/choices/0/delta/content")))
        .or_else(|| value.as_str().map(Cow::Borrowed))
}

fn scalar_text(value: Option<&Value>) -> Option<Cow<'_, str>> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(Cow::Owned(n.to_string())),
        Value::Bool(true) => Some(Cow::Borrowed("true")),
        _ => None,
    }
}
