//! Daemon progress frames and their rendering.
//!
//! Build, push and pull replies are newline-delimited JSON. Each frame carries
//! build output (`stream`), layer status (`status`/`id`/`progress`), auxiliary
//! results (`aux`) or a terminal error (`error`/`errorDetail`).

use std::collections::HashMap;
use std::io::{IsTerminal, Write};

use crossterm::{cursor, queue, terminal};
use kpm_core::error::{KpmError, Result};
use serde::Deserialize;

/// Byte counters for a layer transfer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressDetail {
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

/// One progress frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JsonMessage {
    pub stream: Option<String>,
    pub status: Option<String>,
    pub id: Option<String>,
    pub progress: Option<String>,
    #[serde(rename = "progressDetail")]
    pub progress_detail: Option<ProgressDetail>,
    pub aux: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(rename = "errorDetail")]
    pub error_detail: Option<ErrorDetail>,
}

impl JsonMessage {
    /// The error carried by this frame, if any.
    pub fn error_message(&self) -> Option<String> {
        if let Some(detail) = &self.error_detail {
            if !detail.message.is_empty() {
                return Some(detail.message.clone());
            }
        }
        self.error.clone()
    }

    /// Plain one-line rendering, or None when there is nothing to show.
    fn plain_line(&self) -> Option<String> {
        if let Some(err) = self.error_message() {
            return Some(format!("ERROR: {}", err));
        }
        if let Some(stream) = &self.stream {
            let text = stream.trim_end_matches(['\r', '\n']);
            return (!text.is_empty()).then(|| text.to_string());
        }
        if let Some(status) = &self.status {
            return Some(match &self.id {
                Some(id) => format!("{}: {}", id, status),
                None => status.clone(),
            });
        }
        self.aux.as_ref().and_then(render_aux)
    }

    /// Terminal rendering, which adds the progress bar.
    fn terminal_line(&self) -> Option<String> {
        let line = self.plain_line()?;
        match (&self.status, &self.progress) {
            (Some(_), Some(progress)) if self.error_message().is_none() => {
                Some(format!("{} {}", line, progress))
            }
            _ => Some(line),
        }
    }
}

/// Build reports `{"ID": ..}`; push reports `{"Tag", "Digest", "Size"}`.
fn render_aux(aux: &serde_json::Value) -> Option<String> {
    if let Some(id) = aux.get("ID").and_then(|v| v.as_str()) {
        return Some(format!("Built image {}", id));
    }
    let digest = aux.get("Digest").and_then(|v| v.as_str())?;
    let tag = aux.get("Tag").and_then(|v| v.as_str()).unwrap_or("");
    let size = aux.get("Size").and_then(|v| v.as_u64()).unwrap_or(0);
    Some(format!("{}: digest: {} size: {}", tag, digest, size))
}

/// Splits a byte stream into JSON frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every complete frame it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<JsonMessage>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(frame) = parse_frame(&line)? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Parse whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Result<Option<JsonMessage>> {
        let rest = std::mem::take(&mut self.buf);
        parse_frame(&rest)
    }
}

fn parse_frame(line: &[u8]) -> Result<Option<JsonMessage>> {
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    serde_json::from_slice(line)
        .map(Some)
        .map_err(|e| KpmError::DaemonError(format!("malformed progress frame: {}", e)))
}

/// Where user-visible progress goes.
///
/// On a terminal, frames with an `id` are redrawn in place; everywhere else
/// each frame becomes one line.
pub struct ProgressSink {
    out: Box<dyn Write + Send>,
    terminal: bool,
    /// Line index of each frame id already on screen
    positions: HashMap<String, usize>,
    lines: usize,
}

impl ProgressSink {
    pub fn new(out: impl Write + Send + 'static, terminal: bool) -> Self {
        Self {
            out: Box::new(out),
            terminal,
            positions: HashMap::new(),
            lines: 0,
        }
    }

    /// Standard error, with in-place updates when it is a terminal.
    pub fn stderr() -> Self {
        let terminal = std::io::stderr().is_terminal();
        Self::new(std::io::stderr(), terminal)
    }

    /// Drop everything.
    pub fn discard() -> Self {
        Self::new(std::io::sink(), false)
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Render one frame.
    pub fn render(&mut self, msg: &JsonMessage) -> Result<()> {
        if !self.terminal {
            if let Some(line) = msg.plain_line() {
                self.write_line(&line)?;
            }
            return Ok(());
        }

        let Some(line) = msg.terminal_line() else {
            return Ok(());
        };

        match msg.id.as_ref().filter(|_| msg.status.is_some()) {
            Some(id) => match self.positions.get(id).copied() {
                Some(index) => self.rewrite_line(index, &line)?,
                None => {
                    self.positions.insert(id.clone(), self.lines);
                    self.write_line(&line)?;
                }
            },
            None => self.write_line(&line)?,
        }
        Ok(())
    }

    /// Write a free-form line.
    pub fn line(&mut self, text: &str) -> Result<()> {
        self.write_line(text)
    }

    fn write_line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text)?;
        self.out.flush()?;
        // Stream output may span several screen lines.
        self.lines += text.lines().count().max(1);
        Ok(())
    }

    /// Redraw line `index`, counted from the first line this sink wrote.
    fn rewrite_line(&mut self, index: usize, text: &str) -> Result<()> {
        let up = u16::try_from(self.lines - index).unwrap_or(u16::MAX);
        queue!(
            self.out,
            cursor::MoveUp(up),
            terminal::Clear(terminal::ClearType::CurrentLine)
        )?;
        write!(self.out, "\r{}", text)?;
        queue!(self.out, cursor::MoveDown(up))?;
        write!(self.out, "\r")?;
        self.out.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("terminal", &self.terminal)
            .field("lines", &self.lines)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Writer that keeps its bytes for inspection.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn frame(json: &str) -> JsonMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_decoder_handles_split_frames() {
        let mut decoder = FrameDecoder::new();
        let first = decoder.push(br#"{"stream":"Step 1/2"#).unwrap();
        assert!(first.is_empty());

        let second = decoder
            .push(b" : FROM scratch\\n\"}\n{\"stream\":\"done\"}\n")
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].stream.as_deref(), Some("Step 1/2 : FROM scratch\n"));
        assert_eq!(second[1].stream.as_deref(), Some("done"));
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_decoder_trailing_frame_without_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(br#"{"status":"ok"}"#).unwrap().is_empty());
        let last = decoder.finish().unwrap().unwrap();
        assert_eq!(last.status.as_deref(), Some("ok"));
    }

    #[test]
    fn test_decoder_skips_blank_lines() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"\r\n\n{\"status\":\"x\"}\r\n").unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_decoder_malformed() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.push(b"not json\n").unwrap_err();
        assert!(matches!(err, KpmError::DaemonError(_)));
    }

    #[test]
    fn test_error_message_prefers_detail() {
        let msg = frame(r#"{"error":"short","errorDetail":{"message":"long form"}}"#);
        assert_eq!(msg.error_message().as_deref(), Some("long form"));

        let msg = frame(r#"{"error":"only"}"#);
        assert_eq!(msg.error_message().as_deref(), Some("only"));

        assert!(frame(r#"{"stream":"x"}"#).error_message().is_none());
    }

    #[test]
    fn test_plain_sink_one_line_per_frame() {
        let captured = Captured::default();
        let mut sink = ProgressSink::new(captured.clone(), false);

        sink.render(&frame(r#"{"stream":"Step 1/2 : FROM scratch\n"}"#)).unwrap();
        sink.render(&frame(r#"{"status":"Pushing","id":"abc","progress":"[==>  ]"}"#))
            .unwrap();
        sink.render(&frame(r#"{"status":"Pushed","id":"abc"}"#)).unwrap();
        sink.render(&frame(r#"{"aux":{"ID":"sha256:feed"}}"#)).unwrap();
        sink.render(&frame(r#"{"error":"denied"}"#)).unwrap();

        assert_eq!(
            captured.text(),
            "Step 1/2 : FROM scratch\nabc: Pushing\nabc: Pushed\nBuilt image sha256:feed\nERROR: denied\n"
        );
        assert!(!captured.text().contains('\x1b'));
    }

    #[test]
    fn test_plain_sink_skips_empty_stream() {
        let captured = Captured::default();
        let mut sink = ProgressSink::new(captured.clone(), false);
        sink.render(&frame(r#"{"stream":"\n"}"#)).unwrap();
        assert_eq!(captured.text(), "");
    }

    #[test]
    fn test_terminal_sink_updates_in_place() {
        let captured = Captured::default();
        let mut sink = ProgressSink::new(captured.clone(), true);

        sink.render(&frame(r#"{"status":"Pushing","id":"l1","progress":"[=>   ]"}"#))
            .unwrap();
        sink.render(&frame(r#"{"status":"Pushing","id":"l2"}"#)).unwrap();
        sink.render(&frame(r#"{"status":"Pushed","id":"l1"}"#)).unwrap();

        let text = captured.text();
        assert!(text.starts_with("l1: Pushing [=>   ]\nl2: Pushing\n"));
        // Third frame moves the cursor up instead of adding a line
        assert!(text.contains('\x1b'));
        assert!(text.contains("\rl1: Pushed"));
        assert_eq!(text.matches('\n').count(), 2);
    }

    #[test]
    fn test_terminal_sink_counts_multi_line_stream() {
        let captured = Captured::default();
        let mut sink = ProgressSink::new(captured.clone(), true);

        sink.render(&frame(r#"{"status":"Pulling","id":"l1"}"#)).unwrap();
        sink.render(&frame(r#"{"stream":"line a\nline b\n"}"#)).unwrap();
        sink.render(&frame(r#"{"status":"Done","id":"l1"}"#)).unwrap();

        let text = captured.text();
        assert!(text.starts_with("l1: Pulling\nline a\nline b\n"));
        // Three lines below the l1 row, not two
        assert!(text.contains("\x1b[3A\x1b[2K\rl1: Done"));
        assert!(text.ends_with("\x1b[3B\r"));
    }

    #[test]
    fn test_push_aux_rendering() {
        let msg = frame(r#"{"aux":{"Tag":"1.2.3","Digest":"sha256:aa","Size":528}}"#);
        assert_eq!(
            msg.plain_line().as_deref(),
            Some("1.2.3: digest: sha256:aa size: 528")
        );
    }

    #[test]
    fn test_free_form_line() {
        let captured = Captured::default();
        let mut sink = ProgressSink::new(captured.clone(), false);
        sink.line("Untagged: a.b:1.2.3").unwrap();
        assert_eq!(captured.text(), "Untagged: a.b:1.2.3\n");
    }
}
