//! Delivery targets for outgoing messages.

use crate::outbound::message::{MessageError, OutgoingMessage};
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

/// Anything that can deliver outgoing messages.
pub trait OutboundSink {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), SinkError>;
}

/// Sink errors.
#[derive(Debug)]
pub enum SinkError {
    Invalid(MessageError),
    Io(String),
    Serialize(String),
    Transport(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Invalid(e) => write!(f, "Invalid message: {e}"),
            SinkError::Io(e) => write!(f, "IO error: {e}"),
            SinkError::Serialize(e) => write!(f, "Serialize error: {e}"),
            SinkError::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<MessageError> for SinkError {
    fn from(e: MessageError) -> Self {
        SinkError::Invalid(e)
    }
}

/// Writes each message as one JSON line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl JsonLinesSink<std::fs::File> {
    /// Append to a file, creating it and its parent directory if needed.
    pub fn append(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Io(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::Io(e.to_string()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> OutboundSink for JsonLinesSink<W> {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), SinkError> {
        let line =
            serde_json::to_string(message).map_err(|e| SinkError::Serialize(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| SinkError::Io(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| SinkError::Io(e.to_string()))
    }
}

/// Keeps sent messages in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Rc<RefCell<Vec<OutgoingMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.messages.borrow().clone()
    }

    /// Alert texts in the order they were sent.
    pub fn alerts(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter_map(|m| match m {
                OutgoingMessage::Alert { text, .. } => Some(text.clone()),
                OutgoingMessage::Data { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }
}

impl OutboundSink for MemorySink {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), SinkError> {
        self.messages.borrow_mut().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines_output() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.send(&OutgoingMessage::alert("first", 1.0)).unwrap();
        sink.send(&OutgoingMessage::alert("second", 2.0)).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"first\""));
        assert!(lines[1].contains("\"kind\":\"alert\""));
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("messages.jsonl");

        let mut sink = JsonLinesSink::append(&path).unwrap();
        sink.send(&OutgoingMessage::alert("one", 1.0)).unwrap();
        drop(sink);
        let mut sink = JsonLinesSink::append(&path).unwrap();
        sink.send(&OutgoingMessage::alert("two", 2.0)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.send(&OutgoingMessage::alert("hello", 1.0)).unwrap();
        assert_eq!(sink.alerts(), vec!["hello".to_string()]);
        sink.clear();
        assert!(handle.is_empty());
    }
}
