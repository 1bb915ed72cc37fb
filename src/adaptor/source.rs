//! Line-oriented event source.
//!
//! Reads adaptor messages as JSON lines on a background thread and hands
//! them to the agent loop over a bounded channel.

use crate::adaptor::types::AdaptorMessage;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Channel capacity between readers and the agent loop.
pub const CHANNEL_CAPACITY: usize = 10_000;

/// Errors that can occur while reading events.
#[derive(Debug)]
pub enum SourceError {
    AlreadyRunning,
    Parse(String),
    Spawn(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::AlreadyRunning => write!(f, "Event source is already running"),
            SourceError::Parse(e) => write!(f, "Invalid adaptor message: {e}"),
            SourceError::Spawn(e) => write!(f, "Could not start reader thread: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<AdaptorMessage>, SourceError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| SourceError::Parse(e.to_string()))
}

/// Feeds adaptor messages into a channel.
pub struct EventSource {
    sender: Sender<AdaptorMessage>,
    receiver: Receiver<AdaptorMessage>,
    running: Arc<AtomicBool>,
}

impl Default for EventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start reading JSON lines from `reader` on a background thread.
    pub fn start<R>(&mut self, reader: R) -> Result<JoinHandle<()>, SourceError>
    where
        R: BufRead + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }

        let sender = self.sender.clone();
        let running = self.running.clone();
        std::thread::Builder::new()
            .name("event-reader".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!("Input read failed: {e}");
                            break;
                        }
                    };
                    match parse_line(&line) {
                        Ok(Some(message)) => {
                            if sender.send(message).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Skipping input line: {e}"),
                    }
                }
                tracing::debug!("Event input closed");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                SourceError::Spawn(e.to_string())
            })
    }

    /// Stop the reader after its current line.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// A sender other producers (such as the HTTP ingest) can feed.
    pub fn sender(&self) -> Sender<AdaptorMessage> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> &Receiver<AdaptorMessage> {
        &self.receiver
    }

    pub fn try_recv(&self) -> Option<AdaptorMessage> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("not json").is_err());

        let message = parse_line(
            r#"{"sensorId": "ADT1", "timestamp": 1.5, "characteristic": "binary_sensor", "data": "on"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(message.sensor_id, "ADT1");
    }

    #[test]
    fn test_reader_forwards_valid_lines() {
        let input = concat!(
            r#"{"sensorId": "ADT1", "timestamp": 1.0, "characteristic": "binary_sensor", "data": "on"}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"sensorId": "ADT2", "timestamp": 2.0, "characteristic": "binary_sensor", "data": "off"}"#,
            "\n",
        );

        let mut source = EventSource::new();
        let handle = source.start(Cursor::new(input.to_string())).unwrap();
        handle.join().unwrap();

        let receiver = source.receiver();
        let first = receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.sensor_id, "ADT1");
        assert_eq!(second.sensor_id, "ADT2");
        assert!(source.try_recv().is_none());
    }

    #[test]
    fn test_start_twice_fails() {
        let mut source = EventSource::new();
        source.start(Cursor::new(String::new())).unwrap();
        assert!(matches!(
            source.start(Cursor::new(String::new())),
            Err(SourceError::AlreadyRunning)
        ));
    }
}
