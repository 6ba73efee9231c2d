pub mod crawler;
pub mod extract;
pub mod fetcher;
pub mod html;
pub mod index;
pub mod lexer;
pub mod segment;
pub mod server;

use std::fs;
use std::io::{Write, stderr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};

use anyhow::Context;

use crate::index::{Index, Website};

/// A log line produced anywhere in the engine. Workers and the index send
/// these over a channel instead of writing to the terminal themselves, and a
/// single handler thread drains them.
pub enum Message {
    Info(String),
    Warning(String),
    Error(String),
}

/// Where drained messages end up.
#[derive(Clone)]
pub enum ErrorStream {
    Stderr,
    File(PathBuf),
}

pub type MessageSender = Arc<Mutex<mpsc::Sender<Message>>>;

/// Creates the shared logging channel.
pub fn message_channel() -> (MessageSender, mpsc::Receiver<Message>) {
    let (sender, receiver) = mpsc::channel();
    (Arc::new(Mutex::new(sender)), receiver)
}

/// Blocks for the next message and writes it to the configured stream.
/// Returns without error once all senders are gone.
pub fn handle_messages(
    receiver: &mpsc::Receiver<Message>,
    stream: &ErrorStream,
) -> anyhow::Result<()> {
    let message = match receiver.recv() {
        Ok(message) => message,
        Err(_) => return Ok(()),
    };

    let line = match message {
        Message::Info(text) => format!("INFO: {text}"),
        Message::Warning(text) => format!("WARN: {text}"),
        Message::Error(text) => format!("ERROR: {text}"),
    };

    match stream {
        ErrorStream::Stderr => {
            let mut stderr = stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
        ErrorStream::File(path) => {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context("open log file")?;
            let _ = writeln!(file, "{line}");
        }
    }

    Ok(())
}

/// Opens an index directory and runs a single query against it.
pub fn search_query(
    query: &str,
    index_dir: &Path,
    sender: MessageSender,
) -> anyhow::Result<Vec<Website>> {
    let index = Index::open(index_dir, None, false, sender).context("open index")?;
    index.find(query).context("query results")
}

/// Formats a duration in nanoseconds with a unit a human would pick.
pub fn format_time(ns: u128) -> String {
    const SEC: u128 = 1_000_000_000;

    if ns < 1_000 {
        format!("{ns}ns")
    } else if ns < 1_000_000 {
        format!("{:.2}μs", ns as f64 / 1_000.0)
    } else if ns < SEC {
        format!("{:.2}ms", ns as f64 / 1_000_000.0)
    } else if ns < 60 * SEC {
        format!("{:.2}s", ns as f64 / SEC as f64)
    } else if ns < 60 * 60 * SEC {
        format!("{:.2}min", ns as f64 / (60 * SEC) as f64)
    } else {
        format!("{:.2}h", ns as f64 / (60 * 60 * SEC) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_every_magnitude() {
        assert_eq!(format_time(512), "512ns");
        assert_eq!(format_time(1_500), "1.50μs");
        assert_eq!(format_time(2_000_000), "2.00ms");
        assert_eq!(format_time(3_500_000_000), "3.50s");
        assert_eq!(format_time(90_000_000_000), "1.50min");
        assert_eq!(format_time(7_200_000_000_000), "2.00h");
    }
}
