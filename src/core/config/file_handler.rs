// src/core/config/file_handler.rs

//! Buffered writes against an on-disk option file.

use crate::core::config::option_file::OptionFile;
use crate::core::errors::ReplicoreError;
use tracing::debug;

#[derive(Debug, Clone)]
enum FileOp {
    Set { name: String, value: Option<String> },
    Remove { name: String },
}

/// Queues option-file mutations and replays them on
/// [`apply`](FileHandler::apply), flushing the file once at the end. The file
/// is either rewritten in full or left untouched.
pub struct FileHandler {
    file: Box<dyn OptionFile>,
    queue: Vec<FileOp>,
}

impl FileHandler {
    pub fn new(file: Box<dyn OptionFile>) -> Self {
        Self {
            file,
            queue: Vec::new(),
        }
    }

    /// Queues an option write; `None` writes the key without a value.
    pub fn set(&mut self, name: &str, value: Option<String>) {
        debug!(
            "Setting '{name}' to '{}' on option file (no change actually applied yet).",
            value.as_deref().unwrap_or("")
        );
        self.queue.push(FileOp::Set {
            name: name.to_string(),
            value,
        });
    }

    /// Queues removal of an option from the file.
    pub fn remove(&mut self, name: &str) {
        debug!("Removing '{name}' from the option file (no change actually applied yet).");
        self.queue.push(FileOp::Remove {
            name: name.to_string(),
        });
    }

    /// Replays queued mutations in insertion order and flushes to disk.
    pub async fn apply(&mut self) -> Result<(), ReplicoreError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        for op in self.queue.drain(..) {
            match op {
                FileOp::Set { name, value } => self.file.set(&name, value.as_deref()),
                FileOp::Remove { name } => self.file.remove(&name),
            }
        }
        self.file.flush().await
    }
}
