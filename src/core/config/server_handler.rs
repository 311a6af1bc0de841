// src/core/config/server_handler.rs

//! Buffered system-variable writes against the live server.

use crate::core::errors::ReplicoreError;
use crate::core::instance::{Instance, OptionValue, VarQualifier};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct QueuedWrite {
    name: String,
    value: OptionValue,
    qualifier: VarQualifier,
    /// Sleep imposed after the write lands, so persisted-variable timestamps
    /// in the server journal stay distinct for order-sensitive options.
    delay: Duration,
}

/// Queues system-variable writes and replays them in insertion order on
/// [`apply`](ServerHandler::apply). Reads always go straight to the server.
pub struct ServerHandler {
    instance: Arc<dyn Instance>,
    default_qualifier: VarQualifier,
    queue: Vec<QueuedWrite>,
}

impl ServerHandler {
    /// `default_qualifier` describes how this server persists plain writes:
    /// `Persist` on servers supporting `SET PERSIST`, `Global` otherwise.
    pub fn new(instance: Arc<dyn Instance>, default_qualifier: VarQualifier) -> Self {
        Self {
            instance,
            default_qualifier,
            queue: Vec::new(),
        }
    }

    pub fn default_qualifier(&self) -> VarQualifier {
        self.default_qualifier
    }

    pub fn instance(&self) -> &Arc<dyn Instance> {
        &self.instance
    }

    /// Queues a write with the handler's default qualifier.
    pub fn set(&mut self, name: &str, value: OptionValue) {
        self.set_with_qualifier(name, value, self.default_qualifier, Duration::ZERO);
    }

    /// Queues a write with an explicit qualifier and post-write delay.
    pub fn set_with_qualifier(
        &mut self,
        name: &str,
        value: OptionValue,
        qualifier: VarQualifier,
        delay: Duration,
    ) {
        debug!(
            "Setting '{name}' to '{value}' on server (no change actually applied yet)."
        );
        self.queue.push(QueuedWrite {
            name: name.to_string(),
            value,
            qualifier,
            delay,
        });
    }

    /// Queued writes as `(name, value, qualifier, delay)`, in insertion
    /// order.
    pub fn pending(&self) -> Vec<(String, OptionValue, VarQualifier, Duration)> {
        self.queue
            .iter()
            .map(|write| {
                (
                    write.name.clone(),
                    write.value.clone(),
                    write.qualifier,
                    write.delay,
                )
            })
            .collect()
    }

    /// Commits all queued writes in insertion order.
    pub async fn apply(&mut self) -> Result<(), ReplicoreError> {
        for write in self.queue.drain(..) {
            self.instance
                .set_sysvar(&write.name, &write.value, write.qualifier)
                .await?;
            if !write.delay.is_zero() {
                tokio::time::sleep(write.delay).await;
            }
        }
        Ok(())
    }
}
