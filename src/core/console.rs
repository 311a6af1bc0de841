// src/core/console.rs

//! Operator-facing output. Orchestrators receive a [`Console`] explicitly;
//! internal diagnostics go through `tracing` instead and never reach it.

use tracing::{error, info, warn};

/// Destination for user-visible messages. Warnings printed here never alter
/// control flow.
pub trait Console: Send + Sync {
    fn print_info(&self, message: &str);
    fn print_note(&self, message: &str);
    fn print_warning(&self, message: &str);
    fn print_error(&self, message: &str);
}

/// Default console that forwards everything to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogConsole;

impl Console for LogConsole {
    fn print_info(&self, message: &str) {
        info!("{message}");
    }

    fn print_note(&self, message: &str) {
        info!("NOTE: {message}");
    }

    fn print_warning(&self, message: &str) {
        warn!("{message}");
    }

    fn print_error(&self, message: &str) {
        error!("{message}");
    }
}
