// src/core/config/mod.rs

//! Unified write surface over the live server's system variables and an
//! on-disk option file. Writes are buffered per handler and committed in
//! insertion order by [`Config::apply`]; there is no atomicity across
//! handlers, so callers treat any apply failure as a failed operation.

pub mod file_handler;
pub mod option_file;
pub mod server_handler;

pub use file_handler::FileHandler;
pub use option_file::{IniOptionFile, OptionFile};
pub use server_handler::ServerHandler;

use crate::core::errors::ReplicoreError;
use crate::core::instance::{OptionValue, VarQualifier};

/// Handler id of the live-server backend.
pub const SERVER_HANDLER_ID: &str = "server";

/// Handler id of the option-file backend.
pub const FILE_HANDLER_ID: &str = "config_file";

/// The closed set of option-store backends. The string-id lookup surface is
/// kept alongside for the `set_for_handler` style of targeted writes.
pub enum Handler {
    Server(ServerHandler),
    File(FileHandler),
}

/// A named bundle of option-store handlers.
#[derive(Default)]
pub struct Config {
    handlers: Vec<(String, Handler)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the live-server handler under [`SERVER_HANDLER_ID`].
    pub fn add_server_handler(&mut self, handler: ServerHandler) {
        self.handlers
            .push((SERVER_HANDLER_ID.to_string(), Handler::Server(handler)));
    }

    /// Registers the option-file handler under [`FILE_HANDLER_ID`].
    pub fn add_file_handler(&mut self, handler: FileHandler) {
        self.handlers
            .push((FILE_HANDLER_ID.to_string(), Handler::File(handler)));
    }

    pub fn has_handler(&self, id: &str) -> bool {
        self.handlers.iter().any(|(handler_id, _)| handler_id == id)
    }

    pub fn handler_mut(&mut self, id: &str) -> Option<&mut Handler> {
        self.handlers
            .iter_mut()
            .find(|(handler_id, _)| handler_id == id)
            .map(|(_, handler)| handler)
    }

    pub fn server_handler(&mut self) -> Option<&mut ServerHandler> {
        match self.handler_mut(SERVER_HANDLER_ID) {
            Some(Handler::Server(handler)) => Some(handler),
            _ => None,
        }
    }

    /// Default qualifier of the server handler, if one is registered.
    pub fn server_default_qualifier(&self) -> Option<VarQualifier> {
        self.handlers.iter().find_map(|(_, handler)| match handler {
            Handler::Server(server) => Some(server.default_qualifier()),
            Handler::File(_) => None,
        })
    }

    pub fn file_handler(&mut self) -> Option<&mut FileHandler> {
        match self.handler_mut(FILE_HANDLER_ID) {
            Some(Handler::File(handler)) => Some(handler),
            _ => None,
        }
    }

    /// Queues a write on every registered handler.
    pub fn set(&mut self, name: &str, value: OptionValue) {
        for (_, handler) in &mut self.handlers {
            match handler {
                Handler::Server(server) => server.set(name, value.clone()),
                Handler::File(file) => file.set(name, value.as_file_value()),
            }
        }
    }

    /// Queues a write on one handler only.
    pub fn set_for_handler(
        &mut self,
        name: &str,
        value: OptionValue,
        handler_id: &str,
    ) -> Result<(), ReplicoreError> {
        match self.handler_mut(handler_id) {
            Some(Handler::Server(server)) => {
                server.set(name, value);
                Ok(())
            }
            Some(Handler::File(file)) => {
                file.set(name, value.as_file_value());
                Ok(())
            }
            None => Err(ReplicoreError::InvariantViolated(format!(
                "no configuration handler named '{handler_id}'"
            ))),
        }
    }

    /// Commits every handler's queued writes, each in its own insertion
    /// order. Handlers are applied in registration order; a failure aborts
    /// the remaining handlers and must be treated as partial state.
    pub async fn apply(&mut self) -> Result<(), ReplicoreError> {
        for (id, handler) in &mut self.handlers {
            let result = match handler {
                Handler::Server(server) => server.apply().await,
                Handler::File(file) => file.apply().await,
            };
            result.map_err(|e| {
                ReplicoreError::ConfigApplyFailed(format!("handler '{id}': {e}"))
            })?;
        }
        Ok(())
    }
}
