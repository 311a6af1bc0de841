// tests/common/mod.rs

//! Shared test doubles: a scriptable mock server instance that records every
//! write in order, an in-memory option file, and a recording console.

#![allow(dead_code)]

use async_trait::async_trait;
use replicore::core::config::{Config, FileHandler, OptionFile, ServerHandler};
use replicore::core::console::Console;
use replicore::core::errors::ReplicoreError;
use replicore::core::instance::{ErrorLogEntry, Instance, OptionValue, Row, VarQualifier};
use replicore::core::version::Version;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One observable operation against the mock server, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerOp {
    Set {
        name: String,
        value: String,
        sql_value: String,
        qualifier: VarQualifier,
    },
    SetDefault {
        name: String,
        qualifier: VarQualifier,
    },
    Execute(String),
}

#[derive(Default)]
struct MockState {
    sysvars: HashMap<String, String>,
    /// Per-variable scripted read results, popped front-first before falling
    /// back to `sysvars`.
    sysvar_scripts: HashMap<String, Vec<String>>,
    ops: Vec<ServerOp>,
    /// `(sql substring, rows)` canned query results.
    query_results: Vec<(String, Vec<Row>)>,
    /// `(sql substring, error message)` statements that fail.
    failing_statements: Vec<(String, String)>,
    /// `(sql substring, var, value)` side effects applied when a statement
    /// runs, e.g. the plugin clearing super_read_only on a successful start.
    execute_effects: Vec<(String, String, String)>,
    error_log: Option<Vec<ErrorLogEntry>>,
}

/// Scriptable [`Instance`] double. All reads come from a sysvar map (or a
/// per-variable script); all writes land in an ordered op journal and update
/// the map so later reads observe them.
pub struct MockInstance {
    version: Version,
    descr: String,
    state: Mutex<MockState>,
}

impl MockInstance {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            descr: "mysql://localhost:3306".to_string(),
            state: Mutex::new(MockState {
                error_log: Some(Vec::new()),
                ..MockState::default()
            }),
        }
    }

    pub fn with_descr(self, descr: &str) -> Self {
        Self {
            descr: descr.to_string(),
            ..self
        }
    }

    pub fn with_sysvar(self, name: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .sysvars
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Scripts successive reads of one variable; once exhausted, reads fall
    /// back to the sysvar map.
    pub fn with_sysvar_script(self, name: &str, values: &[&str]) -> Self {
        self.state.lock().unwrap().sysvar_scripts.insert(
            name.to_string(),
            values.iter().map(|value| value.to_string()).collect(),
        );
        self
    }

    pub fn with_query_result(self, sql_substring: &str, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .unwrap()
            .query_results
            .push((sql_substring.to_string(), rows));
        self
    }

    pub fn failing_on(self, sql_substring: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_statements
            .push((sql_substring.to_string(), message.to_string()));
        self
    }

    /// Applies `var = value` whenever a statement containing `sql_substring`
    /// executes successfully.
    pub fn with_execute_effect(self, sql_substring: &str, var: &str, value: &str) -> Self {
        self.state.lock().unwrap().execute_effects.push((
            sql_substring.to_string(),
            var.to_string(),
            value.to_string(),
        ));
        self
    }

    pub fn with_error_log(self, entries: Vec<ErrorLogEntry>) -> Self {
        self.state.lock().unwrap().error_log = Some(entries);
        self
    }

    /// Makes `read_error_log` fail as if the log could not be opened.
    pub fn with_unreadable_error_log(self) -> Self {
        self.state.lock().unwrap().error_log = None;
        self
    }

    pub fn ops(&self) -> Vec<ServerOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn sysvar(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().sysvars.get(name).cloned()
    }

    pub fn sysvars_snapshot(&self) -> HashMap<String, String> {
        self.state.lock().unwrap().sysvars.clone()
    }

    /// The `(name, value)` pairs of all recorded `Set` ops, in order.
    pub fn set_ops(&self) -> Vec<(String, String)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ServerOp::Set { name, value, .. } => Some((name, value)),
                _ => None,
            })
            .collect()
    }

    fn read_sysvar(&self, name: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(script) = state.sysvar_scripts.get_mut(name)
            && !script.is_empty()
        {
            return Some(script.remove(0));
        }
        state.sysvars.get(name).cloned()
    }
}

fn as_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("ON") || value.eq_ignore_ascii_case("true")
}

#[async_trait]
impl Instance for MockInstance {
    fn version(&self) -> Version {
        self.version
    }

    fn descr(&self) -> String {
        self.descr.clone()
    }

    async fn execute(&self, sql: &str) -> Result<(), ReplicoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some((_, message)) = state
            .failing_statements
            .iter()
            .find(|(substring, _)| sql.contains(substring.as_str()))
        {
            let message = message.clone();
            state.ops.push(ServerOp::Execute(sql.to_string()));
            return Err(ReplicoreError::Sql(message));
        }
        state.ops.push(ServerOp::Execute(sql.to_string()));
        let effects: Vec<(String, String)> = state
            .execute_effects
            .iter()
            .filter(|(substring, _, _)| sql.contains(substring.as_str()))
            .map(|(_, var, value)| (var.clone(), value.clone()))
            .collect();
        for (var, value) in effects {
            state.sysvars.insert(var, value);
        }
        Ok(())
    }

    async fn query_one(&self, sql: &str) -> Result<Option<Row>, ReplicoreError> {
        let state = self.state.lock().unwrap();
        for (substring, rows) in &state.query_results {
            if sql.contains(substring.as_str()) {
                return Ok(rows.first().cloned());
            }
        }
        if sql.contains("NOW(6)") {
            return Ok(Some(vec![Some("2026-01-01 00:00:00.000000".to_string())]));
        }
        Ok(None)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, ReplicoreError> {
        let state = self.state.lock().unwrap();
        for (substring, rows) in &state.query_results {
            if sql.contains(substring.as_str()) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    async fn get_sysvar_bool(
        &self,
        name: &str,
        _qualifier: VarQualifier,
    ) -> Result<Option<bool>, ReplicoreError> {
        Ok(self.read_sysvar(name).map(|value| as_bool(&value)))
    }

    async fn get_sysvar_int(
        &self,
        name: &str,
        _qualifier: VarQualifier,
    ) -> Result<Option<i64>, ReplicoreError> {
        match self.read_sysvar(name) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ReplicoreError::Sql(format!("'{name}' is not an integer"))),
            None => Ok(None),
        }
    }

    async fn get_sysvar_string(
        &self,
        name: &str,
        _qualifier: VarQualifier,
    ) -> Result<Option<String>, ReplicoreError> {
        Ok(self.read_sysvar(name))
    }

    async fn set_sysvar(
        &self,
        name: &str,
        value: &OptionValue,
        qualifier: VarQualifier,
    ) -> Result<(), ReplicoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some((_, message)) = state
            .failing_statements
            .iter()
            .find(|(substring, _)| name.contains(substring.as_str()))
        {
            return Err(ReplicoreError::Sql(message.clone()));
        }
        state.ops.push(ServerOp::Set {
            name: name.to_string(),
            value: value.to_string(),
            sql_value: value.as_sql(),
            qualifier,
        });
        if qualifier != VarQualifier::PersistOnly {
            state
                .sysvars
                .insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn set_sysvar_default(
        &self,
        name: &str,
        qualifier: VarQualifier,
    ) -> Result<(), ReplicoreError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(ServerOp::SetDefault {
            name: name.to_string(),
            qualifier,
        });
        state.sysvars.remove(name);
        Ok(())
    }

    async fn read_error_log(
        &self,
        since: &str,
        _subsystem: &str,
    ) -> Result<Vec<ErrorLogEntry>, ReplicoreError> {
        let state = self.state.lock().unwrap();
        match &state.error_log {
            Some(entries) => Ok(entries
                .iter()
                .filter(|entry| entry.logged.as_str() > since)
                .cloned()
                .collect()),
            None => Err(ReplicoreError::Sql("cannot open error log".to_string())),
        }
    }
}

/// In-memory [`OptionFile`], sharing its state with the test through `Arc`s
/// so it stays observable after moving into a `FileHandler`.
#[derive(Default, Clone)]
pub struct MemoryOptionFile {
    pub entries: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub flush_count: Arc<Mutex<u32>>,
}

impl MemoryOptionFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, name: &str) -> Option<Option<String>> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, value)| value.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn flushes(&self) -> u32 {
        *self.flush_count.lock().unwrap()
    }
}

#[async_trait]
impl OptionFile for MemoryOptionFile {
    fn set(&mut self, name: &str, value: Option<&str>) {
        let mut entries = self.entries.lock().unwrap();
        let value = value.map(str::to_string);
        if let Some(entry) = entries.iter_mut().find(|(entry_name, _)| entry_name == name) {
            entry.1 = value;
        } else {
            entries.push((name.to_string(), value));
        }
    }

    fn remove(&mut self, name: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|(entry_name, _)| entry_name != name);
    }

    async fn flush(&mut self) -> Result<(), ReplicoreError> {
        *self.flush_count.lock().unwrap() += 1;
        Ok(())
    }
}

/// Console double collecting `(level, message)` pairs.
#[derive(Default)]
pub struct RecordingConsole {
    pub messages: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: &'static str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }

    pub fn of_level(&self, level: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(message_level, _)| *message_level == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl Console for RecordingConsole {
    fn print_info(&self, message: &str) {
        self.push("info", message);
    }

    fn print_note(&self, message: &str) {
        self.push("note", message);
    }

    fn print_warning(&self, message: &str) {
        self.push("warning", message);
    }

    fn print_error(&self, message: &str) {
        self.push("error", message);
    }
}

/// A config aggregate with only the server handler registered.
pub fn server_config(instance: &Arc<MockInstance>, qualifier: VarQualifier) -> Config {
    let mut config = Config::new();
    config.add_server_handler(ServerHandler::new(instance.clone(), qualifier));
    config
}

/// A config aggregate with both handlers; returns the shared file state.
pub fn server_and_file_config(
    instance: &Arc<MockInstance>,
    qualifier: VarQualifier,
) -> (Config, MemoryOptionFile) {
    let mut config = server_config(instance, qualifier);
    let file = MemoryOptionFile::new();
    config.add_file_handler(FileHandler::new(Box::new(file.clone())));
    (config, file)
}

/// Asserts that `expected` `(name, value)` pairs appear as a subsequence of
/// the recorded `Set` ops.
pub fn assert_set_subsequence(instance: &MockInstance, expected: &[(&str, &str)]) {
    let sets = instance.set_ops();
    let mut position = 0;
    for (name, value) in expected {
        let found = sets[position..]
            .iter()
            .position(|(set_name, set_value)| set_name == name && set_value == value);
        match found {
            Some(offset) => position += offset + 1,
            None => panic!(
                "expected write {name}={value} not found (in order) in {sets:?}"
            ),
        }
    }
}
