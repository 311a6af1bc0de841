// src/core/instance.rs

//! The server-session capability consumed by the core: execute SQL, read and
//! write system variables, read the error log. Sessions are owned by the
//! caller; the core never opens or closes them.

use crate::core::errors::ReplicoreError;
use crate::core::version::Version;
use async_trait::async_trait;
use std::fmt;

/// How a system-variable read or write is scoped on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarQualifier {
    Session,
    Global,
    /// Durable write: takes effect immediately and survives restart.
    Persist,
    /// Durable write for read-only variables: recorded in the persisted-config
    /// journal only, takes effect at next boot.
    PersistOnly,
}

impl VarQualifier {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            VarQualifier::Session => "SESSION",
            VarQualifier::Global => "GLOBAL",
            VarQualifier::Persist => "PERSIST",
            VarQualifier::PersistOnly => "PERSIST_ONLY",
        }
    }
}

/// A typed system-variable value. Integers must reach the SQL layer unquoted,
/// so the type tag travels with the value instead of being flattened to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
    /// Restore the server default, or write a bare key in an option file.
    Default,
}

impl OptionValue {
    /// The value as it appears on the right-hand side of a `SET` statement.
    pub fn as_sql(&self) -> String {
        match self {
            OptionValue::Bool(true) => "ON".to_string(),
            OptionValue::Bool(false) => "OFF".to_string(),
            OptionValue::Int(i) => i.to_string(),
            OptionValue::Text(s) => quote_sql_string(s),
            OptionValue::Default => "DEFAULT".to_string(),
        }
    }

    /// The value as it appears in an option file; `None` means a bare key.
    pub fn as_file_value(&self) -> Option<String> {
        match self {
            OptionValue::Bool(true) => Some("ON".to_string()),
            OptionValue::Bool(false) => Some("OFF".to_string()),
            OptionValue::Int(i) => Some(i.to_string()),
            OptionValue::Text(s) => Some(s.clone()),
            OptionValue::Default => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(true) => write!(f, "ON"),
            OptionValue::Bool(false) => write!(f, "OFF"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Text(s) => write!(f, "{s}"),
            OptionValue::Default => write!(f, "DEFAULT"),
        }
    }
}

/// One entry from the server error log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogEntry {
    /// Timestamp the server logged the entry at, in `NOW(6)` format.
    pub logged: String,
    pub prio: String,
    pub error_code: String,
    pub data: String,
}

/// A single result row; columns are `None` for SQL NULL.
pub type Row = Vec<Option<String>>;

/// Capability handle over one server session.
///
/// Implementations surface transport and server errors as
/// [`ReplicoreError::Sql`]; the core propagates them untouched except where a
/// component explicitly states otherwise.
#[async_trait]
pub trait Instance: Send + Sync {
    /// Server version of the connected instance.
    fn version(&self) -> Version;

    /// URI-style description of the connection, for messages and logs.
    fn descr(&self) -> String;

    async fn execute(&self, sql: &str) -> Result<(), ReplicoreError>;

    /// Runs a query expected to return at most one row.
    async fn query_one(&self, sql: &str) -> Result<Option<Row>, ReplicoreError>;

    /// Runs a query returning any number of rows.
    async fn query(&self, sql: &str) -> Result<Vec<Row>, ReplicoreError>;

    async fn get_sysvar_bool(
        &self,
        name: &str,
        qualifier: VarQualifier,
    ) -> Result<Option<bool>, ReplicoreError>;

    async fn get_sysvar_int(
        &self,
        name: &str,
        qualifier: VarQualifier,
    ) -> Result<Option<i64>, ReplicoreError>;

    async fn get_sysvar_string(
        &self,
        name: &str,
        qualifier: VarQualifier,
    ) -> Result<Option<String>, ReplicoreError>;

    async fn set_sysvar(
        &self,
        name: &str,
        value: &OptionValue,
        qualifier: VarQualifier,
    ) -> Result<(), ReplicoreError>;

    /// Restores a system variable to its compiled-in default.
    async fn set_sysvar_default(
        &self,
        name: &str,
        qualifier: VarQualifier,
    ) -> Result<(), ReplicoreError>;

    /// Reads error-log entries for one subsystem, strictly newer than
    /// `since`. An `Err` means the log could not be opened at all.
    async fn read_error_log(
        &self,
        since: &str,
        subsystem: &str,
    ) -> Result<Vec<ErrorLogEntry>, ReplicoreError>;
}

/// Quotes a string as a SQL literal, escaping quotes and backslashes.
pub fn quote_sql_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
