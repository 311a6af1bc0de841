// src/core/checks.rs

//! Configuration validation: compares a running server against the
//! invariants its cluster type requires and emits an ordered list of
//! invalid-config records. The order is load-bearing: the remediator applies
//! fixes in list order, and some variables must be set before others
//! (`enforce_gtid_consistency` before `gtid_mode`).

use crate::core::config::{Config, FILE_HANDLER_ID};
use crate::core::errors::ReplicoreError;
use crate::core::gr::replication_option_keyword;
use crate::core::instance::{Instance, VarQualifier};
use crate::core::version::Version;
use bitflags::bitflags;
use strum_macros::Display;
use tracing::debug;

/// Sentinel for "remove this option from the option file".
pub const VALUE_NOT_SET: &str = "<not set>";

/// Sentinel for "write this option with an empty value".
pub const NO_VALUE: &str = "<no value>";

bitflags! {
    /// Where a configuration fix must land.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigType: u8 {
        /// Fix applies to the live server.
        const SERVER = 1 << 0;
        /// Fix applies to the option file.
        const CONFIG = 1 << 1;
        /// Fix cannot land anywhere writable without a server restart.
        const RESTART_ONLY = 1 << 2;
    }
}

/// Type tag of an invalid-config value, so integer options are emitted as
/// integers at the SQL layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Text,
    Bool,
}

/// One configuration discrepancy, as produced by [`check_instance_config`].
/// `var_name` is the logical, pre-rename option identifier; the remediator
/// applies version-specific aliasing when it writes to the server.
#[derive(Debug, Clone)]
pub struct InvalidConfig {
    pub var_name: String,
    pub current_val: String,
    pub required_val: String,
    pub val_type: ValueType,
    pub types: ConfigType,
    pub restart: bool,
}

impl InvalidConfig {
    fn new(
        var_name: &str,
        current_val: impl Into<String>,
        required_val: impl Into<String>,
        val_type: ValueType,
        types: ConfigType,
        restart: bool,
    ) -> Self {
        Self {
            var_name: var_name.to_string(),
            current_val: current_val.into(),
            required_val: required_val.into(),
            val_type,
            types,
            restart,
        }
    }
}

/// What kind of replication setup a server is being validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterType {
    GroupReplication,
    AsyncReplication,
}

/// Validates `server_id`: must be nonzero and, when the caller supplies the
/// ids already used in the group, unique among them. An empty `required_val`
/// tells the remediator to generate a fresh value.
async fn check_server_id(
    instance: &dyn Instance,
    group_server_ids: &[u32],
    out: &mut Vec<InvalidConfig>,
) -> Result<(), ReplicoreError> {
    let server_id = instance
        .get_sysvar_int("server_id", VarQualifier::Global)
        .await?
        .unwrap_or(0);

    let conflicting = group_server_ids.iter().any(|id| i64::from(*id) == server_id);
    if server_id == 0 || conflicting {
        out.push(InvalidConfig::new(
            "server_id",
            server_id.to_string(),
            "",
            ValueType::Integer,
            ConfigType::SERVER,
            true,
        ));
    }
    Ok(())
}

/// Validates that binary logging is enabled. `log_bin` cannot be toggled on
/// the live server, so records produced here never carry `SERVER` alone: the
/// fix lands in the option file when one is attached, and is restart-only
/// otherwise. Disabling options (`skip_log_bin`, `disable_log_bin`) are
/// scheduled for removal from the file either way.
async fn check_log_bin(
    instance: &dyn Instance,
    config: &Config,
    out: &mut Vec<InvalidConfig>,
) -> Result<(), ReplicoreError> {
    let log_bin = instance
        .get_sysvar_bool("log_bin", VarQualifier::Global)
        .await?
        .unwrap_or(false);
    if log_bin {
        return Ok(());
    }

    // Toggling log_bin always takes a restart; with an option file attached
    // the new value can at least be staged there.
    let fixable = if config.has_handler(FILE_HANDLER_ID) {
        ConfigType::RESTART_ONLY | ConfigType::CONFIG
    } else {
        ConfigType::RESTART_ONLY
    };
    out.push(InvalidConfig::new(
        "log_bin",
        "OFF",
        NO_VALUE,
        ValueType::Text,
        fixable,
        true,
    ));
    for disabling_opt in ["skip_log_bin", "disable_log_bin"] {
        out.push(InvalidConfig::new(
            disabling_opt,
            NO_VALUE,
            VALUE_NOT_SET,
            ValueType::Text,
            ConfigType::CONFIG,
            true,
        ));
    }
    Ok(())
}

/// Validates the replication system variables required by the cluster type.
/// Records are appended in dependency order.
async fn check_server_variables(
    instance: &dyn Instance,
    cluster_type: ClusterType,
    out: &mut Vec<InvalidConfig>,
) -> Result<(), ReplicoreError> {
    let version = instance.version();

    let mut requirements: Vec<(&str, &str, ValueType)> = vec![
        // Must precede gtid_mode; the remediator preserves this order.
        ("enforce_gtid_consistency", "ON", ValueType::Bool),
        ("gtid_mode", "ON", ValueType::Bool),
        ("log_slave_updates", "ON", ValueType::Bool),
    ];

    // Deprecated from 8.0.23 (defaults already TABLE); only validated below.
    if version < Version::new(8, 0, 23) {
        requirements.push(("master_info_repository", "TABLE", ValueType::Text));
        requirements.push(("relay_log_info_repository", "TABLE", ValueType::Text));
    }

    // Required by the GR certifier; removed in 8.3.0.
    if cluster_type == ClusterType::GroupReplication && version < Version::new(8, 3, 0) {
        requirements.push((
            "transaction_write_set_extraction",
            "XXHASH64",
            ValueType::Text,
        ));
    }

    for (name, required, val_type) in requirements {
        // Read under the version's spelling; report under the logical name.
        let live_name = replication_option_keyword(version, name);
        let current = instance
            .get_sysvar_string(&live_name, VarQualifier::Global)
            .await?;

        let matches = match &current {
            Some(value) => value.eq_ignore_ascii_case(required),
            None => false,
        };
        if !matches {
            out.push(InvalidConfig::new(
                name,
                current.unwrap_or_else(|| VALUE_NOT_SET.to_string()),
                required,
                val_type,
                ConfigType::SERVER,
                true,
            ));
        }
    }
    Ok(())
}

/// Compares the instance configuration against the invariants required by
/// `cluster_type` and returns the ordered invalid-config list.
///
/// When the server handler cannot persist (`default qualifier != PERSIST`)
/// and a file handler is attached, every record is additionally marked
/// `CONFIG`: read-only variables must land in the option file to survive a
/// restart. Without a file handler the list is returned unescalated.
pub async fn check_instance_config(
    instance: &dyn Instance,
    config: &Config,
    cluster_type: ClusterType,
    group_server_ids: &[u32],
) -> Result<Vec<InvalidConfig>, ReplicoreError> {
    let mut invalid_configs = Vec::new();

    check_server_id(instance, group_server_ids, &mut invalid_configs).await?;
    check_log_bin(instance, config, &mut invalid_configs).await?;
    check_server_variables(instance, cluster_type, &mut invalid_configs).await?;

    let cannot_persist = match config.server_default_qualifier() {
        Some(qualifier) => qualifier != VarQualifier::Persist,
        None => {
            return Err(ReplicoreError::InvariantViolated(
                "configuration has no server handler".to_string(),
            ));
        }
    };

    if cannot_persist && config.has_handler(FILE_HANDLER_ID) {
        debug!(
            "Server cannot persist variables; escalating all {} invalid configuration(s) to the \
             option file.",
            invalid_configs.len()
        );
        for invalid_config in &mut invalid_configs {
            invalid_config.types |= ConfigType::CONFIG;
        }
    }

    for invalid_config in &invalid_configs {
        debug_assert!(
            invalid_config.var_name != "log_bin"
                || invalid_config
                    .types
                    .intersects(ConfigType::CONFIG | ConfigType::RESTART_ONLY),
            "log_bin cannot be fixed on the live server"
        );
    }

    Ok(invalid_configs)
}
