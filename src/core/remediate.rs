// src/core/remediate.rs

//! Configuration remediation: consumes the ordered invalid-config list and
//! applies each fix through the config aggregate, honoring read-only,
//! deprecation and persistability constraints. List order is preserved all
//! the way to the server.

use crate::core::checks::{ConfigType, InvalidConfig, NO_VALUE, VALUE_NOT_SET, ValueType};
use crate::core::config::{Config, FILE_HANDLER_ID, SERVER_HANDLER_ID};
use crate::core::errors::ReplicoreError;
use crate::core::gr::replication_option_keyword;
use crate::core::instance::{OptionValue, VarQualifier};
use crate::core::version::Version;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Read-only variables: changed with `SET PERSIST_ONLY` where supported,
/// never with a plain `SET`.
const READ_ONLY_CFGS: &[&str] = &[
    "enforce_gtid_consistency",
    "log_slave_updates",
    "gtid_mode",
    "master_info_repository",
    "relay_log_info_repository",
    "transaction_write_set_extraction",
    "server_id",
];

/// Options with no corresponding live system variable.
const ONLY_OPT_FILE_CFGS: &[&str] = &["log_bin"];

/// Deprecated variables: never SET on the live server (the file is fine).
const DEPRECATED_CFGS: &[&str] = &["master_info_repository", "relay_log_info_repository"];

/// Options whose persisted-journal timestamp must be distinct from the next
/// write's; `enforce_gtid_consistency` has to precede `gtid_mode` there.
const PERSIST_DELAY_CFGS: &[&str] = &["enforce_gtid_consistency"];

/// Generates a fresh random server id in `[1, 2^32 - 1]`.
pub fn generate_server_id() -> u32 {
    rand::thread_rng().gen_range(1..=u32::MAX)
}

fn typed_value(required_val: &str, val_type: ValueType) -> Result<OptionValue, ReplicoreError> {
    match val_type {
        ValueType::Integer => required_val
            .parse::<i64>()
            .map(OptionValue::Int)
            .map_err(|_| {
                ReplicoreError::InvariantViolated(format!(
                    "required value '{required_val}' is not an integer"
                ))
            }),
        ValueType::Bool => match required_val.to_ascii_uppercase().as_str() {
            "ON" | "1" | "TRUE" => Ok(OptionValue::Bool(true)),
            "OFF" | "0" | "FALSE" => Ok(OptionValue::Bool(false)),
            _ => Err(ReplicoreError::InvariantViolated(format!(
                "required value '{required_val}' is not a boolean"
            ))),
        },
        ValueType::Text => Ok(OptionValue::Text(required_val.to_string())),
    }
}

/// Applies fixes for `invalid_configs` in list order through `config` and
/// commits them with a single `apply()`. Returns whether any fix requires a
/// server restart to take effect.
pub async fn configure_instance(
    config: &mut Config,
    invalid_configs: &[InvalidConfig],
    version: Version,
) -> Result<bool, ReplicoreError> {
    if !config.has_handler(SERVER_HANDLER_ID) {
        return Err(ReplicoreError::InvariantViolated(
            "configuration has no server handler".to_string(),
        ));
    }

    let mut read_only_cfgs: Vec<String> =
        READ_ONLY_CFGS.iter().map(|name| name.to_string()).collect();
    if version >= Version::new(8, 0, 26) {
        read_only_cfgs.push(replication_option_keyword(version, "log_slave_updates"));
    }

    let use_set_persist =
        config.server_default_qualifier() == Some(VarQualifier::Persist);
    if use_set_persist {
        debug!("Server variables will be changed using SET PERSIST/PERSIST_ONLY.");
    }

    let mut need_restart = false;
    for invalid_config in invalid_configs {
        if invalid_config.restart {
            need_restart = true;
        }

        let mut required_val = invalid_config.required_val.clone();
        if invalid_config.var_name == "server_id" && required_val.is_empty() {
            required_val = generate_server_id().to_string();
        }

        let only_opt_file = ONLY_OPT_FILE_CFGS.contains(&invalid_config.var_name.as_str());
        let read_only = read_only_cfgs
            .iter()
            .any(|name| *name == invalid_config.var_name);
        let deprecated = DEPRECATED_CFGS.contains(&invalid_config.var_name.as_str());

        // Workaround for order-sensitive persisted variables: wait 1 ms after
        // the SET PERSIST so the journal timestamps stay distinct.
        let delay = if use_set_persist
            && PERSIST_DELAY_CFGS.contains(&invalid_config.var_name.as_str())
        {
            Duration::from_millis(1)
        } else {
            Duration::ZERO
        };

        if invalid_config.types.contains(ConfigType::SERVER) && !only_opt_file {
            let keyword = replication_option_keyword(version, &invalid_config.var_name);
            if use_set_persist && read_only && !deprecated {
                let value = typed_value(&required_val, invalid_config.val_type)?;
                config
                    .server_handler()
                    .expect("server handler presence checked above")
                    .set_with_qualifier(&keyword, value, VarQualifier::PersistOnly, delay);
            } else if !read_only && !deprecated {
                let value = typed_value(&required_val, invalid_config.val_type)?;
                config.set_for_handler(&keyword, value, SERVER_HANDLER_ID)?;
            }
        }

        if invalid_config.types.contains(ConfigType::CONFIG)
            && config.has_handler(FILE_HANDLER_ID)
        {
            let file_handler = config
                .file_handler()
                .expect("file handler presence checked above");
            if required_val == VALUE_NOT_SET {
                // Only disabling options such as skip_log_bin end up here;
                // they have no value to rewrite, the key must go away.
                file_handler.remove(&invalid_config.var_name);
            } else if required_val == NO_VALUE {
                file_handler.set(&invalid_config.var_name, None);
            } else {
                file_handler.set(&invalid_config.var_name, Some(required_val.clone()));
            }
        }
    }

    debug!("Applying changes for all variables previously set.");
    config.apply().await?;

    Ok(need_restart)
}
