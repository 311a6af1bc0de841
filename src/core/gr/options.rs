// src/core/gr/options.rs

//! Programming of the GR plugin variables from a caller intent. All writes go
//! through the config aggregate in one fixed order; the caller commits them
//! with `apply()`.

use crate::core::config::Config;
use crate::core::errors::ReplicoreError;
use crate::core::instance::{Instance, OptionValue, VarQualifier};
use crate::core::version::Version;
use strum_macros::{Display, EnumString};
use tracing::debug;

/// SSL mode of the group, as resolved by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterSslMode {
    Disabled,
    Required,
    VerifyCa,
    VerifyIdentity,
    #[default]
    Auto,
}

/// Credentials for the recovery channel of a joining member.
#[derive(Debug, Clone)]
pub struct RecoveryCredentials {
    pub user: String,
    pub password: Option<String>,
}

/// Caller intent for the GR plugin variables. Every `None` field means "do
/// not touch"; unset is never collapsed with a type's zero value.
#[derive(Debug, Clone, Default)]
pub struct GroupReplicationOptions {
    pub group_name: Option<String>,
    pub view_change_uuid: Option<String>,
    pub ssl_mode: ClusterSslMode,
    pub local_address: Option<String>,
    pub group_seeds: Option<String>,
    pub ip_allowlist: Option<String>,
    pub exit_state_action: Option<String>,
    pub member_weight: Option<i64>,
    pub consistency: Option<String>,
    pub expel_timeout: Option<i64>,
    pub auto_rejoin_tries: Option<i64>,
    pub manual_start_on_boot: Option<bool>,
    pub communication_stack: Option<String>,
    pub transaction_size_limit: Option<i64>,
    pub recovery_credentials: Option<RecoveryCredentials>,
}

/// The server SSL variables copied into the recovery channel for VERIFY_CA /
/// VERIFY_IDENTITY, paired with their recovery-side option.
const RECOVERY_SSL_VARS: &[(&str, &str)] = &[
    ("ssl_ca", "group_replication_recovery_ssl_ca"),
    ("ssl_capath", "group_replication_recovery_ssl_capath"),
    ("ssl_cert", "group_replication_recovery_ssl_cert"),
    ("ssl_cipher", "group_replication_recovery_ssl_cipher"),
    ("ssl_crl", "group_replication_recovery_ssl_crl"),
    ("ssl_crlpath", "group_replication_recovery_ssl_crlpath"),
    ("ssl_key", "group_replication_recovery_ssl_key"),
];

/// Options that accept either a label or a numeric index. A numeric string
/// must reach the SQL layer as an integer or the SET fails.
fn set_indexable_option(config: &mut Config, name: &str, value: &str) {
    match value.parse::<i64>() {
        Ok(index) => config.set(name, OptionValue::Int(index)),
        Err(_) => config.set(name, OptionValue::Text(value.to_string())),
    }
}

/// Writes all GR plugin variables for `gr_opts` through `config`.
///
/// `group_name` and `view_change_uuid` override the intent when given (the
/// join path sources them from the peer). `single_primary_mode` of `None`
/// leaves the topology untouched. The write order is a protocol requirement,
/// not a style choice: the plugin rejects topology toggles applied out of
/// order. Does not call `apply()`; the orchestrator does.
pub async fn set_gr_options(
    instance: &dyn Instance,
    gr_opts: &GroupReplicationOptions,
    config: &mut Config,
    single_primary_mode: Option<bool>,
    group_name: Option<&str>,
    view_change_uuid: Option<&str>,
) -> Result<(), ReplicoreError> {
    let version = instance.version();

    // Group name: from the peer (join) or from the intent (bootstrap).
    if let Some(group_name) = group_name {
        config.set(
            "group_replication_group_name",
            OptionValue::Text(group_name.to_string()),
        );
    } else if let Some(group_name) = &gr_opts.group_name {
        config.set(
            "group_replication_group_name",
            OptionValue::Text(group_name.clone()),
        );
    }

    if let Some(view_change_uuid) = view_change_uuid {
        config.set(
            "group_replication_view_change_uuid",
            OptionValue::Text(view_change_uuid.to_string()),
        );
    } else if let Some(view_change_uuid) = &gr_opts.view_change_uuid {
        config.set(
            "group_replication_view_change_uuid",
            OptionValue::Text(view_change_uuid.clone()),
        );
    }

    // Topology toggles. Order matters: enforce_update_everywhere_checks must
    // already be OFF when single_primary_mode goes ON, and vice versa.
    if let Some(single_primary) = single_primary_mode {
        if single_primary {
            config.set(
                "group_replication_enforce_update_everywhere_checks",
                OptionValue::Bool(false),
            );
            config.set(
                "group_replication_single_primary_mode",
                OptionValue::Bool(true),
            );
        } else {
            config.set(
                "group_replication_single_primary_mode",
                OptionValue::Bool(false),
            );
            config.set(
                "group_replication_enforce_update_everywhere_checks",
                OptionValue::Bool(true),
            );
        }
    }

    // SSL block.
    if gr_opts.ssl_mode == ClusterSslMode::Disabled {
        if version >= Version::new(8, 0, 5) {
            // Required to connect with caching_sha2_password without SSL.
            debug!("Enable 'group_replication_recovery_get_public_key'.");
            config.set(
                "group_replication_recovery_get_public_key",
                OptionValue::Bool(true),
            );
        }
        config.set("group_replication_recovery_use_ssl", OptionValue::Bool(false));
    } else {
        config.set("group_replication_recovery_use_ssl", OptionValue::Bool(true));

        if matches!(
            gr_opts.ssl_mode,
            ClusterSslMode::VerifyCa | ClusterSslMode::VerifyIdentity
        ) {
            // The recovery channel must use the same SSL material as the
            // server itself, regardless of the communication stack.
            for (server_var, recovery_var) in RECOVERY_SSL_VARS {
                let value = instance
                    .get_sysvar_string(server_var, VarQualifier::Global)
                    .await?
                    .unwrap_or_default();
                config.set(recovery_var, OptionValue::Text(value));
            }
        } else {
            // Reset to defaults in case the options were already set or
            // persisted with different values.
            for (_, recovery_var) in RECOVERY_SSL_VARS {
                instance
                    .set_sysvar_default(recovery_var, VarQualifier::Global)
                    .await?;
            }
        }
    }
    config.set(
        "group_replication_ssl_mode",
        OptionValue::Text(gr_opts.ssl_mode.to_string()),
    );

    // Network identity, as resolved by the caller.
    if let Some(local_address) = &gr_opts.local_address {
        config.set(
            "group_replication_local_address",
            OptionValue::Text(local_address.clone()),
        );
    }

    if let Some(group_seeds) = &gr_opts.group_seeds {
        config.set(
            "group_replication_group_seeds",
            OptionValue::Text(group_seeds.clone()),
        );
    }

    if let Some(ip_allowlist) = &gr_opts.ip_allowlist {
        let option_name = if version < Version::new(8, 0, 22) {
            "group_replication_ip_whitelist"
        } else {
            "group_replication_ip_allowlist"
        };
        config.set(option_name, OptionValue::Text(ip_allowlist.clone()));
    }

    if let Some(exit_state_action) = &gr_opts.exit_state_action {
        set_indexable_option(config, "group_replication_exit_state_action", exit_state_action);
    }

    if let Some(member_weight) = gr_opts.member_weight {
        config.set(
            "group_replication_member_weight",
            OptionValue::Int(member_weight),
        );
    }

    if let Some(consistency) = &gr_opts.consistency {
        set_indexable_option(config, "group_replication_consistency", consistency);
    }

    if let Some(expel_timeout) = gr_opts.expel_timeout {
        config.set(
            "group_replication_member_expel_timeout",
            OptionValue::Int(expel_timeout),
        );
    }

    if let Some(auto_rejoin_tries) = gr_opts.auto_rejoin_tries {
        config.set(
            "group_replication_autorejoin_tries",
            OptionValue::Int(auto_rejoin_tries),
        );
    }

    if let Some(communication_stack) = &gr_opts.communication_stack {
        config.set(
            "group_replication_communication_stack",
            OptionValue::Text(communication_stack.clone()),
        );
    }

    if let Some(transaction_size_limit) = gr_opts.transaction_size_limit {
        config.set(
            "group_replication_transaction_size_limit",
            OptionValue::Int(transaction_size_limit),
        );
    }

    // Start on boot unless the caller asked for manual starts.
    config.set(
        "group_replication_start_on_boot",
        OptionValue::Bool(!gr_opts.manual_start_on_boot.unwrap_or(false)),
    );

    Ok(())
}
