// src/core/provision/mod.rs

//! The three lifecycle operations of a Group Replication member — bootstrap a
//! new group, join an existing one, leave it cleanly — plus the option-file
//! persistence pass used by local configuration. These compose the validator,
//! remediator and option programmer, drive the plugin, and enforce the
//! post-start invariants.

use crate::core::config::{Config, FILE_HANDLER_ID};
use crate::core::console::Console;
use crate::core::errors::ReplicoreError;
use crate::core::gr::{
    self, ACTION_DISABLE_SRO_IF_PRIMARY, APPLIER_CHANNEL, GroupReplicationOptions, MemberState,
    RECOVERY_CHANNEL, TopologyMode,
};
use crate::core::instance::{
    ErrorLogEntry, Instance, OptionValue, VarQualifier, quote_sql_string,
};
use crate::core::version::Version;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default deadline for `super_read_only` to clear after a bootstrap.
pub const READ_ONLY_TIMEOUT: Duration = Duration::from_secs(900);

/// Error-log subsystem the scraper filters on.
const REPL_SUBSYSTEM: &str = "Repl";

/// GR variables reset to their defaults when an instance leaves the group.
const LEAVE_RESET_VARS: &[&str] = &[
    "group_replication_bootstrap_group",
    "group_replication_group_seeds",
    "group_replication_local_address",
];

/// Bootstraps a new replication group on `instance`: programs all GR
/// variables, commits them, starts the plugin in bootstrap mode and waits for
/// `super_read_only` to clear once the instance becomes primary.
///
/// `multi_primary` of `None` leaves topology and auto-increment settings
/// untouched (e.g. a group reboot over existing settings).
pub async fn start_cluster(
    instance: &dyn Instance,
    gr_opts: &GroupReplicationOptions,
    multi_primary: Option<bool>,
    config: &mut Config,
    console: &dyn Console,
) -> Result<(), ReplicoreError> {
    // Persist super_read_only=1 so the server boots read-only if it restarts:
    // an instance known to the group metadata must never come up writable on
    // its own.
    config.set("super_read_only", OptionValue::Bool(true));

    if instance
        .get_sysvar_bool("offline_mode", VarQualifier::Global)
        .await?
        .unwrap_or(false)
    {
        info!("Disabling offline_mode on '{}'", instance.descr());
        config.set("offline_mode", OptionValue::Bool(false));
    }

    let single_primary_mode = multi_primary.map(|multi_primary| !multi_primary);

    gr::set_gr_options(instance, gr_opts, config, single_primary_mode, None, None).await?;

    if let Some(multi_primary) = multi_primary {
        let topology_mode = if multi_primary {
            TopologyMode::MultiPrimary
        } else {
            TopologyMode::SinglePrimary
        };
        debug!(
            "Setting auto-increment values for topology mode '{topology_mode}' and group size 1."
        );
        gr::update_auto_increment(config, topology_mode, 1).await?;
    }

    debug!("Applying configuration change to instance '{}'.", instance.descr());
    config.apply().await?;

    debug!("Starting Group Replication to bootstrap group...");
    checked_start_group_replication(instance, true, console).await?;

    wait_super_read_only_cleared(instance, READ_ONLY_TIMEOUT).await?;

    debug!(
        "Instance '{}' successfully started the Group Replication group.",
        instance.descr()
    );
    Ok(())
}

/// Joins `instance` to the group `peer_instance` is an ONLINE member of.
/// Group identity and topology are sourced from the peer; `cluster_size`,
/// when given, drives the auto-increment settings for a group one larger.
pub async fn join_cluster(
    instance: &dyn Instance,
    peer_instance: &dyn Instance,
    gr_opts: &GroupReplicationOptions,
    cluster_size: Option<u64>,
    config: &mut Config,
    console: &dyn Console,
) -> Result<(), ReplicoreError> {
    config.set("super_read_only", OptionValue::Bool(true));

    if instance
        .get_sysvar_bool("offline_mode", VarQualifier::Global)
        .await?
        .unwrap_or(false)
    {
        info!("Disabling offline_mode on '{}'", instance.descr());
        config.set("offline_mode", OptionValue::Bool(false));
    }

    debug!(
        "Getting information from peer instance '{}'.",
        peer_instance.descr()
    );
    let group_info = gr::get_group_information(peer_instance)
        .await?
        .ok_or_else(|| ReplicoreError::PeerNotMember {
            instance: instance.descr(),
            peer: peer_instance.descr(),
        })?;

    if group_info.member_state != MemberState::Online {
        return Err(ReplicoreError::PeerNotOnline {
            instance: instance.descr(),
            peer: peer_instance.descr(),
            state: group_info.member_state,
        });
    }

    let group_name = (!group_info.group_name.is_empty()).then_some(group_info.group_name.as_str());
    let view_change_uuid =
        (!group_info.view_change_uuid.is_empty()).then_some(group_info.view_change_uuid.as_str());
    gr::set_gr_options(
        instance,
        gr_opts,
        config,
        Some(group_info.single_primary),
        group_name,
        view_change_uuid,
    )
    .await?;

    if let Some(cluster_size) = cluster_size {
        let topology_mode = if group_info.single_primary {
            TopologyMode::SinglePrimary
        } else {
            TopologyMode::MultiPrimary
        };
        debug!(
            "Setting auto-increment values for topology mode '{topology_mode}' and group size {}.",
            cluster_size + 1
        );
        gr::update_auto_increment(config, topology_mode, cluster_size + 1).await?;
    }

    debug!("Applying configuration change to instance '{}'.", instance.descr());
    config.apply().await?;

    // The recovery user must be set after the configuration is committed but
    // before the plugin starts the state transfer.
    if let Some(credentials) = &gr_opts.recovery_credentials
        && !credentials.user.is_empty()
    {
        debug!(
            "Setting Group Replication recovery user to '{}'.",
            credentials.user
        );
        gr::change_replication_credentials(
            instance,
            RECOVERY_CHANNEL,
            &credentials.user,
            credentials.password.as_deref().unwrap_or(""),
        )
        .await?;
    }

    debug!("Starting Group Replication to join group...");
    checked_start_group_replication(instance, false, console).await?;

    debug!(
        "Instance '{}' successfully joined the Group Replication group.",
        instance.descr()
    );
    Ok(())
}

/// Cleanly removes `instance` from its group: stops the plugin if it is
/// running, optionally resets the GR replication channels and member actions,
/// and clears boot-time state so the instance cannot silently rejoin on
/// restart.
pub async fn leave_cluster(
    instance: &dyn Instance,
    reset_member_actions: bool,
    reset_repl_channels: bool,
    console: &dyn Console,
) -> Result<(), ReplicoreError> {
    let instance_address = instance.descr();

    // Only attempt the stop when the instance is an active member; stopping
    // an OFFLINE/MISSING member fails.
    let state = gr::get_member_state(instance).await?;
    if state != MemberState::Offline && state != MemberState::Missing {
        console.print_info(&format!(
            "* Instance '{instance_address}' is attempting to leave the cluster..."
        ));
        gr::stop_group_replication(instance).await?;
        let state = gr::get_member_state(instance).await?;
        debug!("Instance state after stopping Group Replication: {state}");
    } else {
        console.print_note(&format!(
            "The instance '{instance_address}' is {state}, Group Replication stop skipped."
        ));
    }

    if reset_repl_channels {
        let replica_term = gr::replica_keyword(instance.version());
        for channel in [APPLIER_CHANNEL, RECOVERY_CHANNEL] {
            instance
                .execute(&format!(
                    "RESET {replica_term} ALL FOR CHANNEL {}",
                    quote_sql_string(channel)
                ))
                .await?;
        }
    }

    debug!(
        "Disabling needed group replication variables after stopping Group Replication, using \
         SET PERSIST (if supported)"
    );
    if instance.version() >= Version::PERSIST_SUPPORT {
        instance
            .set_sysvar(
                "group_replication_start_on_boot",
                &OptionValue::Bool(false),
                VarQualifier::Persist,
            )
            .await?;

        // Must be OFF for the instance to be reusable in a single-primary
        // group; cannot be set to DEFAULT.
        instance
            .set_sysvar(
                "group_replication_enforce_update_everywhere_checks",
                &OptionValue::Bool(false),
                VarQualifier::Persist,
            )
            .await?;

        for gr_var in LEAVE_RESET_VARS {
            instance
                .set_sysvar_default(gr_var, VarQualifier::Persist)
                .await?;
        }

        let persist_load = instance
            .get_sysvar_bool("persisted_globals_load", VarQualifier::Global)
            .await?
            .unwrap_or(false);
        if !persist_load {
            console.print_warning(&format!(
                "On instance '{instance_address}' the persisted cluster configuration will not \
                 be loaded upon reboot since 'persisted-globals-load' is set to 'OFF'. Please \
                 set 'persisted-globals-load' to 'ON' on the configuration file or set the \
                 'group_replication_start_on_boot' variable to 'OFF' in the server \
                 configuration file, otherwise it might rejoin the cluster upon restart."
            ));
        }
    } else {
        console.print_warning(&format!(
            "On instance '{instance_address}' configuration cannot be persisted since MySQL \
             version {} does not support the SET PERSIST command (MySQL version >= {} \
             required). Please set the 'group_replication_start_on_boot' variable to 'OFF' in \
             the server configuration file, otherwise it might rejoin the cluster upon restart.",
            instance.version(),
            Version::PERSIST_SUPPORT
        ));
    }

    // Member actions may have been changed while the instance belonged to a
    // cluster set; restore the defaults.
    if reset_member_actions
        && let Err(e) = gr::reset_member_actions(instance).await
    {
        error!(
            "Error resetting Group Replication member actions at {}: {e}",
            instance.descr()
        );
        return Err(e);
    }

    Ok(())
}

/// Re-emits every live `group_replication_%` variable into the option file so
/// the configuration survives restarts on servers that cannot persist. The
/// `loose_` prefix keeps the server bootable even when the plugin is not
/// loaded at startup.
pub async fn persist_gr_configurations(
    instance: &dyn Instance,
    config: &mut Config,
) -> Result<(), ReplicoreError> {
    if !config.has_handler(FILE_HANDLER_ID) {
        return Err(ReplicoreError::InvariantViolated(
            "configuration has no option file handler".to_string(),
        ));
    }

    debug!("Get all group replication configurations.");
    let gr_configurations = gr::get_all_configurations(instance).await?;

    debug!("Set all group replication configurations to be applied.");
    for (name, value) in gr_configurations {
        let option_name = if name
            .to_ascii_lowercase()
            .starts_with("group_replication_")
        {
            format!("loose_{name}")
        } else {
            name
        };
        let value = match value {
            Some(value) => OptionValue::Text(value),
            None => OptionValue::Default,
        };
        config.set_for_handler(&option_name, value, FILE_HANDLER_ID)?;
    }

    // The live group seeds may be newer than what the enumeration saw.
    let group_seeds = instance
        .get_sysvar_string("group_replication_group_seeds", VarQualifier::Global)
        .await?;
    config.set(
        "group_replication_group_seeds",
        match group_seeds {
            Some(group_seeds) => OptionValue::Text(group_seeds),
            None => OptionValue::Default,
        },
    );

    debug!("Apply group replication configurations (write to file).");
    config.apply().await
}

/// Starts the plugin with the error-log scrape wrapped around it: on failure,
/// entries logged by the `Repl` subsystem after the captured start timestamp
/// are surfaced to the console and returned inside the error.
async fn checked_start_group_replication(
    instance: &dyn Instance,
    bootstrap: bool,
    console: &dyn Console,
) -> Result<(), ReplicoreError> {
    // NOTE: creating and setting the recovery user must happen after the
    // group is bootstrapped so all transactions carry the group UUID.
    let before_time = instance
        .query_one("SELECT NOW(6)")
        .await?
        .and_then(|row| row.into_iter().next().flatten())
        .unwrap_or_default();

    match gr::start_group_replication(instance, bootstrap).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let log_entries = report_gr_start_error(instance, &before_time, console).await;
            Err(ReplicoreError::GroupReplicationStartFailed {
                message: e.to_string(),
                log_entries,
            })
        }
    }
}

/// Prints the error-log entries explaining a failed plugin start behind a
/// single banner header. Falls back to a pointer at the error log when it
/// cannot be read.
async fn report_gr_start_error(
    instance: &dyn Instance,
    before_time: &str,
    console: &dyn Console,
) -> Vec<ErrorLogEntry> {
    match instance.read_error_log(before_time, REPL_SUBSYSTEM).await {
        Ok(entries) => {
            let mut first = true;
            for entry in &entries {
                if first {
                    console.print_error(&format!(
                        "Unable to start Group Replication for instance '{}'.",
                        instance.descr()
                    ));
                    console.print_info("The MySQL error_log contains the following messages:");
                    first = false;
                }
                console.print_info(&format!(
                    "  {} [{}] [{}] {}",
                    entry.logged, entry.prio, entry.error_code, entry.data
                ));
            }
            entries
        }
        Err(_) => {
            console.print_error(&format!(
                "Unable to start Group Replication for instance '{}'. Please check the MySQL \
                 server error log for more information.",
                instance.descr()
            ));
            Vec::new()
        }
    }
}

/// Waits for `super_read_only` to be cleared by the plugin once this instance
/// becomes primary, polling once per second up to `timeout`.
///
/// On 8.0.26+ the wait is skipped entirely when the
/// `mysql_disable_super_read_only_if_primary` member action is disabled: the
/// plugin will never clear the flag, and that is a deliberate configuration,
/// not a failure.
pub async fn wait_super_read_only_cleared(
    instance: &dyn Instance,
    timeout: Duration,
) -> Result<(), ReplicoreError> {
    let mut read_only = instance
        .get_sysvar_bool("super_read_only", VarQualifier::Global)
        .await?
        .unwrap_or(false);
    if !read_only {
        return Ok(());
    }

    if instance.version() >= Version::new(8, 0, 26) {
        let auto_clears = match gr::get_member_action_status(
            instance,
            ACTION_DISABLE_SRO_IF_PRIMARY,
        )
        .await
        {
            Ok(Some(enabled)) => enabled,
            _ => true,
        };
        if !auto_clears {
            debug!(
                "Skipping super_read_only wait at {} because member action is disabled",
                instance.descr()
            );
            return Ok(());
        }
    }

    debug!(
        "Waiting for super_read_only to get cleared at {}",
        instance.descr()
    );
    let mut waited = Duration::ZERO;
    while read_only && waited < timeout {
        tokio::time::sleep(Duration::from_secs(1)).await;
        waited += Duration::from_secs(1);
        read_only = instance
            .get_sysvar_bool("super_read_only", VarQualifier::Global)
            .await?
            .unwrap_or(false);
    }
    if read_only {
        return Err(ReplicoreError::ReadyTimeout);
    }
    Ok(())
}
