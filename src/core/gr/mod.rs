// src/core/gr/mod.rs

//! Group Replication plugin control and group introspection: start/stop the
//! plugin, query member state, member actions, auto-increment policy, and the
//! version-dependent replication vocabulary.

pub mod options;

pub use options::{ClusterSslMode, GroupReplicationOptions, RecoveryCredentials, set_gr_options};

use crate::core::config::Config;
use crate::core::errors::ReplicoreError;
use crate::core::instance::{Instance, OptionValue, VarQualifier, quote_sql_string};
use crate::core::version::Version;
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};
use tracing::debug;

/// The internal replication channel a joining member catches up through.
pub const RECOVERY_CHANNEL: &str = "group_replication_recovery";

/// The channel the plugin applies group transactions through.
pub const APPLIER_CHANNEL: &str = "group_replication_applier";

/// Member action that clears `super_read_only` when an instance becomes
/// primary.
pub const ACTION_DISABLE_SRO_IF_PRIMARY: &str = "mysql_disable_super_read_only_if_primary";

/// State of a member as reported by the group membership table. `Missing`
/// means the instance is not listed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberState {
    Online,
    Recovering,
    Offline,
    Error,
    Unreachable,
    Missing,
}

/// Write topology of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologyMode {
    SinglePrimary,
    MultiPrimary,
}

/// Group facts read from a peer in one query.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub member_state: MemberState,
    pub group_name: String,
    pub view_change_uuid: String,
    pub single_primary: bool,
}

/// Returns the version-correct spelling of a replication option: `replica_*`
/// forms on 8.0.26 and later, legacy `slave_*` forms below.
pub fn replication_option_keyword(version: Version, name: &str) -> String {
    if version >= Version::new(8, 0, 26) {
        name.replace("slave", "replica")
    } else {
        name.to_string()
    }
}

/// The replication object keyword for statements such as `RESET ... ALL`.
pub fn replica_keyword(version: Version) -> &'static str {
    if version >= Version::new(8, 0, 22) {
        "REPLICA"
    } else {
        "SLAVE"
    }
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("ON") || value.eq_ignore_ascii_case("true")
}

/// Starts the GR plugin. In bootstrap mode the instance declares itself the
/// seed of a new group; `group_replication_bootstrap_group` is raised for the
/// duration of the start and always lowered again, even when the start fails.
pub async fn start_group_replication(
    instance: &dyn Instance,
    bootstrap: bool,
) -> Result<(), ReplicoreError> {
    if bootstrap {
        instance
            .set_sysvar(
                "group_replication_bootstrap_group",
                &OptionValue::Bool(true),
                VarQualifier::Global,
            )
            .await?;
    }

    let start_result = instance.execute("START GROUP_REPLICATION").await;

    if bootstrap {
        let reset_result = instance
            .set_sysvar(
                "group_replication_bootstrap_group",
                &OptionValue::Bool(false),
                VarQualifier::Global,
            )
            .await;
        start_result?;
        reset_result?;
    } else {
        start_result?;
    }
    Ok(())
}

pub async fn stop_group_replication(instance: &dyn Instance) -> Result<(), ReplicoreError> {
    instance.execute("STOP GROUP_REPLICATION").await
}

/// Reads this instance's own member state from the membership table.
pub async fn get_member_state(instance: &dyn Instance) -> Result<MemberState, ReplicoreError> {
    let row = instance
        .query_one(
            "SELECT member_state FROM performance_schema.replication_group_members \
             WHERE member_id = @@server_uuid",
        )
        .await?;

    let state = row
        .and_then(|row| row.into_iter().next().flatten())
        .filter(|state| !state.is_empty());
    match state {
        Some(state) => state
            .parse()
            .map_err(|_| ReplicoreError::Sql(format!("unknown member state '{state}'"))),
        None => Ok(MemberState::Missing),
    }
}

/// Reads group facts from a peer in one round-trip. Returns `None` when the
/// peer is no longer listed as a member of any group.
pub async fn get_group_information(
    peer: &dyn Instance,
) -> Result<Option<GroupInfo>, ReplicoreError> {
    let view_change_uuid_col = if peer.version() >= Version::new(8, 0, 27) {
        "@@group_replication_view_change_uuid"
    } else {
        "''"
    };
    let sql = format!(
        "SELECT member_state, @@group_replication_group_name, \
         @@group_replication_single_primary_mode, {view_change_uuid_col} \
         FROM performance_schema.replication_group_members \
         WHERE member_id = @@server_uuid"
    );

    let Some(row) = peer.query_one(&sql).await? else {
        return Ok(None);
    };
    let mut columns = row.into_iter();
    let mut next_column = || columns.next().flatten().unwrap_or_default();

    let state = next_column();
    let member_state = if state.is_empty() {
        MemberState::Missing
    } else {
        state
            .parse()
            .map_err(|_| ReplicoreError::Sql(format!("unknown member state '{state}'")))?
    };

    Ok(Some(GroupInfo {
        member_state,
        group_name: next_column(),
        single_primary: parse_bool(&next_column()),
        view_change_uuid: next_column(),
    }))
}

/// Reads whether a named member action is enabled. `None` when the action is
/// not listed (e.g. the plugin has never configured it).
pub async fn get_member_action_status(
    instance: &dyn Instance,
    action_name: &str,
) -> Result<Option<bool>, ReplicoreError> {
    let sql = format!(
        "SELECT enabled FROM performance_schema.replication_group_member_actions \
         WHERE name = {}",
        quote_sql_string(action_name)
    );
    let row = instance.query_one(&sql).await?;
    Ok(row
        .and_then(|row| row.into_iter().next().flatten())
        .map(|enabled| parse_bool(&enabled)))
}

/// Resets every member action to its default.
pub async fn reset_member_actions(instance: &dyn Instance) -> Result<(), ReplicoreError> {
    instance
        .execute("SELECT group_replication_reset_member_actions()")
        .await
}

/// Enumerates every `group_replication_%` variable with its live value.
pub async fn get_all_configurations(
    instance: &dyn Instance,
) -> Result<BTreeMap<String, Option<String>>, ReplicoreError> {
    let rows = instance
        .query("SHOW GLOBAL VARIABLES LIKE 'group\\_replication\\_%'")
        .await?;

    let mut configurations = BTreeMap::new();
    for row in rows {
        let mut columns = row.into_iter();
        if let Some(Some(name)) = columns.next() {
            configurations.insert(name, columns.next().flatten());
        }
    }
    Ok(configurations)
}

/// Queues auto-increment settings for the given topology and group size.
/// Offsets are chosen so that concurrent writes on different writable members
/// cannot collide on generated primary keys.
pub async fn update_auto_increment(
    config: &mut Config,
    topology_mode: TopologyMode,
    group_size: u64,
) -> Result<(), ReplicoreError> {
    match topology_mode {
        TopologyMode::SinglePrimary => {
            // Only one member writes; a fixed offset leaves room for a quick
            // switch to multi-primary without renumbering.
            config.set("auto_increment_increment", OptionValue::Int(1));
            config.set("auto_increment_offset", OptionValue::Int(2));
        }
        TopologyMode::MultiPrimary => {
            let increment = i64::try_from(group_size.max(7)).map_err(|_| {
                ReplicoreError::InvariantViolated(format!(
                    "group size {group_size} out of range"
                ))
            })?;
            let instance = config
                .server_handler()
                .ok_or_else(|| {
                    ReplicoreError::InvariantViolated(
                        "configuration has no server handler".to_string(),
                    )
                })?
                .instance()
                .clone();
            let server_id = instance
                .get_sysvar_int("server_id", VarQualifier::Global)
                .await?
                .unwrap_or(0);
            let offset = 1 + server_id % increment;
            debug!(
                "Setting auto_increment_increment={increment} and auto_increment_offset={offset} \
                 for topology mode '{topology_mode}'."
            );
            config.set("auto_increment_increment", OptionValue::Int(increment));
            config.set("auto_increment_offset", OptionValue::Int(offset));
        }
    }
    Ok(())
}

/// Programs replication credentials for one channel on the instance. The
/// statement vocabulary follows the server version.
pub async fn change_replication_credentials(
    instance: &dyn Instance,
    channel: &str,
    user: &str,
    password: &str,
) -> Result<(), ReplicoreError> {
    let sql = if instance.version() >= Version::new(8, 0, 23) {
        format!(
            "CHANGE REPLICATION SOURCE TO SOURCE_USER = {}, SOURCE_PASSWORD = {} \
             FOR CHANNEL {}",
            quote_sql_string(user),
            quote_sql_string(password),
            quote_sql_string(channel)
        )
    } else {
        format!(
            "CHANGE MASTER TO MASTER_USER = {}, MASTER_PASSWORD = {} FOR CHANNEL {}",
            quote_sql_string(user),
            quote_sql_string(password),
            quote_sql_string(channel)
        )
    };
    instance.execute(&sql).await
}
