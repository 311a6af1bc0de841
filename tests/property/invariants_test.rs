// tests/property/invariants_test.rs

//! Invariants of the validator and remediator across arbitrary server
//! versions and configuration states.

use crate::common::{MockInstance, server_and_file_config, server_config};
use proptest::prelude::*;
use replicore::core::checks::{
    ClusterType, ConfigType, InvalidConfig, ValueType, check_instance_config,
};
use replicore::core::instance::VarQualifier;
use replicore::core::remediate::configure_instance;
use replicore::core::version::Version;
use std::sync::Arc;

fn any_version() -> impl Strategy<Value = Version> {
    (
        prop::sample::select(vec![5u16, 8u16]),
        0u16..=4,
        0u16..=40,
    )
        .prop_map(|(major, minor, patch)| {
            if major == 5 {
                Version::new(5, 7, patch)
            } else {
                Version::new(8, minor, patch)
            }
        })
}

fn sysvar_value(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

fn arbitrary_instance(
    version: Version,
    log_bin: bool,
    gtid: bool,
    server_id: u32,
) -> MockInstance {
    MockInstance::new(version)
        .with_sysvar("server_id", &server_id.to_string())
        .with_sysvar("log_bin", sysvar_value(log_bin))
        .with_sysvar("enforce_gtid_consistency", sysvar_value(gtid))
        .with_sysvar("gtid_mode", sysvar_value(gtid))
        .with_sysvar("log_slave_updates", sysvar_value(gtid))
        .with_sysvar("log_replica_updates", sysvar_value(gtid))
        .with_sysvar("master_info_repository", "TABLE")
        .with_sysvar("relay_log_info_repository", "TABLE")
        .with_sysvar("transaction_write_set_extraction", "XXHASH64")
}

fn default_qualifier(version: Version) -> VarQualifier {
    if version >= Version::PERSIST_SUPPORT {
        VarQualifier::Persist
    } else {
        VarQualifier::Global
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    /// log_bin records never leave the validator fixable on the live server
    /// alone: the server cannot toggle binary logging.
    #[test]
    fn log_bin_records_are_never_server_only(
        version in any_version(),
        log_bin in any::<bool>(),
        gtid in any::<bool>(),
        with_file in any::<bool>(),
        server_id in 0u32..=10,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let instance =
                Arc::new(arbitrary_instance(version, log_bin, gtid, server_id));
            let config = if with_file {
                server_and_file_config(&instance, default_qualifier(version)).0
            } else {
                server_config(&instance, default_qualifier(version))
            };

            let records = check_instance_config(
                &*instance,
                &config,
                ClusterType::GroupReplication,
                &[],
            )
            .await
            .unwrap();

            for record in records.iter().filter(|r| r.var_name == "log_bin") {
                assert!(
                    record
                        .types
                        .intersects(ConfigType::CONFIG | ConfigType::RESTART_ONLY)
                );
                assert!(!record.types.contains(ConfigType::SERVER));
            }
        });
    }

    /// When the server cannot persist and an option file is attached, every
    /// record is escalated to CONFIG so the fix survives a restart.
    #[test]
    fn validator_escalates_everything_on_non_persist_servers(
        patch in 0u16..=44,
        log_bin in any::<bool>(),
        gtid in any::<bool>(),
        server_id in 0u32..=10,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let version = Version::new(5, 7, patch);
            let instance =
                Arc::new(arbitrary_instance(version, log_bin, gtid, server_id));
            let (config, _) = server_and_file_config(&instance, VarQualifier::Global);

            let records = check_instance_config(
                &*instance,
                &config,
                ClusterType::GroupReplication,
                &[],
            )
            .await
            .unwrap();

            for record in &records {
                assert!(
                    record.types.contains(ConfigType::CONFIG),
                    "record for '{}' missing CONFIG: {:?}",
                    record.var_name,
                    record.types
                );
            }
        });
    }

    /// enforce_gtid_consistency always precedes gtid_mode in the list.
    #[test]
    fn validator_preserves_gtid_dependency_order(
        version in any_version(),
        log_bin in any::<bool>(),
        server_id in 0u32..=10,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let instance =
                Arc::new(arbitrary_instance(version, log_bin, false, server_id));
            let config = server_config(&instance, default_qualifier(version));

            let records = check_instance_config(
                &*instance,
                &config,
                ClusterType::GroupReplication,
                &[],
            )
            .await
            .unwrap();

            let names: Vec<&str> =
                records.iter().map(|r| r.var_name.as_str()).collect();
            let enforce = names
                .iter()
                .position(|n| *n == "enforce_gtid_consistency")
                .unwrap();
            let gtid = names.iter().position(|n| *n == "gtid_mode").unwrap();
            assert!(enforce < gtid);
        });
    }

    /// The remediator never issues a live SET for a deprecated variable, no
    /// matter where the record sits in the list or what the server supports.
    #[test]
    fn remediator_never_sets_deprecated_variables(
        version in any_version(),
        reversed in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut records = vec![
                InvalidConfig {
                    var_name: "master_info_repository".to_string(),
                    current_val: "FILE".to_string(),
                    required_val: "TABLE".to_string(),
                    val_type: ValueType::Text,
                    types: ConfigType::SERVER | ConfigType::CONFIG,
                    restart: true,
                },
                InvalidConfig {
                    var_name: "relay_log_info_repository".to_string(),
                    current_val: "FILE".to_string(),
                    required_val: "TABLE".to_string(),
                    val_type: ValueType::Text,
                    types: ConfigType::SERVER | ConfigType::CONFIG,
                    restart: true,
                },
                InvalidConfig {
                    var_name: "gtid_mode".to_string(),
                    current_val: "OFF".to_string(),
                    required_val: "ON".to_string(),
                    val_type: ValueType::Text,
                    types: ConfigType::SERVER,
                    restart: true,
                },
            ];
            if reversed {
                records.reverse();
            }

            let instance = Arc::new(MockInstance::new(version));
            let (mut config, _) =
                server_and_file_config(&instance, default_qualifier(version));

            configure_instance(&mut config, &records, version)
                .await
                .unwrap();

            for (name, _) in instance.set_ops() {
                assert_ne!(name, "master_info_repository");
                assert_ne!(name, "relay_log_info_repository");
            }
        });
    }
}
