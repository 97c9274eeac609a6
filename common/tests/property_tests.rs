// Property-based tests for common module

use common::config::Settings;
use common::store::StateStore;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::fs;
use tempfile::TempDir;

/// *For any* valid engine and observability values written to a config file,
/// layered loading reflects exactly those values.
#[test]
fn property_config_file_values_are_honored() {
    proptest!(|(
        warn_threshold in 1usize..100_000usize,
        metrics_port in 1024u16..65535u16,
        log_level in prop::sample::select(vec!["trace", "debug", "info", "warn", "error"])
    )| {
        std::env::remove_var("APP__ENGINE__RECORDER_WARN_THRESHOLD");
        std::env::remove_var("APP__OBSERVABILITY__METRICS_PORT");
        std::env::remove_var("APP__OBSERVABILITY__LOG_LEVEL");

        let temp_dir = TempDir::new().unwrap();
        let config = format!(
            r#"
[engine]
default_label = "(anonymous)"
recorder_warn_threshold = {}

[observability]
log_level = "{}"
metrics_port = {}
"#,
            warn_threshold, log_level, metrics_port
        );
        fs::write(temp_dir.path().join("default.toml"), config).unwrap();

        let settings = Settings::load_from_path(temp_dir.path()).unwrap();
        prop_assert_eq!(settings.engine.recorder_warn_threshold, warn_threshold);
        prop_assert_eq!(settings.observability.metrics_port, metrics_port);
        prop_assert_eq!(settings.observability.log_level.as_str(), log_level);
        prop_assert!(settings.validate().is_ok());
    });
}

/// *For any* local.toml overlay, its values take precedence over default.toml.
#[test]
fn property_local_config_overrides_default() {
    proptest!(|(default_port in 1024u16..30000u16, local_port in 30000u16..65000u16)| {
        std::env::remove_var("APP__OBSERVABILITY__METRICS_PORT");

        let temp_dir = TempDir::new().unwrap();
        let base = format!(
            r#"
[engine]
default_label = "(anonymous)"
recorder_warn_threshold = 1000

[observability]
log_level = "info"
metrics_port = {}
"#,
            default_port
        );
        fs::write(temp_dir.path().join("default.toml"), base).unwrap();
        fs::write(
            temp_dir.path().join("local.toml"),
            format!("[observability]\nmetrics_port = {}\n", local_port),
        )
        .unwrap();

        let settings = Settings::load_from_path(temp_dir.path()).unwrap();
        prop_assert_eq!(settings.observability.metrics_port, local_port);
    });
}

fn json_object(map: &[(String, i64)]) -> Value {
    let mut object = Map::new();
    for (key, value) in map {
        object.insert(key.clone(), json!(value));
    }
    Value::Object(object)
}

/// *For any* initial object and patch object, the merged state holds the
/// union of keys, with the patch winning every conflicting key.
#[test]
fn property_store_merge_is_key_union_with_patch_precedence() {
    proptest!(|(
        initial in prop::collection::vec(("[a-d]{1,3}", any::<i64>()), 0..6),
        patch in prop::collection::vec(("[a-d]{1,3}", any::<i64>()), 0..6)
    )| {
        let initial: Vec<(String, i64)> = initial;
        let patch: Vec<(String, i64)> = patch;

        let store = StateStore::new(json_object(&initial)).unwrap();
        store.set_state(json_object(&patch)).unwrap();
        let merged = store.get_state();
        let merged = merged.as_object().unwrap();

        // Expected: initial overlaid with patch, later duplicates winning
        // within each list (object construction is itself last-write-wins).
        let mut expected = Map::new();
        for (key, value) in initial.iter().chain(patch.iter()) {
            expected.insert(key.clone(), json!(value));
        }

        prop_assert_eq!(merged, &expected);
    });
}

/// *For any* sequence of patches, applying them one by one through the store
/// equals folding them into a single map overlay.
#[test]
fn property_store_sequential_patches_fold_like_map_overlay() {
    proptest!(|(patches in prop::collection::vec(
        prop::collection::vec(("[a-c]{1,2}", any::<i64>()), 1..4),
        1..5
    ))| {
        let store = StateStore::new(json!({})).unwrap();
        let mut expected = Map::new();

        for patch in &patches {
            store.set_state(json_object(patch)).unwrap();
            for (key, value) in patch {
                expected.insert(key.clone(), json!(value));
            }
        }

        prop_assert_eq!(store.get_state(), Value::Object(expected));
    });
}

/// *For any* non-object JSON value, set_state rejects it and the state is
/// left byte-for-byte untouched.
#[test]
fn property_store_rejects_every_non_object_patch() {
    let non_objects = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
        prop::collection::vec(any::<i64>(), 0..4).prop_map(Value::from),
    ];

    proptest!(|(patch in non_objects)| {
        let store = StateStore::new(json!({"keep": 1})).unwrap();
        prop_assert!(store.set_state(patch).is_err());
        prop_assert_eq!(store.get_state(), json!({"keep": 1}));
    });
}
