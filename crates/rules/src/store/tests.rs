//! Tests for the routing rule store.

use std::collections::HashSet;
use std::fs;
use std::fs::OpenOptions;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use super::lock::FileLock;
use super::*;
use crate::rule::RoutingRule;

const GATEWAY_RULES_YAML: &str = r#"---
name: default
description: "route everything else to adhoc"
priority: 0
actions:
  - 'result.put("routingGroup", "adhoc")'
---
name: analytics
description: "dashboards go to the analytics cluster"
priority: 1
condition: 'request.getHeader("X-Trino-Client-Tags") contains "analytics"'
actions:
  - 'result.put("routingGroup", "analytics")'
---
name: batch
priority: 2
condition: 'request.getHeader("X-Trino-Source") == "airflow"'
"#;

fn temp_store(contents: &str) -> (TempDir, RuleStore) {
    let dir = TempDir::new().expect("create tempdir");
    let path = dir.path().join("routing-rules.yml");
    fs::write(&path, contents).unwrap();
    let store = RuleStore::new(path);
    (dir, store)
}

fn names(rules: &[RoutingRule]) -> Vec<&str> {
    rules.iter().map(|r| r.name.as_str()).collect()
}

#[test]
fn list_returns_rules_in_file_order() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);

    let rules = store.list().unwrap();
    assert_eq!(names(&rules), vec!["default", "analytics", "batch"]);
    assert_eq!(rules[2].priority(), Some(2));
}

#[test]
fn list_of_empty_file_is_empty() {
    let (_dir, store) = temp_store("");
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn update_replaces_only_the_named_rule() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);
    let before = store.list().unwrap();

    let updated = store
        .update_by_name(RoutingRule::new("analytics").with_field("priority", 5))
        .unwrap();

    assert_eq!(updated.len(), 3);
    assert_eq!(names(&updated), vec!["default", "analytics", "batch"]);
    assert_eq!(updated[1].priority(), Some(5));
    // Replacement is whole-document, not a merge.
    assert_eq!(updated[1].condition(), None);
    assert_eq!(updated[0], before[0]);
    assert_eq!(updated[2], before[2]);

    assert_eq!(store.list().unwrap(), updated);
}

#[test]
fn update_miss_is_a_noop() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);
    let before = store.list().unwrap();

    let result = store
        .update_by_name(RoutingRule::new("interactive").with_field("priority", 9))
        .unwrap();

    assert_eq!(result, before);
    let on_disk = fs::read_to_string(store.path()).unwrap();
    assert_eq!(on_disk, GATEWAY_RULES_YAML);
}

#[test]
fn update_replaces_every_duplicate() {
    let yaml = "---\nname: dup\npriority: 1\n---\nname: other\n---\nname: dup\npriority: 2\n";
    let (_dir, store) = temp_store(yaml);

    let rules = store
        .update_by_name(RoutingRule::new("dup").with_field("priority", 7))
        .unwrap();

    assert_eq!(names(&rules), vec!["dup", "other", "dup"]);
    assert_eq!(rules[0].priority(), Some(7));
    assert_eq!(rules[2].priority(), Some(7));
    assert_eq!(store.list().unwrap(), rules);
}

#[test]
fn shrinking_rewrite_leaves_no_stale_tail() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);

    store.update_by_name(RoutingRule::new("default")).unwrap();

    let on_disk = fs::read_to_string(store.path()).unwrap();
    assert!(!on_disk.contains("adhoc"));
    assert_eq!(store.list().unwrap().len(), 3);
}

#[test]
fn empty_name_is_rejected_before_touching_the_file() {
    let dir = TempDir::new().unwrap();
    let store = RuleStore::new(dir.path().join("missing.yml"));

    let err = store.update_by_name(RoutingRule::new("")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(err.path().is_none());
}

#[test]
fn malformed_document_fails_both_operations_with_path() {
    let yaml = "---\nname: default\n---\nname: [unclosed\n";
    let (_dir, store) = temp_store(yaml);

    let err = store.list().unwrap_err();
    assert!(err.is_parse(), "expected parse failure, got {err}");
    assert_eq!(err.path(), Some(store.path()));
    assert!(err.to_string().contains("routing-rules.yml"));

    let err = store
        .update_by_name(RoutingRule::new("default").with_field("priority", 1))
        .unwrap_err();
    assert!(err.is_parse());
    assert_eq!(err.path(), Some(store.path()));

    assert_eq!(fs::read_to_string(store.path()).unwrap(), yaml);
}

#[test]
fn wrong_shape_is_a_parse_failure() {
    let (_dir, store) = temp_store("---\nname: ok\n---\ndescription: nameless\n");

    match store.list().unwrap_err() {
        StoreError::Parse { document, .. } => assert_eq!(document, 1),
        other => panic!("expected parse failure, got {other}"),
    }
}

#[test]
fn missing_file_is_an_io_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.yml");
    let store = RuleStore::new(&path);

    let err = store.list().unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));
    assert_eq!(err.path(), Some(path.as_path()));

    let err = store
        .update_by_name(RoutingRule::new("default"))
        .unwrap_err();
    assert!(err.is_io());
    assert!(!path.exists(), "update must not create the rules file");
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_an_io_failure() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);
    fs::set_permissions(store.path(), fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users read through mode bits; nothing to assert then.
    if fs::read(store.path()).is_err() {
        let err = store.list().unwrap_err();
        assert!(err.is_io(), "expected io failure, got {err}");
        assert_eq!(err.path(), Some(store.path()));

        let err = store
            .update_by_name(RoutingRule::new("batch").with_field("priority", 9))
            .unwrap_err();
        assert!(err.is_io(), "expected io failure, got {err}");
        assert_eq!(err.path(), Some(store.path()));
    }

    fs::set_permissions(store.path(), fs::Permissions::from_mode(0o644)).unwrap();
    assert_eq!(fs::read_to_string(store.path()).unwrap(), GATEWAY_RULES_YAML);
}

#[test]
fn payload_name_key_is_rejected_and_file_untouched() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);
    let mut rule = RoutingRule::new("analytics");
    rule.payload.insert("name".into(), "other".into());

    let err = store.update_by_name(rule).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "got {err}");
    assert_eq!(fs::read_to_string(store.path()).unwrap(), GATEWAY_RULES_YAML);
    assert_eq!(store.list().unwrap().len(), 3);
}

#[test]
fn name_field_on_update_renames_the_lookup() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);

    // `with_field("name", ..)` renames the rule, so nothing named "other" matches.
    let rules = store
        .update_by_name(RoutingRule::new("analytics").with_field("name", "other"))
        .unwrap();

    assert_eq!(names(&rules), vec!["default", "analytics", "batch"]);
    assert_eq!(fs::read_to_string(store.path()).unwrap(), GATEWAY_RULES_YAML);
    assert_eq!(store.list().unwrap(), rules);
}

#[test]
fn unreadable_encoding_is_refused_before_writing() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);

    let err = super::core::check_decodable(store.path(), "---\nname: a\nname: b\n").unwrap_err();
    assert!(matches!(err, StoreError::Encode { .. }), "got {err}");
    assert_eq!(err.path(), Some(store.path()));

    super::core::check_decodable(store.path(), GATEWAY_RULES_YAML).unwrap();
}

#[test]
fn tagged_payload_survives_an_update() {
    let yaml = "---\nname: etl\ntarget: !cluster etl-1\n---\nname: adhoc\ntarget: !cluster adhoc-1\n";
    let (_dir, store) = temp_store(yaml);

    let before = store.list().unwrap();
    let rules = store
        .update_by_name(RoutingRule::new("adhoc").with_field("priority", 4))
        .unwrap();

    assert_eq!(rules[0], before[0]);
    assert!(fs::read_to_string(store.path()).unwrap().contains("!cluster etl-1"));
    assert_eq!(store.list().unwrap(), rules);
}

#[test]
fn concurrent_updates_on_one_store_do_not_interleave() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);
    let store = Arc::new(store);
    let markers: Vec<String> = (0..16).map(|i| format!("thread-{i}")).collect();

    let handles: Vec<_> = markers
        .iter()
        .cloned()
        .map(|marker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let rule = RoutingRule::new("analytics")
                    .with_field("priority", 1)
                    .with_field("marker", marker);
                store.update_by_name(rule).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().len(), 3);
    }

    let rules = store.list().unwrap();
    assert_eq!(names(&rules), vec!["default", "analytics", "batch"]);
    let survivor = rules[1].field("marker").and_then(|v| v.as_str()).unwrap();
    let expected: HashSet<&str> = markers.iter().map(String::as_str).collect();
    assert!(expected.contains(survivor));
    assert_eq!(fs::read_to_string(store.path()).unwrap().matches("marker:").count(), 1);
}

#[test]
fn independent_stores_are_serialized_by_the_file_lock() {
    let (_dir, first) = temp_store(GATEWAY_RULES_YAML);
    let path = first.path().to_path_buf();
    let markers: Vec<String> = (0..8).map(|i| format!("store-{i}")).collect();

    let handles: Vec<_> = markers
        .iter()
        .cloned()
        .map(|marker| {
            let store = RuleStore::new(&path);
            thread::spawn(move || {
                for _ in 0..5 {
                    let rule = RoutingRule::new("batch").with_field("marker", marker.clone());
                    store.update_by_name(rule).unwrap();
                    assert_eq!(store.list().unwrap().len(), 3);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let rules = first.list().unwrap();
    assert_eq!(names(&rules), vec!["default", "analytics", "batch"]);
    let survivor = rules[2].field("marker").and_then(|v| v.as_str()).unwrap();
    assert!(markers.iter().any(|m| m == survivor));
}

#[test]
fn held_lock_makes_bounded_update_time_out() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);
    let store = store.with_lock_timeout(Duration::from_millis(100));

    let file = OpenOptions::new().read(true).write(true).open(store.path()).unwrap();
    let held = FileLock::exclusive(file, None).unwrap();

    let started = Instant::now();
    let err = store
        .update_by_name(RoutingRule::new("batch").with_field("priority", 3))
        .unwrap_err();
    match &err {
        StoreError::LockTimeout { path, timeout } => {
            assert_eq!(path, store.path());
            assert_eq!(*timeout, Duration::from_millis(100));
        }
        other => panic!("expected LockTimeout, got {other}"),
    }
    assert!(err.is_io());
    assert!(started.elapsed() >= Duration::from_millis(100));

    let err = store.list().unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout { .. }));

    drop(held);
    let rules = store
        .update_by_name(RoutingRule::new("batch").with_field("priority", 3))
        .unwrap();
    assert_eq!(rules[2].priority(), Some(3));
}

#[test]
fn list_waits_for_an_in_flight_writer() {
    let (_dir, store) = temp_store(GATEWAY_RULES_YAML);
    let path = store.path().to_path_buf();

    let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let held = FileLock::exclusive(file, None).unwrap();

    let reader = thread::spawn(move || RuleStore::new(path).list());
    thread::sleep(Duration::from_millis(50));
    assert!(!reader.is_finished(), "list must block while a writer holds the lock");

    drop(held);
    assert_eq!(reader.join().unwrap().unwrap().len(), 3);
}

#[test]
fn from_config_carries_path_and_timeout() {
    let config = gateway_core::RoutingRulesConfig {
        rules_config_path: "/srv/gateway/rules.yml".into(),
        lock_timeout_ms: 1500,
    };
    let store = RuleStore::from_config(&config);
    assert_eq!(store.path(), std::path::Path::new("/srv/gateway/rules.yml"));
    assert_eq!(store.lock_timeout(), Some(Duration::from_millis(1500)));

    let unbounded = RuleStore::from_config(&gateway_core::RoutingRulesConfig::default());
    assert_eq!(unbounded.lock_timeout(), None);
}
