//! Tests for utility functions

use fleet_dispatch::util::{decode_object_key, is_template_key, now_ms};

#[test]
fn test_decode_plus_and_percent_escapes() {
    assert_eq!(decode_object_key("Role+Sync/admins%2Bops.yaml"), "Role Sync/admins+ops.yaml");
    assert_eq!(decode_object_key("Repo/caf%C3%A9.yaml"), "Repo/café.yaml");
}

#[test]
fn test_decode_keeps_malformed_escapes() {
    assert_eq!(decode_object_key("a%zz.yaml"), "a%zz.yaml");
    assert_eq!(decode_object_key("trailing%2"), "trailing%2");
}

#[test]
fn test_template_key_extension() {
    assert!(is_template_key("Baseline/main.yaml"));
    assert!(!is_template_key("Baseline/main.yml"));
    assert!(!is_template_key("Baseline/"));
}

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    fleet_dispatch::util::telemetry::init_tracing_with_level("debug");
    fleet_dispatch::util::telemetry::init_tracing();
    tracing::info!("subscriber installed once");
}
