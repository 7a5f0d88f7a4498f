//! Round-trip laws for parameter values and constraints.
// peakstack-core/tests/value_round_trip.rs
// ============================================================================
// Module: Value Round-Trip Tests
// Description: Canonical stringification and storage parsing round-trips.
// Purpose: Ensure load(to_storage(load(x))) == load(x) for every kind.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use peakstack_core::AllowedValues;
use peakstack_core::ParamValue;
use peakstack_core::ValueKind;
use proptest::prelude::ProptestConfig;
use proptest::prelude::any;
use proptest::prelude::prop;
use proptest::prelude::prop_assert_eq;
use proptest::prelude::proptest;
use proptest::prelude::Strategy;

/// Round-trips a value through its canonical storage form.
fn round_trip(value: &ParamValue) -> ParamValue {
    let canonical = value.canonical();
    value.kind().parse_storage("test", &canonical).expect("canonical form must parse back")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn int_round_trip(raw in any::<i64>()) {
        let value = ParamValue::Int(raw);
        prop_assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn bool_round_trip(raw in any::<bool>()) {
        let value = ParamValue::Bool(raw);
        prop_assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn float_round_trip(raw in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
        let value = ParamValue::Float(raw);
        prop_assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn string_round_trip(raw in "[a-zA-Z0-9_./-]{0,40}") {
        let value = ParamValue::Str(raw);
        prop_assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn string_list_round_trip(raw in prop::collection::vec("[a-zA-Z0-9_.-]{1,12}", 0..6)) {
        let value = ParamValue::StrList(raw);
        prop_assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn canonical_is_stable(raw in any::<i64>()) {
        let value = ParamValue::Int(raw);
        let once = round_trip(&value);
        let twice = round_trip(&once);
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn json_round_trip() {
    let value = ParamValue::Json(serde_json::json!({"a": [1, 2], "b": {"c": true}}));
    assert_eq!(round_trip(&value), value);
}

#[test]
fn empty_string_list_round_trips_empty() {
    let value = ParamValue::StrList(Vec::new());
    assert_eq!(round_trip(&value), value);
}

#[test]
fn storage_rejects_mistyped_values() {
    assert!(ValueKind::Int.parse_storage("count", "ten").is_err());
    assert!(ValueKind::Bool.parse_storage("flag", "yes").is_err());
    assert!(ValueKind::Float.parse_storage("price", "cheap").is_err());
}

#[test]
fn one_of_constraint_names_the_offender() {
    let allowed = AllowedValues::one_of(["ONDEMAND", "SPOT"]);
    let err = allowed
        .check("CapacityType", &ParamValue::Str("RESERVED".to_string()))
        .expect_err("constraint must reject values outside the set");
    let message = err.to_string();
    assert!(message.contains("CapacityType"), "missing key in: {message}");
    assert!(message.contains("RESERVED"), "missing value in: {message}");
    assert!(message.contains("ONDEMAND"), "missing allowed set in: {message}");
}

#[test]
fn pattern_constraint_is_full_match() {
    let allowed = AllowedValues::pattern("[a-z]+-\\d").expect("pattern compiles");
    assert!(allowed.check("Region", &ParamValue::Str("east-1".to_string())).is_ok());
    assert!(allowed.check("Region", &ParamValue::Str("xeast-1x".to_string())).is_err());
}

#[test]
fn string_list_constraint_checks_elements() {
    let allowed = AllowedValues::pattern("subnet-[a-z]+").expect("pattern compiles");
    assert!(
        allowed
            .check(
                "SubnetIds",
                &ParamValue::StrList(vec![
                    "subnet-head".to_string(),
                    "subnet-compute".to_string()
                ]),
            )
            .is_ok()
    );
    assert!(
        allowed
            .check(
                "SubnetIds",
                &ParamValue::StrList(vec!["subnet-head".to_string(), "vpc-1".to_string()]),
            )
            .is_err()
    );
}
