use std::path::Path;

use fhirseed_plan::{
    DependentKind, config_json_schema, load_config_file, validate_config_json,
};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

#[test]
fn fixtures_validate_against_schema() {
    let schema = serde_json::to_value(config_json_schema()).expect("serialize schema");
    for name in [
        "single_condition.config.json",
        "high_volume.config.json",
        "custom_subjects.config.json",
    ] {
        let contents = std::fs::read_to_string(fixture(name)).expect("read fixture");
        let json: serde_json::Value = serde_json::from_str(&contents).expect("parse fixture");
        let report = validate_config_json(&json, &schema).expect("compile schema");
        assert!(report.errors.is_empty(), "{name}: {report}");
    }
}

#[test]
fn single_condition_fixture_loads() {
    let validated =
        load_config_file(&fixture("single_condition.config.json")).expect("valid config");
    let config = validated.config;
    assert_eq!(config.seed, Some(7));
    assert_eq!(config.subject_count(), 1);
    assert_eq!(config.per_patient.len(), 1);
    assert!(config.rule(DependentKind::Appointments).is_none());
    assert!(validated.warnings.is_empty());
}

#[test]
fn custom_subjects_fixture_fixes_listed_kinds() {
    let validated = load_config_file(&fixture("custom_subjects.config.json")).expect("valid config");
    let overrides = validated.config.overrides();
    assert_eq!(overrides.len(), 2);
    assert_eq!(overrides[0].fixed_count(DependentKind::Conditions), Some(1));
    assert_eq!(overrides[0].fixed_count(DependentKind::Encounters), Some(2));
    assert_eq!(overrides[1].fixed_count(DependentKind::Conditions), Some(2));
    assert_eq!(overrides[1].fixed_count(DependentKind::Procedures), None);
}

#[test]
fn unknown_top_level_field_is_a_schema_violation() {
    let schema = serde_json::to_value(config_json_schema()).expect("serialize schema");
    let json = serde_json::json!({"base_count": {"patients": 1}});
    let report = validate_config_json(&json, &schema).expect("compile schema");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "schema_violation");
}
