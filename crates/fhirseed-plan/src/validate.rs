use std::path::Path;

use chrono::NaiveDate;
use jsonschema::JSONSchema;
use serde_json::Value;

use crate::errors::{PlanError, ValidationIssue, ValidationReport};
use crate::model::{DependentKind, GeneratorConfig, LinkKind, QuantityEntry, SubjectOverride};
use crate::schema::config_json_schema;

/// Validated configuration with accumulated warnings.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub config: GeneratorConfig,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a configuration JSON document against the configuration JSON Schema.
pub fn validate_config_json(
    config_json: &Value,
    config_schema: &Value,
) -> Result<ValidationReport, PlanError> {
    let compiled =
        JSONSchema::compile(config_schema).map_err(|err| PlanError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(config_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.error("schema_violation", path, error.to_string(), None);
        }
    }

    Ok(report)
}

/// Semantic checks that the JSON Schema cannot express.
pub fn validate_semantics(config: &GeneratorConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_base_counts(config, &mut report);
    for (kind, entry) in &config.per_patient {
        validate_entry(*kind, entry, &mut report);
    }
    validate_overrides(config, &mut report);

    report
}

/// Validate the configuration end-to-end, returning structured issues on failure.
pub fn validate_config(config_json: &Value) -> Result<ValidatedConfig, ValidationReport> {
    let config_schema = match serde_json::to_value(config_json_schema()) {
        Ok(schema) => schema,
        Err(err) => return Err(single_error("schema_validation_error", err.to_string())),
    };

    let structural = match validate_config_json(config_json, &config_schema) {
        Ok(report) => report,
        Err(err) => return Err(single_error("schema_validation_error", err.to_string())),
    };

    if !structural.is_ok() {
        return Err(structural);
    }

    let config: GeneratorConfig = match serde_json::from_value(config_json.clone()) {
        Ok(config) => config,
        Err(err) => return Err(single_error("invalid_config_json", err.to_string())),
    };

    let semantic = validate_semantics(&config);
    if !semantic.is_ok() {
        return Err(semantic);
    }

    Ok(ValidatedConfig {
        config,
        warnings: semantic.warnings,
    })
}

/// Read and validate a configuration file.
pub fn load_config_file(path: &Path) -> Result<ValidatedConfig, PlanError> {
    let contents = std::fs::read_to_string(path)?;
    let json: Value = serde_json::from_str(&contents)?;
    validate_config(&json).map_err(PlanError::Invalid)
}

fn validate_base_counts(config: &GeneratorConfig, report: &mut ValidationReport) {
    let counts = &config.base_counts;
    if config.subject_count() == 0 {
        report.warning(
            "no_subjects",
            "/base_counts/patients",
            "no subjects will be generated",
            Some("set base_counts.patients to a positive integer"),
        );
        return;
    }

    if counts.clinics == 0 {
        report.error(
            "empty_pool",
            "/base_counts/clinics",
            "subjects draw facilities from the clinic pool, which is empty",
            Some("set base_counts.clinics to at least 1"),
        );
    }
    if counts.practitioners == 0 {
        report.error(
            "empty_pool",
            "/base_counts/practitioners",
            "subjects draw clinicians from the practitioner pool, which is empty",
            Some("set base_counts.practitioners to at least 1"),
        );
    }
}

fn validate_entry(kind: DependentKind, entry: &QuantityEntry, report: &mut ValidationReport) {
    let QuantityEntry::Rule(rule) = entry else {
        return;
    };
    let base_path = format!("/per_patient/{}", kind.key());

    if rule.min > rule.max {
        report.error(
            "range_inverted",
            format!("{base_path}/min"),
            format!("min ({}) is greater than max ({})", rule.min, rule.max),
            Some("swap the bounds or make them equal for a fixed count"),
        );
    }

    if let Some(probability) = rule.probability {
        check_probability(probability, &format!("{base_path}/probability"), report);
    }

    for link in LinkKind::ALL {
        let Some(probability) = rule.link(link) else {
            continue;
        };
        let path = format!("{base_path}/{}", link.field());
        check_probability(probability, &path, report);
        if !kind.links().iter().any(|(known, _)| *known == link) {
            report.warning(
                "unused_link_probability",
                path,
                format!("{} has no {} link", kind.key(), link.field()),
                Some("remove the field; it has no effect"),
            );
        }
    }
}

fn check_probability(probability: f64, path: &str, report: &mut ValidationReport) {
    if !(0.0..=1.0).contains(&probability) {
        report.error(
            "probability_out_of_range",
            path,
            format!("probability {probability} is outside [0, 1]"),
            Some("use a value between 0.0 and 1.0"),
        );
    }
}

fn validate_overrides(config: &GeneratorConfig, report: &mut ValidationReport) {
    if !config.subject_overrides.is_empty() && !config.patient_configs.is_empty() {
        report.error(
            "overrides_conflict",
            "/patient_configs",
            "both subject_overrides and patient_configs are set",
            Some("move every entry into subject_overrides"),
        );
        return;
    }

    let (field, overrides) = if config.subject_overrides.is_empty() {
        ("patient_configs", config.patient_configs.as_slice())
    } else {
        ("subject_overrides", config.subject_overrides.as_slice())
    };
    if overrides.is_empty() {
        return;
    }

    if overrides.len() as u32 != config.base_counts.patients {
        report.warning(
            "patients_ignored",
            "/base_counts/patients",
            format!(
                "{} overrides given; one subject is built per override",
                overrides.len()
            ),
            None,
        );
    }

    for (idx, item) in overrides.iter().enumerate() {
        validate_override(&format!("/{field}/{idx}"), item, report);
    }
}

fn validate_override(base_path: &str, item: &SubjectOverride, report: &mut ValidationReport) {
    if let Some(birth_date) = &item.birth_date
        && NaiveDate::parse_from_str(birth_date, "%Y-%m-%d").is_err()
    {
        report.error(
            "invalid_birth_date",
            format!("{base_path}/birth_date"),
            format!("'{birth_date}' is not a YYYY-MM-DD date"),
            None,
        );
    }

    let listed = [
        (DependentKind::Conditions, !item.conditions.is_empty()),
        (DependentKind::MedicationRequests, !item.medications.is_empty()),
        (DependentKind::AllergyIntolerances, !item.allergies.is_empty()),
    ];
    for (kind, has_list) in listed {
        if has_list && item.counts.contains_key(&kind) {
            report.error(
                "override_conflict",
                format!("{base_path}/counts/{}", kind.key()),
                format!("{} is given both as a list and as a count", kind.key()),
                Some("keep either the explicit list or the count"),
            );
        }
    }
}

fn single_error(code: &str, message: String) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.error(code, "/", message, None);
    report
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn codes(report: &ValidationReport) -> Vec<&str> {
        report
            .errors
            .iter()
            .chain(&report.warnings)
            .map(|issue| issue.code.as_str())
            .collect()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let report = validate_config(&json!({
            "per_patient": {"conditions": {"min": 3, "max": 1}}
        }))
        .unwrap_err();
        assert_eq!(codes(&report), vec!["range_inverted"]);
        assert_eq!(report.errors[0].path, "/per_patient/conditions/min");
    }

    #[test]
    fn probability_outside_unit_interval_is_rejected() {
        let report = validate_config(&json!({
            "per_patient": {"encounters": {"min": 1, "max": 1, "document_reference_probability": 1.5}}
        }))
        .unwrap_err();
        assert!(codes(&report).contains(&"probability_out_of_range"));
    }

    #[test]
    fn unknown_dependent_kind_is_rejected() {
        assert!(validate_config(&json!({"per_patient": {"spaceships": {"min": 1, "max": 1}}})).is_err());
    }

    #[test]
    fn unused_link_probability_only_warns() {
        let validated = validate_config(&json!({
            "per_patient": {"conditions": {"min": 1, "max": 1, "location_probability": 0.5}}
        }))
        .unwrap();
        assert_eq!(validated.warnings.len(), 1);
        assert_eq!(validated.warnings[0].code, "unused_link_probability");
    }

    #[test]
    fn empty_practitioner_pool_is_rejected() {
        let report = validate_config(&json!({
            "base_counts": {"clinics": 1, "practitioners": 0, "patients": 2}
        }))
        .unwrap_err();
        assert_eq!(report.errors[0].path, "/base_counts/practitioners");
    }

    #[test]
    fn fixed_counts_are_accepted() {
        let validated = validate_config(&json!({"per_patient": {"observations": 4}})).unwrap();
        let rule = validated.config.rule(DependentKind::Observations).unwrap();
        assert_eq!((rule.min, rule.max), (4, 4));
    }

    #[test]
    fn legacy_override_field_is_read() {
        let validated = validate_config(&json!({
            "base_counts": {"clinics": 1, "practitioners": 1, "patients": 1},
            "patient_configs": [{"first_name": "Ada", "birth_date": "1815-12-10"}]
        }))
        .unwrap();
        assert_eq!(validated.config.overrides().len(), 1);
        assert_eq!(validated.config.subject_count(), 1);
    }

    #[test]
    fn override_list_and_count_conflict() {
        let report = validate_config(&json!({
            "subject_overrides": [{
                "conditions": [{"code": "I10", "display": "Essential (primary) hypertension"}],
                "counts": {"conditions": 2},
                "birth_date": "10/12/1815"
            }]
        }))
        .unwrap_err();
        let found = codes(&report);
        assert!(found.contains(&"override_conflict"));
        assert!(found.contains(&"invalid_birth_date"));
    }

    #[test]
    fn default_config_is_valid() {
        let json = serde_json::to_value(GeneratorConfig::default()).unwrap();
        let validated = validate_config(&json).unwrap();
        assert!(validated.warnings.is_empty());
        assert_eq!(validated.config, GeneratorConfig::default());
    }
}
