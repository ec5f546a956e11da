use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use fhirseed_core::{FhirVersion, RecordGraph};
use fhirseed_generate::{
    CatalogSet, GenerateOptions, GenerationReport, GraphAssembler, read_graph,
};
use fhirseed_plan::{
    GeneratorConfig, PlanError, ValidatedConfig, ValidationReport, config_json_schema,
    load_config_file, validate_config,
};
use fhirseed_publish::{HttpTransport, OnError, PublishOptions, Publisher};

use crate::profile::StoreProfile;
use crate::registry::{
    RunContext, RunOptions, init_run_logging, start_run, write_generation, write_publish,
};
use crate::{CliError, ConfigArgs, GenerateArgs, PublishArgs};

pub fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let validated = load_config(&args.config)?;
    let resolved = generate_options(&args)?;
    let catalog = load_catalog(args.catalogs.as_deref())?;

    let ctx = run_context("generate", &args, &resolved.options, RunExtras::default());
    let paths = start_run(&ctx)?;
    init_run_logging(&paths.logs_path)?;
    info!(event = "run_started", run_id = %ctx.run_id, command = %ctx.command);
    resolved.log_fallback();
    log_config(&validated);

    let assembly = GraphAssembler::new(&catalog, resolved.options).assemble(&validated.config)?;
    let bytes = write_generation(
        &paths,
        &assembly.graph,
        Some(&assembly.report),
        args.out.as_deref(),
    )?;
    log_counts(&assembly.report);

    info!(
        event = "run_finished",
        status = "success",
        bytes,
        path = %paths.graph_path.display()
    );
    println!("{}", paths.root.display());
    Ok(())
}

pub async fn run_publish(args: PublishArgs) -> Result<(), CliError> {
    let profile = match &args.store_profile {
        Some(path) => StoreProfile::load(path)?,
        None => StoreProfile::default(),
    };
    let publish = publish_options(&args, &profile);
    let base_url = args
        .base_url
        .clone()
        .or_else(|| profile.base_url.clone())
        .unwrap_or_else(|| {
            HttpTransport::base_url_from_parts(&args.fhir_host, args.fhir_port, &args.fhir_path)
        });
    let resolved = generate_options(&args.generate)?;
    let options = &resolved.options;
    let validated = match &args.input {
        Some(_) => None,
        None => Some(load_config(&args.generate.config)?),
    };
    let transport = HttpTransport::new(base_url.clone(), publish.timeout())?;

    let ctx = run_context(
        "publish",
        &args.generate,
        options,
        RunExtras {
            input: args.input.clone(),
            base_url: Some(base_url.clone()),
            publish: Some(publish.clone()),
        },
    );
    let paths = start_run(&ctx)?;
    init_run_logging(&paths.logs_path)?;
    info!(event = "run_started", run_id = %ctx.run_id, command = %ctx.command, base_url = %base_url);
    resolved.log_fallback();

    let (graph, report): (RecordGraph, Option<GenerationReport>) = match (&args.input, &validated) {
        (Some(input), _) => {
            let graph = read_graph(input, options.version)?;
            info!(event = "graph_loaded", path = %input.display(), records = graph.len());
            (graph, None)
        }
        (None, Some(validated)) => {
            log_config(validated);
            let catalog = load_catalog(args.generate.catalogs.as_deref())?;
            let assembly = GraphAssembler::new(&catalog, options.clone()).assemble(&validated.config)?;
            log_counts(&assembly.report);
            (assembly.graph, Some(assembly.report))
        }
        (None, None) => {
            return Err(CliError::InvalidConfig("no configuration loaded".to_string()));
        }
    };
    write_generation(&paths, &graph, report.as_ref(), args.generate.out.as_deref())?;

    let outcome = Publisher::new(Arc::new(transport), publish)
        .publish(graph)
        .await?;
    write_publish(&paths, &outcome.graph, &outcome.ids, &outcome.report)?;

    let failed = outcome.report.failures.len();
    if failed > 0 {
        for failure in &outcome.report.failures {
            eprintln!(
                "failed: {}/{} [{:?}] {}",
                failure.kind, failure.local_id, failure.class, failure.diagnostic
            );
        }
        info!(event = "run_finished", status = "failed", failed);
        return Err(CliError::PublishFailed { failed });
    }

    info!(
        event = "run_finished",
        status = "success",
        created = outcome.report.created_total,
        path = %paths.published_path.display()
    );
    println!("{}", paths.root.display());
    Ok(())
}

pub fn run_validate_config(args: ConfigArgs) -> Result<(), CliError> {
    match load_config(&args) {
        Ok(validated) => {
            let report = ValidationReport {
                errors: Vec::new(),
                warnings: validated.warnings,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(CliError::Validation(report)) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Err(CliError::Validation(report))
        }
        Err(err) => Err(err),
    }
}

pub fn print_config_schema() -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(&config_json_schema())?);
    Ok(())
}

pub fn print_default_config() -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(&GeneratorConfig::default())?);
    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<ValidatedConfig, CliError> {
    match &args.config {
        Some(path) => Ok(load_config_file(path)?),
        None => {
            let json = serde_json::to_value(GeneratorConfig::default())?;
            validate_config(&json).map_err(|report| CliError::from(PlanError::Invalid(report)))
        }
    }
}

/// Resolved generation options plus a version fallback to log once logging is up.
struct Resolved {
    options: GenerateOptions,
    version_fallback: Option<String>,
}

impl Resolved {
    fn log_fallback(&self) {
        if let Some(value) = &self.version_fallback {
            warn!(event = "version_fallback", value = %value, version = %self.options.version);
        }
    }
}

fn generate_options(args: &GenerateArgs) -> Result<Resolved, CliError> {
    let (version, version_fallback) = match args.fhir_version.parse::<FhirVersion>() {
        Ok(version) => (version, None),
        Err(_) if args.version_from_env => {
            (FhirVersion::R4, Some(args.fhir_version.clone()))
        }
        Err(err) => return Err(CliError::InvalidConfig(err.to_string())),
    };
    let mut options = GenerateOptions {
        seed: args.seed,
        version,
        ..GenerateOptions::default()
    };
    if let Some(value) = &args.reference_date {
        options.reference_date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
            CliError::InvalidConfig(format!("reference date '{value}': {err}"))
        })?;
    }
    Ok(Resolved {
        options,
        version_fallback,
    })
}

fn publish_options(args: &PublishArgs, profile: &StoreProfile) -> PublishOptions {
    let mut options = profile.publish.clone();
    if let Some(timeout_secs) = args.timeout_secs {
        options.timeout_secs = timeout_secs;
    }
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency;
    }
    if args.continue_on_error {
        options.on_error = OnError::Continue;
    }
    options.validate |= args.validate;
    options.verify |= args.verify;
    options
}

fn load_catalog(overrides: Option<&Path>) -> Result<CatalogSet, CliError> {
    Ok(match overrides {
        Some(root) => CatalogSet::with_overrides(root)?,
        None => CatalogSet::builtin()?,
    })
}

#[derive(Debug, Default)]
struct RunExtras {
    input: Option<std::path::PathBuf>,
    base_url: Option<String>,
    publish: Option<PublishOptions>,
}

fn run_context(
    command: &str,
    args: &GenerateArgs,
    options: &GenerateOptions,
    extras: RunExtras,
) -> RunContext {
    RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: Utc::now(),
        command: command.to_string(),
        run_dir: args.run_dir.clone(),
        options: RunOptions {
            config_path: args.config.config.clone(),
            seed: options.seed,
            version: options.version,
            reference_date: options.reference_date,
            input: extras.input,
            base_url: extras.base_url,
            publish: extras.publish,
        },
    }
}

fn log_config(validated: &ValidatedConfig) {
    let config = &validated.config;
    info!(
        event = "config_loaded",
        description = %config.description,
        subjects = config.subject_count(),
        clinics = config.base_counts.clinics,
        practitioners = config.base_counts.practitioners
    );
    for issue in &validated.warnings {
        warn!(event = "config_warning", code = %issue.code, path = %issue.path, message = %issue.message);
    }
}

fn log_counts(report: &GenerationReport) {
    for entry in &report.kinds {
        info!(event = "kind_generated", kind = %entry.kind, records = entry.records, references = entry.references);
    }
    for issue in &report.warnings {
        warn!(event = "generation_warning", code = %issue.code, message = %issue.message);
    }
    info!(
        event = "generation_summary",
        records = report.records_total,
        references = report.references_total,
        seed = report.seed,
        fingerprint = %report.fingerprint
    );
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args(version: &str, version_from_env: bool) -> GenerateArgs {
        GenerateArgs {
            config: ConfigArgs { config: None },
            seed: None,
            fhir_version: version.to_string(),
            version_from_env,
            reference_date: None,
            catalogs: None,
            out: None,
            run_dir: PathBuf::from("runs"),
        }
    }

    #[test]
    fn bad_environment_version_falls_back_to_r4() {
        let resolved = generate_options(&args("R9", true)).unwrap();
        assert_eq!(resolved.options.version, FhirVersion::R4);
        assert_eq!(resolved.version_fallback.as_deref(), Some("R9"));
    }

    #[test]
    fn bad_flag_version_is_a_usage_error() {
        let err = generate_options(&args("R9", false)).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn good_versions_parse_from_either_source() {
        let resolved = generate_options(&args("r5", true)).unwrap();
        assert_eq!(resolved.options.version, FhirVersion::R5);
        assert!(resolved.version_fallback.is_none());
    }
}
