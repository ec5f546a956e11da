mod commands;
mod profile;
mod registry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use thiserror::Error;

use fhirseed_core::Error as CoreError;
use fhirseed_generate::GenerationError;
use fhirseed_plan::{PlanError, ValidationReport};
use fhirseed_publish::{PublishError, StoreError};

/// Environment variable holding the schema version.
pub const VERSION_ENV: &str = "FHIR_VERSION";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid configuration: {0}")]
    Validation(ValidationReport),
    #[error("{failed} record(s) failed to publish")]
    PublishFailed { failed: usize },
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::PublishFailed { .. } => 1,
            CliError::InvalidConfig(_) | CliError::Validation(_) => 2,
            CliError::Generation(GenerationError::Configuration(_)) => 2,
            _ => 3,
        }
    }
}

impl From<PlanError> for CliError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Invalid(report) => CliError::Validation(report),
            PlanError::Io(err) => CliError::Io(err),
            other => CliError::InvalidConfig(other.to_string()),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fhirseed", version, about = "Synthetic FHIR record graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a record graph and write it to a file.
    Generate(GenerateArgs),
    /// Assemble (or read) a graph and publish it to a FHIR store.
    Publish(PublishArgs),
    /// Validate a configuration file and print the report.
    ValidateConfig(ConfigArgs),
    /// Print the configuration JSON Schema.
    ConfigSchema,
    /// Print the built-in default configuration.
    DefaultConfig,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Generation configuration (JSON). The built-in default is used when absent.
    #[arg(long, env = "FHIR_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Seed; overrides the configuration seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Schema version of every record (R4 or R5). A bad environment value falls back to R4.
    #[arg(long = "fhir-version", env = VERSION_ENV, default_value = "R4")]
    pub fhir_version: String,
    /// Set when the version came from the environment rather than the flag.
    #[arg(skip)]
    pub version_from_env: bool,
    /// Dates are drawn backwards from this day (YYYY-MM-DD).
    #[arg(long)]
    pub reference_date: Option<String>,
    /// Directory with catalog overrides (`<table>.json`).
    #[arg(long)]
    pub catalogs: Option<PathBuf>,
    /// Extra copy of the local serialization.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    pub run_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    #[command(flatten)]
    pub generate: GenerateArgs,
    /// Publish a previously written local serialization instead of generating.
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Full store base URL; wins over host/port/path.
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long, env = "FHIR_HOST", default_value = "localhost")]
    pub fhir_host: String,
    #[arg(long, env = "FHIR_PORT", default_value_t = 8080)]
    pub fhir_port: u16,
    #[arg(long, env = "FHIR_PATH", default_value = "/fhir")]
    pub fhir_path: String,
    /// TOML store profile with base URL and publish settings.
    #[arg(long)]
    pub store_profile: Option<PathBuf>,
    /// Per-call timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Concurrent submissions within one kind.
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Keep publishing independent records after a failure.
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,
    /// Run `$validate` before each create.
    #[arg(long, env = "FHIR_VALIDATE", default_value_t = false)]
    pub validate: bool,
    /// Check published appointments afterwards.
    #[arg(long, default_value_t = false)]
    pub verify: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = Cli::command().get_matches();
    let mut cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };
    let version_from_env = version_from_env(&matches);
    match &mut cli.command {
        Command::Generate(args) => args.version_from_env = version_from_env,
        Command::Publish(args) => args.generate.version_from_env = version_from_env,
        _ => {}
    }

    let result = match cli.command {
        Command::Generate(args) => commands::run_generate(args),
        Command::Publish(args) => commands::run_publish(args).await,
        Command::ValidateConfig(args) => commands::run_validate_config(args),
        Command::ConfigSchema => commands::print_config_schema(),
        Command::DefaultConfig => commands::print_default_config(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn version_from_env(matches: &ArgMatches) -> bool {
    ["generate", "publish"]
        .into_iter()
        .find_map(|name| matches.subcommand_matches(name))
        .and_then(|sub| sub.value_source("fhir_version"))
        == Some(ValueSource::EnvVariable)
}
