use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use fhirseed_core::{DependencyGraph, FhirVersion, IdentifierMap, RecordGraph};
use fhirseed_generate::{GenerationReport, write_graph};
use fhirseed_publish::{PublishOptions, PublishReport, render_summary};

use super::RegistryResult;

/// Serializable options for runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    pub seed: Option<u64>,
    pub version: FhirVersion,
    pub reference_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishOptions>,
}

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub run_dir: PathBuf,
    pub options: RunOptions,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub command: String,
    pub options: RunOptions,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub graph_path: PathBuf,
    pub dag_path: PathBuf,
    pub generation_report_path: PathBuf,
    pub publish_report_path: PathBuf,
    pub publish_summary_path: PathBuf,
    pub identifiers_path: PathBuf,
    pub published_path: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config = RunConfig {
        run_id: ctx.run_id.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        command: ctx.command.clone(),
        options: ctx.options.clone(),
        git: collect_git_info(),
    };
    write_json(&root.join("config.json"), &config)?;

    let logs_path = root.join("logs.ndjson");
    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        logs_path,
        graph_path: root.join("graph.json"),
        dag_path: root.join("dag.json"),
        generation_report_path: root.join("generation_report.json"),
        publish_report_path: root.join("publish_report.json"),
        publish_summary_path: root.join("publish_summary.md"),
        identifiers_path: root.join("identifiers.json"),
        published_path: root.join("published.json"),
        root,
    })
}

/// Local serialization and generation report, plus a copy at `out_path`.
pub fn write_generation(
    paths: &RunPaths,
    graph: &RecordGraph,
    report: Option<&GenerationReport>,
    out_path: Option<&Path>,
) -> RegistryResult<u64> {
    let bytes = write_graph(&paths.graph_path, graph, None)?;
    write_json(&paths.dag_path, &DependencyGraph::healthcare().report())?;
    if let Some(report) = report {
        write_json(&paths.generation_report_path, report)?;
    }

    if let Some(out_path) = out_path {
        write_graph(out_path, graph, None)?;
    }

    Ok(bytes)
}

/// Publish report, identifier map and, when every record was created, the
/// graph with store ids.
pub fn write_publish(
    paths: &RunPaths,
    graph: &RecordGraph,
    ids: &IdentifierMap,
    report: &PublishReport,
) -> RegistryResult<()> {
    write_json(&paths.publish_report_path, report)?;
    std::fs::write(&paths.publish_summary_path, render_summary(report))?;
    write_json(&paths.identifiers_path, &ids.to_entries())?;
    if report.is_success() {
        write_graph(&paths.published_path, graph, Some(ids))?;
    }
    Ok(())
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_directory_holds_config_and_logs() {
        let run_dir = std::env::temp_dir().join(format!("fhirseed_runs_{}", uuid::Uuid::new_v4()));
        let ctx = RunContext {
            run_id: "abc".to_string(),
            started_at: Utc::now(),
            command: "generate".to_string(),
            run_dir: run_dir.clone(),
            options: RunOptions {
                config_path: None,
                seed: Some(1),
                version: FhirVersion::R5,
                reference_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                input: None,
                base_url: None,
                publish: None,
            },
        };

        let paths = start_run(&ctx).unwrap();
        assert!(paths.root.ends_with(format!(
            "{}__run_abc",
            ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ")
        )));
        assert!(paths.logs_path.exists());
        let config: serde_json::Value =
            serde_json::from_slice(&std::fs::read(paths.root.join("config.json")).unwrap()).unwrap();
        assert_eq!(config["options"]["version"], "R5");
        assert_eq!(config["command"], "generate");

        std::fs::remove_dir_all(&run_dir).ok();
    }
}
