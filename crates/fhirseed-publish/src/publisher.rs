use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use fhirseed_core::{
    DependencyGraph, EntityKind, IdentifierMap, LocalId, RecordGraph, Reference, validate_graph,
    validate_links,
};

use crate::errors::PublishError;
use crate::model::{OnError, PublishOptions};
use crate::report::{
    FailureClass, KindOutcome, PublishFailure, PublishReport, PublishWarning, VerificationFinding,
};
use crate::transport::{Created, Issue, Severity, StoreError, StoreTransport};

/// Appointments inspected after publishing.
const VERIFY_SAMPLE: usize = 3;

/// Lifecycle of one record during a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Not submitted (yet, or ever after an abort).
    Pending,
    /// The store assigned an id and the identifier map holds it.
    Created,
    /// Created, with every reference field carrying a store id.
    Linked,
    Failed,
}

/// Graph with linked references, the identifier map and the report.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub graph: RecordGraph,
    pub ids: IdentifierMap,
    pub states: BTreeMap<Reference, RecordState>,
    pub report: PublishReport,
}

impl PublishOutcome {
    pub fn state(&self, record: &Reference) -> Option<RecordState> {
        self.states.get(record).copied()
    }
}

/// Store response for one record, validation included.
struct Submission {
    local_id: LocalId,
    validation: Vec<Issue>,
    result: Result<Created, StoreError>,
}

/// Mutable run state shared by every kind.
struct Run {
    ids: IdentifierMap,
    states: BTreeMap<Reference, RecordState>,
    report: PublishReport,
}

/// Publishes a record graph kind by kind in dependency order.
pub struct Publisher {
    transport: Arc<dyn StoreTransport>,
    options: PublishOptions,
    dag: DependencyGraph,
}

impl Publisher {
    pub fn new(transport: Arc<dyn StoreTransport>, options: PublishOptions) -> Self {
        Self {
            transport,
            options,
            dag: DependencyGraph::healthcare(),
        }
    }

    /// Publish against a different kind-level DAG.
    pub fn with_dag(mut self, dag: DependencyGraph) -> Self {
        self.dag = dag;
        self
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    pub async fn publish(&self, mut graph: RecordGraph) -> Result<PublishOutcome, PublishError> {
        if self.options.concurrency == 0 {
            return Err(PublishError::Options(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.options.timeout_secs == 0 {
            return Err(PublishError::Options(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if let Some(kind) = graph.kinds().find(|kind| !self.dag.contains(*kind)) {
            return Err(PublishError::Options(format!(
                "{kind} records present but {kind} is not in the dependency graph"
            )));
        }
        validate_graph(&graph, &self.dag)?;

        let start = Instant::now();
        let order = self.dag.publish_order()?;
        let mut run = Run {
            ids: IdentifierMap::new(),
            states: graph
                .iter()
                .map(|record| (record.handle(), RecordState::Pending))
                .collect(),
            report: PublishReport::new(),
        };

        info!(
            records = graph.len(),
            kinds = graph.kinds().count(),
            concurrency = self.options.concurrency,
            on_error = ?self.options.on_error,
            validate = self.options.validate,
            "publish started"
        );
        run.report.probe_ok = self.probe().await;

        for kind in order {
            let total = graph.count(kind);
            if total == 0 {
                continue;
            }
            let mut outcome = KindOutcome {
                kind,
                key: kind.plural().to_string(),
                created: 0,
                failed: 0,
                skipped: 0,
            };
            if run.report.aborted {
                outcome.skipped = total;
            } else {
                self.publish_kind(kind, &mut graph, &mut run, &mut outcome)
                    .await?;
                info!(
                    kind = %kind,
                    created = outcome.created,
                    failed = outcome.failed,
                    skipped = outcome.skipped,
                    "kind published"
                );
            }
            run.report.kinds.push(outcome);
        }

        validate_links(&graph, &run.ids)?;

        if self.options.verify && !run.report.aborted && graph.count(EntityKind::Appointment) > 0 {
            self.verify(&mut run.report).await;
        }

        let Run {
            ids,
            states,
            mut report,
        } = run;
        report.created_total = ids.len();
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            created = report.created_total,
            failures = report.failures.len(),
            warnings = report.warnings.len(),
            aborted = report.aborted,
            duration_ms = report.duration_ms,
            "publish finished"
        );

        Ok(PublishOutcome {
            graph,
            ids,
            states,
            report,
        })
    }

    /// Link every record of `kind` against the map, then submit the ones
    /// whose references all resolved, in assembly order.
    async fn publish_kind(
        &self,
        kind: EntityKind,
        graph: &mut RecordGraph,
        run: &mut Run,
        outcome: &mut KindOutcome,
    ) -> Result<(), PublishError> {
        let mut queue = Vec::new();
        let mut failed = false;
        for record in graph.records_mut(kind) {
            record.link_references(&run.ids)?;
            if let Some(field) = record.references.iter().find(|field| !field.is_linked()) {
                let diagnostic = format!("{} points at {}, which was never created", field.path, field.target);
                self.fail(
                    run,
                    outcome,
                    record.handle(),
                    FailureClass::DependencyFailed,
                    diagnostic,
                    None,
                );
                failed = true;
                continue;
            }
            queue.push((record.local_id.clone(), record.render_for_store()?));
        }
        if failed && self.options.on_error == OnError::Abort {
            outcome.skipped += queue.len();
            run.report.aborted = true;
            return Ok(());
        }

        let mut queue = queue.into_iter();
        let mut tasks = JoinSet::new();
        let mut halted = false;
        loop {
            while !halted && tasks.len() < self.options.concurrency {
                let Some((local_id, payload)) = queue.next() else {
                    break;
                };
                let transport = Arc::clone(&self.transport);
                let timeout = self.options.timeout();
                let validate = self.options.validate;
                tasks.spawn(async move {
                    submit(transport.as_ref(), kind, local_id, payload, timeout, validate).await
                });
            }
            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let submission = joined.map_err(|err| PublishError::Task(err.to_string()))?;
            let ok = self.record_submission(kind, submission, run, outcome)?;
            if !ok && self.options.on_error == OnError::Abort {
                halted = true;
            }
        }

        if halted {
            outcome.skipped += queue.len();
            run.report.aborted = true;
        }
        Ok(())
    }

    /// Apply one store response. Returns false when the record failed.
    ///
    /// Only fully linked records are submitted, so a created record is linked.
    fn record_submission(
        &self,
        kind: EntityKind,
        submission: Submission,
        run: &mut Run,
        outcome: &mut KindOutcome,
    ) -> Result<bool, PublishError> {
        let Submission {
            local_id,
            validation,
            result,
        } = submission;
        let handle = Reference::new(kind, local_id.clone());

        for issue in validation {
            if issue.severity != Severity::Information {
                warn!(kind = %kind, local_id = %local_id, diagnostic = %issue.diagnostics, "validation issue");
                self.keep_warning(&mut run.report, &handle, "validate", issue);
            }
        }

        let created = match result {
            Ok(created) => created,
            Err(err) => {
                let (class, issue) = match &err {
                    StoreError::Rejection { issues } => (
                        FailureClass::StoreRejection,
                        issues
                            .iter()
                            .find(|issue| issue.severity == Severity::Error)
                            .or_else(|| issues.first())
                            .cloned(),
                    ),
                    _ => (FailureClass::TransportFailure, None),
                };
                self.fail(run, outcome, handle, class, err.to_string(), issue);
                return Ok(false);
            }
        };

        if let Some(issue) = created
            .issues
            .iter()
            .find(|issue| issue.severity == Severity::Error)
        {
            let diagnostic = issue.diagnostics.clone();
            self.fail(
                run,
                outcome,
                handle,
                FailureClass::StoreRejection,
                diagnostic,
                Some(issue.clone()),
            );
            return Ok(false);
        }
        for issue in created.issues {
            if issue.severity == Severity::Warning {
                self.keep_warning(&mut run.report, &handle, "create", issue);
            }
        }

        debug!(kind = %kind, local_id = %local_id, store_id = %created.store_id, "record created");
        run.ids.insert(kind, local_id, created.store_id)?;
        run.states.insert(handle, RecordState::Linked);
        outcome.created += 1;
        Ok(true)
    }

    fn fail(
        &self,
        run: &mut Run,
        outcome: &mut KindOutcome,
        record: Reference,
        class: FailureClass,
        diagnostic: String,
        issue: Option<Issue>,
    ) {
        warn!(
            kind = %record.kind,
            local_id = %record.local_id,
            class = ?class,
            diagnostic = %diagnostic,
            "record failed"
        );
        run.report.failures.push(PublishFailure {
            kind: record.kind,
            local_id: record.local_id.to_string(),
            class,
            diagnostic,
            issue,
        });
        run.states.insert(record, RecordState::Failed);
        outcome.failed += 1;
    }

    fn keep_warning(&self, report: &mut PublishReport, record: &Reference, stage: &str, issue: Issue) {
        if self.options.is_ignored(&issue.diagnostics) {
            return;
        }
        report.warnings.push(PublishWarning {
            kind: record.kind,
            local_id: record.local_id.to_string(),
            stage: stage.to_string(),
            diagnostic: issue.diagnostics,
            path: issue.path,
        });
    }

    /// Cheap search to see whether the store answers. Never fatal.
    async fn probe(&self) -> bool {
        let search = self
            .transport
            .search(EntityKind::Patient, &[("_count", "1")]);
        match tokio::time::timeout(self.options.timeout(), search).await {
            Ok(Ok(_)) => {
                debug!("store probe succeeded");
                true
            }
            Ok(Err(err)) => {
                warn!(error = %err, "store probe failed; publishing anyway");
                false
            }
            Err(_) => {
                warn!(timeout_secs = self.options.timeout_secs, "store probe timed out; publishing anyway");
                false
            }
        }
    }

    /// Check that published appointments carry participants.
    async fn verify(&self, report: &mut PublishReport) {
        let search = self.transport.search(EntityKind::Appointment, &[]);
        let appointments = match tokio::time::timeout(self.options.timeout(), search).await {
            Ok(Ok(appointments)) => appointments,
            Ok(Err(err)) => {
                push_finding(report, "verification_failed", err.to_string());
                return;
            }
            Err(_) => {
                push_finding(report, "verification_failed", "appointment search timed out".to_string());
                return;
            }
        };

        if appointments.is_empty() {
            push_finding(report, "no_appointments", "the store returned no appointments".to_string());
            return;
        }
        for appointment in appointments.iter().take(VERIFY_SAMPLE) {
            let id = appointment.get("id").and_then(Value::as_str).unwrap_or("?");
            let participants = appointment
                .get("participant")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            if participants == 0 {
                push_finding(
                    report,
                    "appointment_without_participants",
                    format!("Appointment/{id} has no participants"),
                );
            } else {
                debug!(appointment = id, participants, "appointment verified");
            }
        }
    }
}

fn push_finding(report: &mut PublishReport, code: &str, message: String) {
    warn!(code, message = %message, "verification finding");
    report.verification.push(VerificationFinding {
        code: code.to_string(),
        message,
    });
}

async fn submit(
    transport: &dyn StoreTransport,
    kind: EntityKind,
    local_id: LocalId,
    payload: Value,
    timeout: Duration,
    validate: bool,
) -> Submission {
    let mut validation = Vec::new();
    if validate {
        match tokio::time::timeout(timeout, transport.validate(kind, &payload)).await {
            Ok(Ok(issues)) => validation = issues,
            Ok(Err(err)) => {
                validation.push(Issue::warning(format!("validation request failed: {err}")))
            }
            Err(_) => validation.push(Issue::warning(format!(
                "validation timed out after {timeout:?}"
            ))),
        }
    }

    let result = match tokio::time::timeout(timeout, transport.create(kind, &payload)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    };
    Submission {
        local_id,
        validation,
        result,
    }
}
