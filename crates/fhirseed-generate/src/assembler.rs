use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use fhirseed_core::{DependencyGraph, EntityKind, Record, RecordGraph, Reference, validate_graph};
use fhirseed_plan::{DependentKind, GeneratorConfig, LinkKind, SubjectOverride};

use crate::catalog::Catalog;
use crate::errors::GenerationError;
use crate::factory::{Links, Preset, RecordFactory};
use crate::model::{DEFAULT_SEED, GenerateOptions, GenerationIssue, GenerationReport, KindReport};
use crate::output::json::GraphDocument;
use crate::planner::QuantityPlanner;
use crate::pools::Pools;

/// Most observations a diagnostic report cites.
const REPORT_RESULTS: usize = 3;

/// Assembled graph plus its report.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub graph: RecordGraph,
    pub report: GenerationReport,
}

/// Builds the whole record graph from a configuration.
pub struct GraphAssembler<'a> {
    catalog: &'a dyn Catalog,
    options: GenerateOptions,
}

/// Records built so far for the current subject.
#[derive(Default)]
struct SubjectRecords {
    conditions: Vec<Reference>,
    encounters: Vec<Reference>,
    observations: Vec<Reference>,
    medication_requests: Vec<Reference>,
}

struct SubjectContext<'s> {
    subject: Reference,
    preset: Option<&'s SubjectOverride>,
    built: SubjectRecords,
}

impl<'a> GraphAssembler<'a> {
    pub fn new(catalog: &'a dyn Catalog, options: GenerateOptions) -> Self {
        Self { catalog, options }
    }

    pub fn assemble(&self, config: &GeneratorConfig) -> Result<Assembly, GenerationError> {
        let start = Instant::now();
        let seed = self.options.seed.or(config.seed).unwrap_or(DEFAULT_SEED);
        let version = self.options.version;
        let planner = QuantityPlanner::new(config)?;
        let subjects = config.subject_count();
        check_pools(config, subjects)?;

        let dag = DependencyGraph::healthcare();
        let order = dependent_order(&dag)?;
        let factory = RecordFactory::new(self.catalog, version, self.options.reference_date);
        let mut graph = RecordGraph::new(version);
        let mut report = GenerationReport::new(seed, version, self.options.reference_date);

        info!(
            seed,
            version = %version,
            subjects,
            clinics = config.base_counts.clinics,
            practitioners = config.base_counts.practitioners,
            "generation started"
        );

        let pools = self.build_pools(config, &factory, seed, &mut graph)?;

        let subject_seed = hash_seed(seed, "subjects");
        let mut patients: Vec<Reference> = Vec::with_capacity(subjects as usize);
        for index in 0..u64::from(subjects) {
            let mut rng = ChaCha8Rng::seed_from_u64(hash_row_seed(subject_seed, index));
            let preset = config.overrides().get(index as usize);
            let patient = factory.build(
                EntityKind::Patient,
                &Links::default(),
                preset.map(Preset::Subject),
                &mut rng,
            )?;
            let subject = patient.handle();
            graph.push(patient);
            patients.push(subject.clone());

            let mut context = SubjectContext {
                subject,
                preset,
                built: SubjectRecords::default(),
            };
            for kind in &order {
                let count = planner.plan(*kind, preset, &mut rng);
                for position in 0..count as usize {
                    self.build_dependent(
                        *kind,
                        position,
                        &mut context,
                        &factory,
                        &planner,
                        &pools,
                        &patients,
                        &mut graph,
                        &mut report,
                        &mut rng,
                    )?;
                }
            }
            debug!(
                subject = %context.subject.local_id,
                index,
                encounters = context.built.encounters.len(),
                observations = context.built.observations.len(),
                "subject assembled"
            );
        }

        validate_graph(&graph, &dag)?;

        report.subjects = subjects;
        summarize(&graph, &dag, &mut report)?;
        report.fingerprint = fingerprint(&graph)?;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            records = report.records_total,
            references = report.references_total,
            fingerprint = %report.fingerprint,
            duration_ms = report.duration_ms,
            "generation completed"
        );

        Ok(Assembly { graph, report })
    }

    fn build_pools(
        &self,
        config: &GeneratorConfig,
        factory: &RecordFactory<'_>,
        seed: u64,
        graph: &mut RecordGraph,
    ) -> Result<Pools, GenerationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(seed, "pools"));
        let mut pools = Pools::new();

        for _ in 0..config.base_counts.clinics {
            let organization =
                factory.build(EntityKind::Organization, &Links::default(), None, &mut rng)?;
            let links = Links {
                organization: Some(organization.handle()),
                ..Links::default()
            };
            let location = factory.build(EntityKind::Location, &links, None, &mut rng)?;
            pools.ingest(&location);
            graph.push(organization);
            graph.push(location);
        }
        for _ in 0..config.base_counts.practitioners {
            let practitioner =
                factory.build(EntityKind::Practitioner, &Links::default(), None, &mut rng)?;
            pools.ingest(&practitioner);
            graph.push(practitioner);
        }

        Ok(pools)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_dependent(
        &self,
        kind: DependentKind,
        position: usize,
        context: &mut SubjectContext<'_>,
        factory: &RecordFactory<'_>,
        planner: &QuantityPlanner,
        pools: &Pools,
        patients: &[Reference],
        graph: &mut RecordGraph,
        report: &mut GenerationReport,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), GenerationError> {
        let mut links = Links::subject(context.subject.clone());
        let mut preset = None;

        match kind {
            DependentKind::Conditions => {
                preset = context
                    .preset
                    .and_then(|item| item.conditions.get(position))
                    .map(Preset::Condition);
            }
            DependentKind::FamilyMemberHistories => {}
            DependentKind::MedicationRequests => {
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                preset = context
                    .preset
                    .and_then(|item| item.medications.get(position))
                    .map(Preset::Medication);
            }
            DependentKind::AllergyIntolerances => {
                let practitioner = pools.pick_practitioner(rng)?;
                if planner.draw_link(kind, LinkKind::Practitioner, rng) {
                    links.practitioner = Some(practitioner);
                }
                preset = context
                    .preset
                    .and_then(|item| item.allergies.get(position))
                    .map(Preset::Allergy);
            }
            DependentKind::Appointments => {
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                links.location = Some(pools.pick_clinic(rng)?.location);
            }
            DependentKind::Procedures => {
                links.practitioner = Some(pools.pick_practitioner(rng)?);
            }
            DependentKind::Encounters => {
                let clinic = pools.pick_clinic(rng)?;
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                links.location = Some(clinic.location);
                links.organization = Some(clinic.organization);
                let encounter = factory.build(EntityKind::Encounter, &links, None, rng)?;
                let handle = encounter.handle();
                graph.push(encounter);
                context.built.encounters.push(handle.clone());

                if planner.draw_link(kind, LinkKind::DocumentReference, rng) {
                    let binary = factory.build(EntityKind::Binary, &Links::default(), None, rng)?;
                    links.encounter = Some(handle);
                    links.binary = Some(binary.handle());
                    let document =
                        factory.build(EntityKind::DocumentReference, &links, None, rng)?;
                    graph.push(binary);
                    graph.push(document);
                }
                return Ok(());
            }
            DependentKind::Observations
            | DependentKind::ServiceRequests
            | DependentKind::ClinicalImpressions => {
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                links.encounter = optional_pick(planner, kind, LinkKind::Encounter, &context.built.encounters, rng);
            }
            DependentKind::DiagnosticReports => {
                if context.built.encounters.is_empty() {
                    report.record_warning(GenerationIssue {
                        code: "diagnostic_report_skipped".to_string(),
                        message: "diagnostic reports need an encounter; none was built".to_string(),
                        subject: Some(context.subject.local_id.to_string()),
                        kind: Some(EntityKind::DiagnosticReport),
                    });
                    return Ok(());
                }
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                links.encounter = Some(pick(&context.built.encounters, rng));
                let amount = REPORT_RESULTS.min(context.built.observations.len());
                let mut chosen: Vec<usize> =
                    rand::seq::index::sample(rng, context.built.observations.len(), amount)
                        .into_vec();
                chosen.sort_unstable();
                links.observations = chosen
                    .into_iter()
                    .map(|index| context.built.observations[index].clone())
                    .collect();
            }
            DependentKind::Immunizations => {
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                links.encounter = optional_pick(planner, kind, LinkKind::Encounter, &context.built.encounters, rng);
                let clinic = pools.pick_clinic(rng)?;
                if planner.draw_link(kind, LinkKind::Location, rng) {
                    links.location = Some(clinic.location);
                }
            }
            DependentKind::MedicationAdministrations => {
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                links.encounter = optional_pick(planner, kind, LinkKind::Encounter, &context.built.encounters, rng);
                links.medication_request = optional_pick(
                    planner,
                    kind,
                    LinkKind::MedicationRequest,
                    &context.built.medication_requests,
                    rng,
                );
            }
            DependentKind::CarePlans => {
                links.practitioner = Some(pools.pick_practitioner(rng)?);
                links.encounter = optional_pick(planner, kind, LinkKind::Encounter, &context.built.encounters, rng);
                links.condition = optional_pick(
                    planner,
                    kind,
                    LinkKind::Condition,
                    &context.built.conditions,
                    rng,
                );
            }
            DependentKind::Coverages => {
                links.organization = Some(pools.pick_clinic(rng)?.organization);
                links.policy_holder =
                    optional_pick(planner, kind, LinkKind::PolicyHolder, patients, rng);
            }
        }

        let record = factory.build(kind.entity_kind(), &links, preset, rng)?;
        remember(&mut context.built, &record);
        graph.push(record);
        Ok(())
    }
}

/// Draw the link gate, then a uniform pick when the gate passes and there
/// is something to point at.
fn optional_pick(
    planner: &QuantityPlanner,
    kind: DependentKind,
    link: LinkKind,
    candidates: &[Reference],
    rng: &mut ChaCha8Rng,
) -> Option<Reference> {
    if planner.draw_link(kind, link, rng) && !candidates.is_empty() {
        Some(pick(candidates, rng))
    } else {
        None
    }
}

fn pick(candidates: &[Reference], rng: &mut ChaCha8Rng) -> Reference {
    candidates[rng.random_range(0..candidates.len())].clone()
}

fn remember(built: &mut SubjectRecords, record: &Record) {
    let slot = match record.kind {
        EntityKind::Condition => &mut built.conditions,
        EntityKind::Observation => &mut built.observations,
        EntityKind::MedicationRequest => &mut built.medication_requests,
        _ => return,
    };
    slot.push(record.handle());
}

fn check_pools(config: &GeneratorConfig, subjects: u32) -> Result<(), GenerationError> {
    if subjects == 0 {
        return Ok(());
    }
    if config.base_counts.clinics == 0 {
        return Err(GenerationError::Configuration(
            "base_counts.clinics must be at least 1 when subjects are built".to_string(),
        ));
    }
    if config.base_counts.practitioners == 0 {
        return Err(GenerationError::Configuration(
            "base_counts.practitioners must be at least 1 when subjects are built".to_string(),
        ));
    }
    Ok(())
}

/// Dependent kinds in publish order. Binary and DocumentReference are
/// built alongside each encounter.
fn dependent_order(dag: &DependencyGraph) -> Result<Vec<DependentKind>, GenerationError> {
    Ok(dag
        .publish_order()?
        .into_iter()
        .filter_map(DependentKind::from_entity_kind)
        .collect())
}

fn summarize(
    graph: &RecordGraph,
    dag: &DependencyGraph,
    report: &mut GenerationReport,
) -> Result<(), GenerationError> {
    for kind in dag.publish_order()? {
        let records = graph.records(kind);
        if records.is_empty() {
            continue;
        }
        report.kinds.push(KindReport {
            kind,
            key: kind.plural().to_string(),
            records: records.len(),
            references: records.iter().map(|record| record.references.len()).sum(),
        });
    }
    report.records_total = graph.len();
    report.references_total = report.kinds.iter().map(|entry| entry.references).sum();
    report.edges = graph.edges().iter().copied().collect();
    Ok(())
}

fn fingerprint(graph: &RecordGraph) -> Result<String, GenerationError> {
    let data = GraphDocument::render(graph, None)?.to_vec_pretty()?;
    Ok(hex::encode(Sha256::digest(&data)))
}

fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn hash_row_seed(subject_seed: u64, row_index: u64) -> u64 {
    (subject_seed ^ row_index.wrapping_mul(0x9e3779b97f4a7c15)).wrapping_mul(0x100000001b3)
}
