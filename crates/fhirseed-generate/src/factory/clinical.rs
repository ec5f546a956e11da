use base64::{Engine as _, engine::general_purpose};
use chrono::Duration;
use fake::Fake;
use fake::faker::name::en::FirstName;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Value, json};

use fhirseed_core::{EntityKind, FieldPath, Record, ReferenceField};
use fhirseed_plan::{AllergySpec, ConditionSpec, MedicationSpec};

use super::values::{self, UCUM, concept, fixed_concept, instant, instant_within, pick, round1};
use super::{Links, RecordFactory, link, link_optional, require, set};
use crate::catalog::{
    CatalogTable, CategorizedCoding, Coding, MedicationEntry, ObservationEntry, RelationshipEntry,
    draw, draw_distinct,
};
use crate::errors::GenerationError;

const ICD10: &str = "http://hl7.org/fhir/sid/icd-10-cm";
const CONDITION_CLINICAL: &str = "http://terminology.hl7.org/CodeSystem/condition-clinical";
const CONDITION_VERIFICATION: &str = "http://terminology.hl7.org/CodeSystem/condition-ver-status";
const ALLERGY_CLINICAL: &str = "http://terminology.hl7.org/CodeSystem/allergyintolerance-clinical";
const ALLERGY_VERIFICATION: &str =
    "http://terminology.hl7.org/CodeSystem/allergyintolerance-verification";
const OBSERVATION_CATEGORY: &str = "http://terminology.hl7.org/CodeSystem/observation-category";
const INTERPRETATION: &str = "http://terminology.hl7.org/CodeSystem/v3-ObservationInterpretation";
const DIAGNOSTIC_SERVICE: &str = "http://terminology.hl7.org/CodeSystem/v2-0074";

impl RecordFactory<'_> {
    pub(super) fn condition(
        &self,
        links: &Links,
        preset: Option<&ConditionSpec>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::Condition, "subject", &links.subject)?;
        let mut record = self.start(EntityKind::Condition, rng);
        let drawn: Coding = draw(self.catalog, CatalogTable::Conditions, rng)?;
        let onset = values::date_within(rng, self.reference_date, 3650);
        let status = pick(rng, &["active", "active", "recurrence", "remission"]);

        let code = match preset {
            Some(spec) => Coding {
                system: ICD10.to_string(),
                code: spec.code.clone(),
                display: spec.display.clone(),
            },
            None => drawn,
        };

        set(
            &mut record,
            "clinicalStatus",
            fixed_concept(CONDITION_CLINICAL, status, status),
        );
        set(
            &mut record,
            "verificationStatus",
            fixed_concept(CONDITION_VERIFICATION, "confirmed", "Confirmed"),
        );
        set(
            &mut record,
            "category",
            json!([fixed_concept(
                "http://terminology.hl7.org/CodeSystem/condition-category",
                "problem-list-item",
                "Problem List Item"
            )]),
        );
        set(&mut record, "code", concept(&code));
        set(&mut record, "onsetDateTime", json!(onset.to_string()));
        set(&mut record, "recordedDate", json!(onset.to_string()));
        link(&mut record, FieldPath::key("subject"), subject);
        Ok(record)
    }

    pub(super) fn appointment(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::Appointment, "subject", &links.subject)?;
        let practitioner = require(EntityKind::Appointment, "practitioner", &links.practitioner)?;
        let location = require(EntityKind::Appointment, "location", &links.location)?;
        let mut record = self.start(EntityKind::Appointment, rng);
        let reason: Coding = draw(self.catalog, CatalogTable::EncounterReasons, rng)?;
        let start = instant_within(rng, self.reference_date + Duration::days(90), 180);
        let minutes = [15_i64, 30, 45, 60][rng.random_range(0..4)];
        let status = pick(rng, &["booked", "fulfilled", "arrived", "checked-in"]);

        let (reason_key, reason_value) = self.mapper.reason(vec![concept(&reason)]);
        set(&mut record, "status", json!(status));
        set(&mut record, reason_key, reason_value);
        set(
            &mut record,
            "description",
            json!(format!("Visit for {}", reason.display.to_lowercase())),
        );
        set(&mut record, "start", json!(instant(start)));
        set(
            &mut record,
            "end",
            json!(instant(start + Duration::minutes(minutes))),
        );
        set(&mut record, "minutesDuration", json!(minutes));
        set(
            &mut record,
            "participant",
            json!([
                {"required": "required", "status": "accepted"},
                {"required": "required", "status": "accepted"},
                {"required": "required", "status": "accepted"}
            ]),
        );
        for (index, target) in [subject, practitioner, location].into_iter().enumerate() {
            link(
                &mut record,
                FieldPath::key("participant").index(index).field("actor"),
                target,
            );
        }
        Ok(record)
    }

    pub(super) fn medication_request(
        &self,
        links: &Links,
        preset: Option<&MedicationSpec>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::MedicationRequest, "subject", &links.subject)?;
        let practitioner =
            require(EntityKind::MedicationRequest, "practitioner", &links.practitioner)?;
        let mut record = self.start(EntityKind::MedicationRequest, rng);
        let medication: MedicationEntry = draw(self.catalog, CatalogTable::Medications, rng)?;
        let authored = values::date_within(rng, self.reference_date, 365);
        let refills: u32 = rng.random_range(0..=3);

        let text = preset
            .map(|spec| spec.name.clone())
            .unwrap_or_else(|| medication.name.clone());
        let (medication_key, medication_value) = self.mapper.medication(values::text_concept(&text));
        set(&mut record, "status", json!("active"));
        set(&mut record, "intent", json!("order"));
        set(&mut record, medication_key, medication_value);
        set(&mut record, "authoredOn", json!(authored.to_string()));
        set(&mut record, "dosageInstruction", dosage(&medication));
        set(
            &mut record,
            "dispenseRequest",
            json!({"numberOfRepeatsAllowed": refills}),
        );
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, FieldPath::key("requester"), practitioner);
        Ok(record)
    }

    pub(super) fn procedure(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::Procedure, "subject", &links.subject)?;
        let practitioner = require(EntityKind::Procedure, "practitioner", &links.practitioner)?;
        let mut record = self.start(EntityKind::Procedure, rng);
        let code: Coding = draw(self.catalog, CatalogTable::Procedures, rng)?;
        let performed = instant_within(rng, self.reference_date, 730);

        set(&mut record, "status", json!("completed"));
        set(&mut record, "code", concept(&code));
        set(&mut record, self.mapper.procedure_time(), json!(instant(performed)));
        link(&mut record, FieldPath::key("subject"), subject);
        link(
            &mut record,
            FieldPath::key("performer").index(0).field("actor"),
            practitioner,
        );
        Ok(record)
    }

    pub(super) fn encounter(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::Encounter, "subject", &links.subject)?;
        let practitioner = require(EntityKind::Encounter, "practitioner", &links.practitioner)?;
        let location = require(EntityKind::Encounter, "location", &links.location)?;
        let organization = require(EntityKind::Encounter, "organization", &links.organization)?;
        let mut record = self.start(EntityKind::Encounter, rng);
        let class: Coding = draw(self.catalog, CatalogTable::EncounterClasses, rng)?;
        let kind: Coding = draw(self.catalog, CatalogTable::EncounterTypes, rng)?;
        let reason: Coding = draw(self.catalog, CatalogTable::EncounterReasons, rng)?;
        let start = instant_within(rng, self.reference_date, 365);
        let minutes: i64 = rng.random_range(15..=240);

        let (reason_key, reason_value) = self.mapper.encounter_reason(vec![concept(&reason)]);
        set(&mut record, "status", json!(self.mapper.encounter_status()));
        set(&mut record, "class", self.mapper.encounter_class(values::coding(&class)));
        set(&mut record, "type", json!([concept(&kind)]));
        set(&mut record, reason_key, reason_value);
        set(
            &mut record,
            "period",
            json!({
                "start": instant(start),
                "end": instant(start + Duration::minutes(minutes))
            }),
        );
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, self.mapper.encounter_practitioner(), practitioner);
        link(
            &mut record,
            FieldPath::key("location").index(0).field("location"),
            location,
        );
        link(&mut record, FieldPath::key("serviceProvider"), organization);
        Ok(record)
    }

    pub(super) fn binary(&self, rng: &mut ChaCha8Rng) -> Result<Record, GenerationError> {
        let mut record = self.start(EntityKind::Binary, rng);
        let note: Coding = draw(self.catalog, CatalogTable::DocumentTypes, rng)?;
        let reason: Coding = draw(self.catalog, CatalogTable::EncounterReasons, rng)?;
        let written = instant_within(rng, self.reference_date, 365);
        let follow_up: u32 = rng.random_range(1..=12);

        let text = format!(
            "{}\nDate: {}\nReason for visit: {}\nAssessment: stable.\nPlan: follow up in {} weeks.\n",
            note.display,
            instant(written),
            reason.display,
            follow_up
        );
        set(&mut record, "contentType", json!("text/plain"));
        set(
            &mut record,
            "data",
            json!(general_purpose::STANDARD.encode(text.as_bytes())),
        );
        Ok(record)
    }

    pub(super) fn document_reference(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let kind = EntityKind::DocumentReference;
        let subject = require(kind, "subject", &links.subject)?;
        let practitioner = require(kind, "practitioner", &links.practitioner)?;
        let encounter = require(kind, "encounter", &links.encounter)?;
        let binary = require(kind, "binary", &links.binary)?;
        let mut record = self.start(kind, rng);
        let document: Coding = draw(self.catalog, CatalogTable::DocumentTypes, rng)?;
        let date = instant_within(rng, self.reference_date, 365);

        set(&mut record, "status", json!("current"));
        set(&mut record, "type", concept(&document));
        set(&mut record, "date", json!(instant(date)));
        set(
            &mut record,
            "content",
            json!([{"attachment": {"contentType": "text/plain", "title": document.display}}]),
        );
        if let Some(mode) = self.mapper.attestation_mode() {
            set(&mut record, "attester", json!([{"mode": mode}]));
        }
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, FieldPath::key("author").index(0), practitioner);
        link(&mut record, self.mapper.document_attester(), practitioner);
        link(&mut record, self.mapper.document_encounter(), encounter);
        record.references.push(ReferenceField::url(
            FieldPath::key("content")
                .index(0)
                .field("attachment")
                .field("url"),
            binary.clone(),
        ));
        Ok(record)
    }

    pub(super) fn observation(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::Observation, "subject", &links.subject)?;
        let practitioner = require(EntityKind::Observation, "practitioner", &links.practitioner)?;
        let mut record = self.start(EntityKind::Observation, rng);
        let entry: ObservationEntry = draw(self.catalog, CatalogTable::Observations, rng)?;
        let value = round1(rng.random_range(entry.min..=entry.max));
        let effective = instant_within(rng, self.reference_date, 365);

        let (code, display) = if value < entry.low {
            ("L", "Low")
        } else if value > entry.high {
            ("H", "High")
        } else {
            ("N", "Normal")
        };
        set(&mut record, "status", json!("final"));
        set(
            &mut record,
            "category",
            json!([fixed_concept(OBSERVATION_CATEGORY, &entry.category, &entry.category)]),
        );
        set(&mut record, "code", concept(&entry.coding));
        set(&mut record, "effectiveDateTime", json!(instant(effective)));
        set(
            &mut record,
            "valueQuantity",
            quantity(value, &entry.unit),
        );
        set(
            &mut record,
            "interpretation",
            json!([fixed_concept(INTERPRETATION, code, display)]),
        );
        set(
            &mut record,
            "referenceRange",
            json!([{"low": quantity(entry.low, &entry.unit), "high": quantity(entry.high, &entry.unit)}]),
        );
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, FieldPath::key("performer").index(0), practitioner);
        link_optional(&mut record, FieldPath::key("encounter"), links.encounter.as_ref());
        Ok(record)
    }

    pub(super) fn diagnostic_report(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let kind = EntityKind::DiagnosticReport;
        let subject = require(kind, "subject", &links.subject)?;
        let practitioner = require(kind, "practitioner", &links.practitioner)?;
        let encounter = require(kind, "encounter", &links.encounter)?;
        let mut record = self.start(kind, rng);
        let report: CategorizedCoding = draw(self.catalog, CatalogTable::DiagnosticReports, rng)?;
        let effective = instant_within(rng, self.reference_date, 365);
        let turnaround: i64 = rng.random_range(1..=72);
        let conclusion = pick(
            rng,
            &[
                "Results within normal limits.",
                "Mild abnormalities noted; clinical correlation advised.",
                "Findings consistent with known condition.",
            ],
        );

        set(&mut record, "status", json!("final"));
        set(
            &mut record,
            "category",
            json!([fixed_concept(DIAGNOSTIC_SERVICE, &report.category, &report.category)]),
        );
        set(&mut record, "code", concept(&report.coding));
        set(&mut record, "effectiveDateTime", json!(instant(effective)));
        set(
            &mut record,
            "issued",
            json!(instant(effective + Duration::hours(turnaround))),
        );
        set(&mut record, "conclusion", json!(conclusion));
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, FieldPath::key("encounter"), encounter);
        link(&mut record, FieldPath::key("performer").index(0), practitioner);
        for (index, observation) in links.observations.iter().enumerate() {
            link(&mut record, FieldPath::key("result").index(index), observation);
        }
        Ok(record)
    }

    pub(super) fn service_request(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::ServiceRequest, "subject", &links.subject)?;
        let practitioner =
            require(EntityKind::ServiceRequest, "practitioner", &links.practitioner)?;
        let mut record = self.start(EntityKind::ServiceRequest, rng);
        let code: Coding = draw(self.catalog, CatalogTable::ServiceRequests, rng)?;
        let reason: Coding = draw(self.catalog, CatalogTable::EncounterReasons, rng)?;
        let authored = instant_within(rng, self.reference_date, 365);
        let priority = pick(rng, &["routine", "routine", "urgent", "asap"]);

        let (reason_key, reason_value) = self.mapper.reason(vec![concept(&reason)]);
        set(&mut record, "status", json!("active"));
        set(&mut record, "intent", json!("order"));
        set(&mut record, "priority", json!(priority));
        set(&mut record, "code", self.mapper.service_request_code(concept(&code)));
        set(&mut record, reason_key, reason_value);
        set(&mut record, "authoredOn", json!(instant(authored)));
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, FieldPath::key("requester"), practitioner);
        link_optional(&mut record, FieldPath::key("encounter"), links.encounter.as_ref());
        Ok(record)
    }

    pub(super) fn clinical_impression(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let kind = EntityKind::ClinicalImpression;
        let subject = require(kind, "subject", &links.subject)?;
        let practitioner = require(kind, "practitioner", &links.practitioner)?;
        let mut record = self.start(kind, rng);
        let finding: Coding = draw(self.catalog, CatalogTable::ClinicalFindings, rng)?;
        let effective = instant_within(rng, self.reference_date, 365);

        set(&mut record, "status", json!("completed"));
        set(
            &mut record,
            "description",
            json!(format!("Assessment of {}", finding.display.to_lowercase())),
        );
        set(&mut record, "effectiveDateTime", json!(instant(effective)));
        set(&mut record, "date", json!(instant(effective)));
        set(
            &mut record,
            "summary",
            json!(format!("Working impression: {}.", finding.display)),
        );
        set(
            &mut record,
            "finding",
            json!([self.mapper.finding(concept(&finding))]),
        );
        link(&mut record, FieldPath::key("subject"), subject);
        link(
            &mut record,
            self.mapper.clinical_impression_practitioner(),
            practitioner,
        );
        link_optional(&mut record, FieldPath::key("encounter"), links.encounter.as_ref());
        Ok(record)
    }

    pub(super) fn family_member_history(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::FamilyMemberHistory, "subject", &links.subject)?;
        let mut record = self.start(EntityKind::FamilyMemberHistory, rng);
        let relationship: RelationshipEntry =
            draw(self.catalog, CatalogTable::FamilyRelationships, rng)?;
        let condition: Coding = draw(self.catalog, CatalogTable::Conditions, rng)?;
        let name: String = FirstName().fake_with_rng(rng);
        let onset_age: u32 = rng.random_range(30..=80);
        let recorded = values::date_within(rng, self.reference_date, 730);

        set(&mut record, "status", json!("completed"));
        set(&mut record, "date", json!(recorded.to_string()));
        set(&mut record, "name", json!(name));
        set(&mut record, "relationship", concept(&relationship.coding));
        set(
            &mut record,
            "sex",
            fixed_concept(
                "http://hl7.org/fhir/administrative-gender",
                &relationship.sex,
                &relationship.sex,
            ),
        );
        set(
            &mut record,
            "condition",
            json!([{
                "code": concept(&condition),
                "onsetAge": {"value": onset_age, "unit": "a", "system": UCUM, "code": "a"}
            }]),
        );
        link(&mut record, FieldPath::key("patient"), subject);
        Ok(record)
    }

    pub(super) fn immunization(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::Immunization, "subject", &links.subject)?;
        let practitioner = require(EntityKind::Immunization, "practitioner", &links.practitioner)?;
        let mut record = self.start(EntityKind::Immunization, rng);
        let vaccine: Coding = draw(self.catalog, CatalogTable::Immunizations, rng)?;
        let occurred = instant_within(rng, self.reference_date, 1825);
        let lot: u32 = rng.random_range(10_000..100_000);
        let site = pick(rng, &["LA", "RA"]);

        let (reason_key, reason_value) = self.mapper.reason(vec![fixed_concept(
            "http://snomed.info/sct",
            "171279008",
            "Immunization due",
        )]);
        set(&mut record, "status", json!("completed"));
        set(&mut record, "vaccineCode", concept(&vaccine));
        set(&mut record, "occurrenceDateTime", json!(instant(occurred)));
        set(&mut record, "primarySource", json!(true));
        set(&mut record, "lotNumber", json!(format!("LOT{lot}")));
        set(
            &mut record,
            "site",
            fixed_concept(
                "http://terminology.hl7.org/CodeSystem/v3-ActSite",
                site,
                if site == "LA" { "left arm" } else { "right arm" },
            ),
        );
        set(&mut record, reason_key, reason_value);
        link(&mut record, FieldPath::key("patient"), subject);
        link(
            &mut record,
            FieldPath::key("performer").index(0).field("actor"),
            practitioner,
        );
        link_optional(&mut record, FieldPath::key("encounter"), links.encounter.as_ref());
        link_optional(&mut record, FieldPath::key("location"), links.location.as_ref());
        Ok(record)
    }

    pub(super) fn medication_administration(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let kind = EntityKind::MedicationAdministration;
        let subject = require(kind, "subject", &links.subject)?;
        let practitioner = require(kind, "practitioner", &links.practitioner)?;
        let mut record = self.start(kind, rng);
        let medication: MedicationEntry = draw(self.catalog, CatalogTable::Medications, rng)?;
        let start = instant_within(rng, self.reference_date, 365);
        let minutes: i64 = rng.random_range(5..=60);

        let (medication_key, medication_value) = self
            .mapper
            .medication(values::text_concept(&medication.text));
        set(&mut record, "status", json!("completed"));
        set(&mut record, medication_key, medication_value);
        set(
            &mut record,
            self.mapper.administration_period(),
            json!({
                "start": instant(start),
                "end": instant(start + Duration::minutes(minutes))
            }),
        );
        set(
            &mut record,
            "dosage",
            json!({
                "text": format!("{} {} {}", medication.dose, medication.unit, medication.route.to_lowercase()),
                "route": values::text_concept(&medication.route),
                "dose": quantity(medication.dose, &medication.unit)
            }),
        );
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, self.mapper.administration_performer(), practitioner);
        link_optional(
            &mut record,
            self.mapper.administration_encounter(),
            links.encounter.as_ref(),
        );
        link_optional(
            &mut record,
            FieldPath::key("request"),
            links.medication_request.as_ref(),
        );
        Ok(record)
    }

    pub(super) fn allergy_intolerance(
        &self,
        links: &Links,
        preset: Option<&AllergySpec>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::AllergyIntolerance, "subject", &links.subject)?;
        let mut record = self.start(EntityKind::AllergyIntolerance, rng);
        let allergen: CategorizedCoding = draw(self.catalog, CatalogTable::Allergens, rng)?;
        let reactions: Vec<Coding> = {
            let count = rng.random_range(1..=2);
            draw_distinct(self.catalog, CatalogTable::AllergyReactions, count, rng)?
        };
        let criticality = pick(rng, &["low", "high", "unable-to-assess"]);
        let severity = pick(rng, &["mild", "moderate", "severe"]);
        let recorded = values::date_within(rng, self.reference_date, 1825);

        let (code, category) = match preset {
            Some(spec) => (values::text_concept(&spec.substance), "medication".to_string()),
            None => (concept(&allergen.coding), allergen.category.clone()),
        };
        let manifestation: Vec<Value> = reactions
            .iter()
            .map(|reaction| self.mapper.allergy_manifestation(concept(reaction)))
            .collect();
        set(
            &mut record,
            "clinicalStatus",
            fixed_concept(ALLERGY_CLINICAL, "active", "Active"),
        );
        set(
            &mut record,
            "verificationStatus",
            fixed_concept(ALLERGY_VERIFICATION, "confirmed", "Confirmed"),
        );
        set(&mut record, "type", json!("allergy"));
        set(&mut record, "category", json!([category]));
        set(&mut record, "criticality", json!(criticality));
        set(&mut record, "code", code);
        set(&mut record, "recordedDate", json!(recorded.to_string()));
        set(
            &mut record,
            "reaction",
            json!([{"manifestation": manifestation, "severity": severity}]),
        );
        link(&mut record, FieldPath::key("patient"), subject);
        link_optional(
            &mut record,
            self.mapper.allergy_practitioner(),
            links.practitioner.as_ref(),
        );
        Ok(record)
    }

    pub(super) fn care_plan(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::CarePlan, "subject", &links.subject)?;
        let practitioner = require(EntityKind::CarePlan, "practitioner", &links.practitioner)?;
        let mut record = self.start(EntityKind::CarePlan, rng);
        let plan: Coding = draw(self.catalog, CatalogTable::CarePlans, rng)?;
        let start = values::date_within(rng, self.reference_date, 365);
        let weeks: i64 = rng.random_range(4..=52);

        set(&mut record, "status", json!("active"));
        set(&mut record, "intent", json!("plan"));
        set(&mut record, "category", json!([concept(&plan)]));
        set(&mut record, "title", json!(plan.display));
        set(
            &mut record,
            "description",
            json!(format!("{} over {} weeks", plan.display, weeks)),
        );
        set(
            &mut record,
            "period",
            json!({
                "start": start.to_string(),
                "end": (start + Duration::weeks(weeks)).to_string()
            }),
        );
        link(&mut record, FieldPath::key("subject"), subject);
        link(&mut record, self.mapper.care_plan_practitioner(), practitioner);
        link_optional(&mut record, FieldPath::key("encounter"), links.encounter.as_ref());
        link_optional(
            &mut record,
            self.mapper.care_plan_condition(),
            links.condition.as_ref(),
        );
        Ok(record)
    }

    pub(super) fn coverage(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let subject = require(EntityKind::Coverage, "subject", &links.subject)?;
        let insurer = require(EntityKind::Coverage, "organization", &links.organization)?;
        let mut record = self.start(EntityKind::Coverage, rng);
        let plan: Coding = draw(self.catalog, CatalogTable::CoverageTypes, rng)?;
        let member: u64 = rng.random_range(100_000_000..1_000_000_000);
        let group: u32 = rng.random_range(1_000..10_000);
        let start = values::date_within(rng, self.reference_date, 730);

        let holder = links.policy_holder.as_ref().filter(|holder| *holder != subject);
        let relationship = if holder.is_some() {
            ("other", "Other")
        } else {
            ("self", "Self")
        };
        set(&mut record, "status", json!("active"));
        if let Some(kind) = self.mapper.coverage_kind() {
            set(&mut record, "kind", json!(kind));
        }
        set(&mut record, "type", concept(&plan));
        set(&mut record, "subscriberId", json!(format!("M{member}")));
        set(
            &mut record,
            "relationship",
            fixed_concept(
                "http://terminology.hl7.org/CodeSystem/subscriber-relationship",
                relationship.0,
                relationship.1,
            ),
        );
        set(
            &mut record,
            "period",
            json!({
                "start": start.to_string(),
                "end": (start + Duration::days(365)).to_string()
            }),
        );
        set(
            &mut record,
            "class",
            json!([{
                "type": fixed_concept(
                    "http://terminology.hl7.org/CodeSystem/coverage-class",
                    "group",
                    "Group"
                ),
                "value": format!("GRP-{group}")
            }]),
        );
        link(&mut record, FieldPath::key("beneficiary"), subject);
        link_optional(&mut record, FieldPath::key("policyHolder"), holder);
        link(&mut record, self.mapper.coverage_insurer(), insurer);
        Ok(record)
    }
}

fn dosage(medication: &MedicationEntry) -> Value {
    json!([{
        "text": format!("{} {} {}", medication.dose, medication.unit, medication.timing.to_lowercase()),
        "timing": {"code": {"text": medication.timing}},
        "route": values::text_concept(&medication.route),
        "doseAndRate": [{"doseQuantity": quantity(medication.dose, &medication.unit)}]
    }])
}

fn quantity(value: f64, unit: &str) -> Value {
    json!({"value": value, "unit": unit, "system": UCUM, "code": unit})
}
