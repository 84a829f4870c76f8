//! Wire records of the tracker API. Field names follow the server's camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Case, CaseId, Enrollment, EnrollmentId, Event, EventId, Location, LocationId, ProgramId,
    ProgramStageId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationUnit {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<OrganisationUnit> for Location {
    fn from(value: OrganisationUnit) -> Self {
        let display_name = value
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| value.id.clone());
        Self {
            id: LocationId(value.id),
            display_name,
            path: value.path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pager {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationUnitPage {
    #[serde(default)]
    pub organisation_units: Vec<OrganisationUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pager: Option<Pager>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityRecord {
    #[serde(default)]
    pub tracked_entity: Option<String>,
    #[serde(default)]
    pub tracked_entity_type: Option<String>,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub enrollments: Vec<EnrollmentRecord>,
}

impl TrackedEntityRecord {
    /// The record only carries its id when `trackedEntity` was requested, so the caller's id wins.
    pub fn into_case(self, id: &CaseId) -> Case {
        Case {
            id: self
                .tracked_entity
                .map(CaseId)
                .unwrap_or_else(|| id.clone()),
            case_type: self.tracked_entity_type,
            current_location_id: self.org_unit.and_then(LocationId::non_blank),
            enrollments: self.enrollments.into_iter().map(Enrollment::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub enrollment: String,
    pub program: String,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub enrolled_at: Option<String>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl From<EnrollmentRecord> for Enrollment {
    fn from(value: EnrollmentRecord) -> Self {
        Self {
            id: EnrollmentId(value.enrollment),
            program_id: ProgramId(value.program),
            location_id: value.org_unit.and_then(LocationId::non_blank),
            status: value.status,
            occurred_at: value.occurred_at,
            enrolled_at: value.enrolled_at,
            events: value.events.into_iter().map(Event::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event: String,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub program_stage: Option<String>,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<String>,
}

impl From<EventRecord> for Event {
    fn from(value: EventRecord) -> Self {
        Self {
            id: EventId(value.event),
            program_id: value.program.map(ProgramId),
            program_stage_id: value.program_stage.map(ProgramStageId),
            location_id: value.org_unit.and_then(LocationId::non_blank),
            status: value.status,
            occurred_at: value.occurred_at,
            scheduled_at: value.scheduled_at,
        }
    }
}

/// Enrollment entry of a tracker update-import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentImport {
    pub enrollment: String,
    pub tracked_entity: String,
    pub program: String,
    pub org_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<String>,
}

impl EnrollmentImport {
    pub fn relocated(case_id: &CaseId, enrollment: &Enrollment, destination: &LocationId) -> Self {
        Self {
            enrollment: enrollment.id.0.clone(),
            tracked_entity: case_id.0.clone(),
            program: enrollment.program_id.0.clone(),
            org_unit: destination.0.clone(),
            status: enrollment.status.clone(),
            occurred_at: enrollment.occurred_at.clone(),
            enrolled_at: enrollment.enrolled_at.clone(),
        }
    }
}

/// Event entry of a tracker update-import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventImport {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_stage: Option<String>,
    pub org_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
}

impl EventImport {
    pub fn relocated(enrollment: &Enrollment, event: &Event, destination: &LocationId) -> Self {
        Self {
            event: event.id.0.clone(),
            enrollment: Some(enrollment.id.0.clone()),
            program: event
                .program_id
                .as_ref()
                .map(|p| p.0.clone())
                .or_else(|| Some(enrollment.program_id.0.clone())),
            program_stage: event.program_stage_id.as_ref().map(|s| s.0.clone()),
            org_unit: destination.0.clone(),
            status: event.status.clone(),
            occurred_at: event.occurred_at.clone(),
            scheduled_at: event.scheduled_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerImportPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrollments: Vec<EnrollmentImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventImport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportErrorReport {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportValidationReport {
    #[serde(default)]
    pub error_reports: Vec<ImportErrorReport>,
}

/// Report returned by a synchronous tracker import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub validation_report: Option<ImportValidationReport>,
}

impl ImportReport {
    pub fn is_error(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("ERROR"))
    }

    pub fn first_error_message(&self) -> Option<&str> {
        self.validation_report
            .as_ref()?
            .error_reports
            .iter()
            .find_map(|report| report.message.as_deref())
    }
}
