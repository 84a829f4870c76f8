//! Ownership transfer with the parameter-name compatibility fallback and sub-record cascade.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use shared::{
    domain::{Case, CaseId, Enrollment, LocationId, ProgramId},
    error::ApiError,
    protocol::{EnrollmentImport, EventImport, ImportReport, TrackedEntityRecord, TrackerImportPayload},
};
use tracing::{error, info, warn};

use crate::{
    engine::{decode, DataEngine, MutationKind, MutationSpec, QuerySpec},
    error::{CascadeStage, TransferError},
    resolver::TRACKED_ENTITIES,
};

pub const OWNERSHIP_TRANSFER: &str = "tracker/ownership/transfer";
pub const TRACKER_IMPORT: &str = "tracker";
pub const TRANSFER_SUCCEEDED: &str = "Ownership transferred successfully.";

const CASE_CASCADE_FIELDS: &str = "trackedEntity,trackedEntityType,orgUnit,enrollments[enrollment,program,orgUnit,status,occurredAt,enrolledAt,events[event,program,programStage,orgUnit,status,occurredAt,scheduledAt]]";

/// Name under which the ownership endpoint expects the case identifier. Older deployments
/// only understand the legacy name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseParam {
    TrackedEntity,
    TrackedEntityInstance,
}

impl CaseParam {
    pub fn name(self) -> &'static str {
        match self {
            Self::TrackedEntity => "trackedEntity",
            Self::TrackedEntityInstance => "trackedEntityInstance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Submitting,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub case_id: CaseId,
    pub program_id: ProgramId,
    pub destination_id: LocationId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success {
        message: String,
        enrollment_updated: bool,
        events_updated: usize,
    },
    Failed {
        message: String,
        /// Ownership moved; only the sub-record cascade failed.
        partial: bool,
    },
}

impl TransferOutcome {
    pub fn state(&self) -> TransferState {
        match self {
            Self::Success { .. } => TransferState::Success,
            Self::Failed { .. } => TransferState::Failed,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Failed { message, .. } => message,
        }
    }

    /// Whether the ownership change itself committed.
    pub fn ownership_committed(&self) -> bool {
        match self {
            Self::Success { .. } => true,
            Self::Failed { partial, .. } => *partial,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CascadeReport {
    enrollment_updated: bool,
    events_updated: usize,
}

pub fn ownership_transfer_mutation(param: CaseParam, request: &TransferRequest) -> MutationSpec {
    let mut body = Map::new();
    body.insert(param.name().to_string(), json!(request.case_id));
    body.insert("program".to_string(), json!(request.program_id));
    body.insert("ou".to_string(), json!(request.destination_id));

    MutationSpec::new(OWNERSHIP_TRANSFER, MutationKind::Update, Value::Object(body))
        .param(param.name(), request.case_id.as_str())
        .param("program", request.program_id.as_str())
        .param("ou", request.destination_id.as_str())
}

pub fn case_cascade_query(case_id: &CaseId) -> QuerySpec {
    QuerySpec::new(format!("{TRACKED_ENTITIES}/{case_id}")).param("fields", CASE_CASCADE_FIELDS)
}

fn tracker_import(payload: &TrackerImportPayload) -> MutationSpec {
    MutationSpec::new(TRACKER_IMPORT, MutationKind::Create, json!(payload))
        .param("importStrategy", "UPDATE")
        .param("async", "false")
}

pub fn enrollment_import(
    case_id: &CaseId,
    enrollment: &Enrollment,
    destination: &LocationId,
) -> MutationSpec {
    tracker_import(&TrackerImportPayload {
        enrollments: vec![EnrollmentImport::relocated(case_id, enrollment, destination)],
        events: Vec::new(),
    })
}

/// `None` when the enrollment has no events to move.
pub fn events_import(enrollment: &Enrollment, destination: &LocationId) -> Option<MutationSpec> {
    if enrollment.events.is_empty() {
        return None;
    }
    Some(tracker_import(&TrackerImportPayload {
        enrollments: Vec::new(),
        events: enrollment
            .events
            .iter()
            .map(|event| EventImport::relocated(enrollment, event, destination))
            .collect(),
    }))
}

/// A 4xx whose message says the server did not recognise `param`.
pub fn is_unrecognized_parameter(err: &ApiError, param: &str) -> bool {
    if !err.is_client_error() {
        return false;
    }
    let Some(message) = err.server_message() else {
        return false;
    };
    let message = message.to_ascii_lowercase();
    message.contains("unknown parameter")
        || (message.contains("parameter") && message.contains(&param.to_ascii_lowercase()))
}

pub struct TransferExecutor {
    engine: Arc<dyn DataEngine>,
    cascade_enrollment_location: bool,
}

impl TransferExecutor {
    pub fn new(engine: Arc<dyn DataEngine>, cascade_enrollment_location: bool) -> Self {
        Self {
            engine,
            cascade_enrollment_location,
        }
    }

    /// Runs the transfer to a terminal outcome. Failures never escape as errors.
    pub async fn execute(&self, request: &TransferRequest) -> TransferOutcome {
        info!(
            case_id = %request.case_id,
            program_id = %request.program_id,
            destination_id = %request.destination_id,
            "transfer: submitting ownership transfer"
        );

        let result = async {
            self.transfer_ownership(request)
                .await
                .map_err(TransferError::Ownership)?;
            self.cascade(request).await
        }
        .await;

        match result {
            Ok(report) => {
                info!(
                    case_id = %request.case_id,
                    enrollment_updated = report.enrollment_updated,
                    events_updated = report.events_updated,
                    "transfer: completed"
                );
                TransferOutcome::Success {
                    message: TRANSFER_SUCCEEDED.to_string(),
                    enrollment_updated: report.enrollment_updated,
                    events_updated: report.events_updated,
                }
            }
            Err(err) => {
                error!(case_id = %request.case_id, partial = err.is_partial(), error = %err, "transfer: failed");
                TransferOutcome::Failed {
                    message: err.user_message(),
                    partial: err.is_partial(),
                }
            }
        }
    }

    /// Primary mutation, then at most one retry under the legacy parameter name.
    async fn transfer_ownership(&self, request: &TransferRequest) -> Result<(), ApiError> {
        let primary = ownership_transfer_mutation(CaseParam::TrackedEntity, request);
        let err = match self.engine.mutate(&primary).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        if !is_unrecognized_parameter(&err, CaseParam::TrackedEntity.name()) {
            return Err(err);
        }

        warn!(
            case_id = %request.case_id,
            status = ?err.status,
            "transfer: server rejected trackedEntity parameter; retrying with trackedEntityInstance"
        );
        let fallback = ownership_transfer_mutation(CaseParam::TrackedEntityInstance, request);
        self.engine.mutate(&fallback).await.map(|_| ())
    }

    async fn cascade(&self, request: &TransferRequest) -> Result<CascadeReport, TransferError> {
        let case = self
            .fetch_case(&request.case_id)
            .await
            .map_err(|source| TransferError::Cascade {
                stage: CascadeStage::FetchCase,
                source,
            })?;

        let mut report = CascadeReport::default();
        let Some(enrollment) = case.enrollment_for(&request.program_id) else {
            warn!(
                case_id = %request.case_id,
                program_id = %request.program_id,
                "transfer: no enrollment for program; nothing to cascade"
            );
            return Ok(report);
        };

        if self.cascade_enrollment_location {
            let spec = enrollment_import(&request.case_id, enrollment, &request.destination_id);
            self.import(&spec)
                .await
                .map_err(|source| TransferError::Cascade {
                    stage: CascadeStage::Enrollment,
                    source,
                })?;
            report.enrollment_updated = true;
        }

        if let Some(spec) = events_import(enrollment, &request.destination_id) {
            self.import(&spec)
                .await
                .map_err(|source| TransferError::Cascade {
                    stage: CascadeStage::Events,
                    source,
                })?;
            report.events_updated = enrollment.events.len();
        }

        Ok(report)
    }

    async fn fetch_case(&self, case_id: &CaseId) -> Result<Case, ApiError> {
        let value = self.engine.query(&case_cascade_query(case_id)).await?;
        let record: TrackedEntityRecord = decode(TRACKED_ENTITIES, value)?;
        Ok(record.into_case(case_id))
    }

    async fn import(&self, spec: &MutationSpec) -> Result<(), ApiError> {
        let value = self.engine.mutate(spec).await?;
        if value.is_null() {
            return Ok(());
        }
        let report: ImportReport = decode(TRACKER_IMPORT, value)?;
        if report.is_error() {
            let message = report
                .first_error_message()
                .unwrap_or("tracker import reported an error")
                .to_string();
            return Err(ApiError::from_status(409, Some(message)));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/executor_tests.rs"]
mod tests;
