use shared::domain::{CaseId, LocationId, ProgramId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferWarning {
    MissingCaseContext,
    MissingProgramContext,
    DestinationUnchanged,
}

impl TransferWarning {
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingCaseContext => "No tracked entity is selected.",
            Self::MissingProgramContext => "No program is selected.",
            Self::DestinationUnchanged => "The selected org unit is already the current owner.",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferInput<'a> {
    pub case_id: Option<&'a CaseId>,
    pub program_id: Option<&'a ProgramId>,
    pub destination_id: Option<&'a LocationId>,
    pub current_id: Option<&'a LocationId>,
    pub submitting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDecision {
    pub enabled: bool,
    pub warnings: Vec<TransferWarning>,
}

impl TransferDecision {
    pub fn has_warning(&self, warning: TransferWarning) -> bool {
        self.warnings.contains(&warning)
    }
}

pub fn validate(input: &TransferInput<'_>) -> TransferDecision {
    let case_present = input.case_id.is_some_and(|id| !id.is_blank());
    let program_present = input.program_id.is_some_and(|id| !id.is_blank());
    let destination = input.destination_id.filter(|id| !id.is_blank());
    let unchanged = match (destination, input.current_id) {
        (Some(destination), Some(current)) => destination.as_str().trim() == current.as_str().trim(),
        _ => false,
    };

    let mut warnings = Vec::new();
    if !case_present {
        warnings.push(TransferWarning::MissingCaseContext);
    }
    if !program_present {
        warnings.push(TransferWarning::MissingProgramContext);
    }
    if unchanged {
        warnings.push(TransferWarning::DestinationUnchanged);
    }

    TransferDecision {
        enabled: case_present
            && program_present
            && destination.is_some()
            && !unchanged
            && !input.submitting,
        warnings,
    }
}
