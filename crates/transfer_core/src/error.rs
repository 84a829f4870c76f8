use std::fmt;

use shared::{domain::LocationId, error::ApiError};
use thiserror::Error;

pub const GENERIC_TRANSFER_FAILURE: &str = "Transfer failed";
pub const SEARCH_UNAVAILABLE: &str = "Could not search org units. Try again later.";
pub const ORG_UNIT_TREE_UNAVAILABLE: &str = "Could not load the org unit hierarchy.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStage {
    FetchCase,
    Enrollment,
    Events,
}

impl fmt::Display for CascadeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FetchCase => "case record",
            Self::Enrollment => "enrollment",
            Self::Events => "events",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("ownership transfer failed: {0}")]
    Ownership(ApiError),
    #[error("ownership transferred but {stage} update failed: {source}")]
    Cascade {
        stage: CascadeStage,
        source: ApiError,
    },
}

impl TransferError {
    /// The ownership change committed and only sub-record propagation failed.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Cascade { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Ownership(err) => err
                .server_message()
                .unwrap_or(GENERIC_TRANSFER_FAILURE)
                .to_string(),
            Self::Cascade { stage, source } => match source.server_message() {
                Some(message) => format!(
                    "Ownership was transferred, but updating the {stage} failed: {message}"
                ),
                None => format!("Ownership was transferred, but updating the {stage} failed."),
            },
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("location search unavailable: {0}")]
    Unavailable(ApiError),
}

impl SearchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => SEARCH_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("could not load location {id}: {source}")]
    Location { id: LocationId, source: ApiError },
    #[error("could not load root locations: {0}")]
    Roots(ApiError),
}

impl ResolveError {
    /// Banner text: the server message when there is one.
    pub fn user_message(&self) -> String {
        match self {
            Self::Location { id, source } => source
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Could not load org unit {id}.")),
            Self::Roots(source) => source
                .server_message()
                .unwrap_or(ORG_UNIT_TREE_UNAVAILABLE)
                .to_string(),
        }
    }
}
