use std::sync::Arc;

use shared::{
    domain::{CaseId, Location, LocationId},
    protocol::{OrganisationUnit, OrganisationUnitPage, TrackedEntityRecord},
};
use tracing::{debug, warn};

use crate::{
    engine::{decode, DataEngine, QuerySpec},
    error::ResolveError,
    search::ORGANISATION_UNITS,
};

pub const TRACKED_ENTITIES: &str = "tracker/trackedEntities";

/// Where a resolved location is shown. Failures degrade differently per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveContext {
    Current,
    Destination,
}

impl ResolveContext {
    fn fields(self) -> &'static str {
        match self {
            Self::Current => "id,displayName",
            Self::Destination => "id,displayName,path",
        }
    }
}

pub fn location_query(id: &LocationId, context: ResolveContext) -> QuerySpec {
    QuerySpec::new(format!("{ORGANISATION_UNITS}/{id}")).param("fields", context.fields())
}

pub fn roots_query() -> QuerySpec {
    QuerySpec::new(ORGANISATION_UNITS)
        .param("filter", "level:eq:1")
        .param("fields", "id,displayName,path")
        .param("paging", "false")
}

pub fn case_location_query(case_id: &CaseId) -> QuerySpec {
    QuerySpec::new(format!("{TRACKED_ENTITIES}/{case_id}")).param("fields", "orgUnit")
}

pub struct LocationResolver {
    engine: Arc<dyn DataEngine>,
}

impl LocationResolver {
    pub fn new(engine: Arc<dyn DataEngine>) -> Self {
        Self { engine }
    }

    pub async fn resolve(
        &self,
        id: Option<&LocationId>,
        context: ResolveContext,
    ) -> Result<Option<Location>, ResolveError> {
        let Some(id) = id else {
            return Ok(None);
        };
        let spec = location_query(id, context);
        let unit = self
            .engine
            .query(&spec)
            .await
            .and_then(|value| decode::<OrganisationUnit>(&spec.resource, value))
            .map_err(|source| ResolveError::Location {
                id: id.clone(),
                source,
            })?;
        debug!(location_id = %id, ?context, "resolver: location resolved");
        Ok(Some(Location::from(unit)))
    }

    /// Top-level locations that seed the hierarchical browse.
    pub async fn roots(&self) -> Result<Vec<Location>, ResolveError> {
        let page = self
            .engine
            .query(&roots_query())
            .await
            .and_then(|value| decode::<OrganisationUnitPage>(ORGANISATION_UNITS, value))
            .map_err(ResolveError::Roots)?;
        Ok(page
            .organisation_units
            .into_iter()
            .map(Location::from)
            .collect())
    }
}

/// Looks up the case's owning location. Best effort: failures leave it unknown.
pub async fn find_current_location(
    engine: &dyn DataEngine,
    case_id: &CaseId,
) -> Option<LocationId> {
    let spec = case_location_query(case_id);
    let record = match engine.query(&spec).await {
        Ok(value) => decode::<TrackedEntityRecord>(TRACKED_ENTITIES, value),
        Err(err) => Err(err),
    };
    match record {
        Ok(record) => record.org_unit.and_then(LocationId::non_blank),
        Err(err) => {
            warn!(case_id = %case_id, error = %err, "resolver: current location lookup failed");
            None
        }
    }
}
