use std::sync::Arc;

use shared::{domain::Location, protocol::OrganisationUnitPage};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    effect::{EffectSlot, EffectTicket},
    engine::{decode, DataEngine, QuerySpec},
    error::SearchError,
};

pub const ORGANISATION_UNITS: &str = "organisationUnits";

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub last_query: String,
    pub results: Vec<Location>,
    pub error: Option<SearchError>,
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCommit {
    /// Query below the minimum length; results cleared without a request.
    Cleared,
    Results(usize),
    Failed,
    /// A newer query or teardown superseded this one.
    Stale,
}

pub fn search_query(text: &str, page_size: u32) -> QuerySpec {
    QuerySpec::new(ORGANISATION_UNITS)
        .param("fields", "id,displayName,path")
        .param("filter", format!("displayName:ilike:{text}"))
        .param("paging", "true")
        .param("pageSize", page_size.to_string())
}

pub struct LocationSearch {
    engine: Arc<dyn DataEngine>,
    min_chars: usize,
    page_size: u32,
    slot: EffectSlot,
    state: Mutex<SearchState>,
}

impl LocationSearch {
    pub fn new(
        engine: Arc<dyn DataEngine>,
        min_chars: usize,
        page_size: u32,
        session: &CancellationToken,
    ) -> Self {
        Self {
            engine,
            min_chars,
            page_size,
            slot: EffectSlot::new(session),
            state: Mutex::new(SearchState::default()),
        }
    }

    pub async fn state(&self) -> SearchState {
        self.state.lock().await.clone()
    }

    /// Claims the next search generation. Any later claim supersedes it.
    pub fn begin(&self) -> EffectTicket {
        self.slot.begin()
    }

    pub async fn run(&self, query: &str) -> SearchCommit {
        self.run_ticketed(self.slot.begin(), query).await
    }

    /// Runs `query` under a generation claimed earlier with [`LocationSearch::begin`].
    pub async fn run_ticketed(&self, ticket: EffectTicket, query: &str) -> SearchCommit {
        let text = query.trim();

        if text.chars().count() < self.min_chars {
            let mut state = self.state.lock().await;
            if !ticket.is_live() {
                return SearchCommit::Stale;
            }
            state.last_query = text.to_string();
            state.results.clear();
            state.error = None;
            state.loading = false;
            return SearchCommit::Cleared;
        }

        {
            let mut state = self.state.lock().await;
            if !ticket.is_live() {
                return SearchCommit::Stale;
            }
            state.loading = true;
        }

        let spec = search_query(text, self.page_size);
        let Some(result) = ticket.run(self.engine.query(&spec)).await else {
            debug!(generation = ticket.generation(), "search: session closed mid-request");
            return SearchCommit::Stale;
        };

        let mut state = self.state.lock().await;
        if !ticket.is_live() {
            debug!(
                generation = ticket.generation(),
                query = text,
                "search: discarding superseded response"
            );
            return SearchCommit::Stale;
        }

        state.last_query = text.to_string();
        state.loading = false;
        match result.and_then(|value| decode::<OrganisationUnitPage>(ORGANISATION_UNITS, value)) {
            Ok(page) => {
                state.results = page
                    .organisation_units
                    .into_iter()
                    .map(Location::from)
                    .collect();
                state.error = None;
                SearchCommit::Results(state.results.len())
            }
            Err(err) => {
                warn!(query = text, error = %err, "search: org unit search failed");
                state.results.clear();
                state.error = Some(SearchError::Unavailable(err));
                SearchCommit::Failed
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/search_tests.rs"]
mod tests;
