use std::sync::{Arc, Mutex as StdMutex, Weak};

use shared::domain::{CaseId, Location, LocationId, ProgramId, UNKNOWN_LOCATION_LABEL};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod config;
pub mod debounce;
pub mod effect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod search;
pub mod selection;
pub mod transport;
pub mod validator;

use config::TransferConfig;
use debounce::Debouncer;
use effect::{EffectSlot, EffectTicket};
use engine::DataEngine;
use error::ResolveError;
use executor::{TransferExecutor, TransferOutcome, TransferRequest, TransferState};
use resolver::{find_current_location, LocationResolver, ResolveContext};
use search::{LocationSearch, SearchCommit};
use selection::SelectionReconciler;
use validator::{validate, TransferDecision, TransferInput};

/// Identifiers the host hands over when the transfer flow opens. Each may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostContext {
    pub case_id: Option<CaseId>,
    pub program_id: Option<ProgramId>,
    pub current_location_id: Option<LocationId>,
}

impl HostContext {
    pub fn new(
        case_id: Option<&str>,
        program_id: Option<&str>,
        current_location_id: Option<&str>,
    ) -> Self {
        Self {
            case_id: case_id.and_then(CaseId::non_blank),
            program_id: program_id.and_then(ProgramId::non_blank),
            current_location_id: current_location_id.and_then(LocationId::non_blank),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CurrentLocationResolved(Option<Location>),
    DestinationResolved(Option<Location>),
    DestinationFailed(LocationId),
    SearchUpdated,
    RootsLoaded(usize),
    TransferStateChanged(TransferState),
}

/// Presentation-facing copy of the session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub case_id: Option<CaseId>,
    pub program_id: Option<ProgramId>,
    pub current_location_id: Option<LocationId>,
    pub current_location_label: String,
    pub destination_id: Option<LocationId>,
    pub destination: Option<Location>,
    pub destination_error: Option<String>,
    pub selected_paths: Vec<String>,
    pub search_query: String,
    pub debounced_query: String,
    pub search_results: Vec<Location>,
    pub search_open: bool,
    pub search_loading: bool,
    pub search_error: Option<String>,
    pub roots: Vec<Location>,
    pub tree_error: Option<String>,
    pub transfer_state: TransferState,
    pub submitting: bool,
    pub status_message: Option<String>,
    pub transfer_error: Option<String>,
    pub partial_failure: bool,
    pub decision: TransferDecision,
}

struct SessionState {
    current_location_id: Option<LocationId>,
    current_location: Option<Location>,
    selection: SelectionReconciler,
    destination: Option<Location>,
    destination_error: Option<ResolveError>,
    roots: Vec<Location>,
    tree_error: Option<ResolveError>,
    transfer_state: TransferState,
    submitting: bool,
    status_message: Option<String>,
    transfer_error: Option<String>,
    partial_failure: bool,
}

/// One operator's transfer flow for a single case. Dropping or closing it tears down every
/// pending lookup.
pub struct TransferSession {
    engine: Arc<dyn DataEngine>,
    context: HostContext,
    resolver: LocationResolver,
    search: Arc<LocationSearch>,
    executor: TransferExecutor,
    debouncer: Debouncer<String>,
    current_slot: EffectSlot,
    destination_slot: EffectSlot,
    tree_slot: EffectSlot,
    cancel: CancellationToken,
    inner: Mutex<SessionState>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl TransferSession {
    pub fn new(
        engine: Arc<dyn DataEngine>,
        config: TransferConfig,
        context: HostContext,
    ) -> Arc<Self> {
        let config = config.normalized();
        let cancel = CancellationToken::new();
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            resolver: LocationResolver::new(Arc::clone(&engine)),
            search: Arc::new(LocationSearch::new(
                Arc::clone(&engine),
                config.search_min_chars,
                config.search_page_size,
                &cancel,
            )),
            executor: TransferExecutor::new(
                Arc::clone(&engine),
                config.cascade_enrollment_location,
            ),
            debouncer: Debouncer::new(config.search_debounce, String::new(), &cancel),
            current_slot: EffectSlot::new(&cancel),
            destination_slot: EffectSlot::new(&cancel),
            tree_slot: EffectSlot::new(&cancel),
            inner: Mutex::new(SessionState {
                current_location_id: context.current_location_id.clone(),
                current_location: None,
                selection: SelectionReconciler::new(),
                destination: None,
                destination_error: None,
                roots: Vec::new(),
                tree_error: None,
                transfer_state: TransferState::Idle,
                submitting: false,
                status_message: None,
                transfer_error: None,
                partial_failure: false,
            }),
            tasks: StdMutex::new(Vec::new()),
            engine,
            context,
            cancel,
            events,
        })
    }

    /// Spawns the background work of an opened flow: current location, root locations and
    /// the debounced search driver.
    pub fn start(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let lookups = tokio::spawn(async move {
            futures::future::join(session.refresh_current_location(), session.load_roots())
                .await;
        });
        let driver = tokio::spawn(drive_search(
            Arc::downgrade(self),
            self.debouncer.subscribe(),
            self.cancel.clone(),
        ));

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(lookups);
        tasks.push(driver);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!(case_id = ?self.context.case_id, "session: closing transfer flow");
        self.cancel.cancel();
        self.debouncer.cancel();
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Finds the case's location when the host did not supply one, then resolves its name.
    pub async fn refresh_current_location(&self) {
        let ticket = self.current_slot.begin();
        let known = self.inner.lock().await.current_location_id.clone();

        let location_id = match (known, &self.context.case_id) {
            (Some(id), _) => Some(id),
            (None, Some(case_id)) => {
                let Some(found) = ticket
                    .run(find_current_location(&*self.engine, case_id))
                    .await
                else {
                    return;
                };
                found
            }
            (None, None) => None,
        };

        let resolved = match ticket
            .run(
                self.resolver
                    .resolve(location_id.as_ref(), ResolveContext::Current),
            )
            .await
        {
            Some(resolved) => resolved,
            None => return,
        };

        let location = match (resolved, &location_id) {
            (Ok(location), _) => location,
            (Err(err), Some(id)) => {
                warn!(error = %err, "session: current location name unavailable; showing raw id");
                Some(Location::from_raw_id(id.clone()))
            }
            (Err(_), None) => None,
        };

        {
            let mut state = self.inner.lock().await;
            if !ticket.is_live() {
                debug!(generation = ticket.generation(), "session: discarding stale current location");
                return;
            }
            state.current_location_id = location_id;
            state.current_location = location.clone();
        }
        self.emit(SessionEvent::CurrentLocationResolved(location));
    }

    pub async fn load_roots(&self) {
        let ticket = self.tree_slot.begin();
        let Some(result) = ticket.run(self.resolver.roots()).await else {
            return;
        };

        let mut state = self.inner.lock().await;
        if !ticket.is_live() {
            return;
        }
        let count = match result {
            Ok(roots) => {
                state.roots = roots;
                state.tree_error = None;
                state.roots.len()
            }
            Err(err) => {
                warn!(error = %err, "session: root locations unavailable");
                state.roots.clear();
                state.tree_error = Some(err);
                0
            }
        };
        drop(state);
        self.emit(SessionEvent::RootsLoaded(count));
    }

    /// Records typed search text; the search itself runs once input settles.
    pub async fn set_search_query(&self, text: &str) {
        if self.is_closed() {
            return;
        }
        self.inner.lock().await.selection.set_query(text);
        self.debouncer.push(text.to_string());
    }

    pub async fn run_search(&self, query: &str) -> SearchCommit {
        self.run_claimed_search(self.search.begin(), query).await
    }

    async fn run_claimed_search(&self, ticket: EffectTicket, query: &str) -> SearchCommit {
        let commit = self.search.run_ticketed(ticket, query).await;
        if commit != SearchCommit::Stale {
            self.emit(SessionEvent::SearchUpdated);
        }
        commit
    }

    /// Applies a browse-widget change and resolves the picked location for display.
    pub async fn select_from_tree(&self, selected_paths: &[String], id: &str) {
        let (ticket, destination_id) = {
            let mut state = self.inner.lock().await;
            if state.submitting || self.is_closed() {
                warn!("session: ignoring tree selection while a transfer is in flight");
                return;
            }
            state.selection.select_from_tree(selected_paths, id);
            state.destination = None;
            state.destination_error = None;
            (
                self.destination_slot.begin(),
                state.selection.destination_id().cloned(),
            )
        };

        let Some(resolved) = ticket
            .run(
                self.resolver
                    .resolve(destination_id.as_ref(), ResolveContext::Destination),
            )
            .await
        else {
            return;
        };

        let event = {
            let mut state = self.inner.lock().await;
            if !ticket.is_live() {
                debug!(generation = ticket.generation(), "session: discarding stale destination");
                return;
            }
            match resolved {
                Ok(location) => {
                    state.destination = location.clone();
                    SessionEvent::DestinationResolved(location)
                }
                Err(err) => {
                    warn!(error = %err, "session: destination lookup failed");
                    let failed_id = match &err {
                        ResolveError::Location { id: failed, .. } => failed.clone(),
                        ResolveError::Roots(_) => LocationId::from(id),
                    };
                    state.destination_error = Some(err);
                    SessionEvent::DestinationFailed(failed_id)
                }
            }
        };
        self.emit(event);
    }

    pub async fn pick_search_result(&self, location: &Location) {
        {
            let mut state = self.inner.lock().await;
            if state.submitting || self.is_closed() {
                warn!("session: ignoring search pick while a transfer is in flight");
                return;
            }
            state.selection.pick_search_result(location);
            state.destination = Some(location.clone());
            state.destination_error = None;
            self.destination_slot.invalidate();
        }
        self.emit(SessionEvent::DestinationResolved(Some(location.clone())));
    }

    fn decide(&self, state: &SessionState) -> TransferDecision {
        validate(&TransferInput {
            case_id: self.context.case_id.as_ref(),
            program_id: self.context.program_id.as_ref(),
            destination_id: state.selection.destination_id(),
            current_id: state.current_location_id.as_ref(),
            submitting: state.submitting,
        })
    }

    pub async fn decision(&self) -> TransferDecision {
        let state = self.inner.lock().await;
        self.decide(&state)
    }

    /// Runs the transfer when the decision allows it. `None` means the action was disabled.
    pub async fn submit(&self) -> Option<TransferOutcome> {
        let request = {
            let mut state = self.inner.lock().await;
            let decision = self.decide(&state);
            if !decision.enabled {
                debug!(warnings = ?decision.warnings, "session: transfer action is disabled");
                return None;
            }
            let (Some(case_id), Some(program_id), Some(destination_id)) = (
                self.context.case_id.clone(),
                self.context.program_id.clone(),
                state.selection.destination_id().cloned(),
            ) else {
                return None;
            };
            state.submitting = true;
            state.transfer_state = TransferState::Submitting;
            state.status_message = None;
            state.transfer_error = None;
            state.partial_failure = false;
            TransferRequest {
                case_id,
                program_id,
                destination_id,
            }
        };
        self.emit(SessionEvent::TransferStateChanged(TransferState::Submitting));

        let outcome = self.executor.execute(&request).await;

        {
            let mut state = self.inner.lock().await;
            state.submitting = false;
            state.transfer_state = outcome.state();
            match &outcome {
                TransferOutcome::Success { message, .. } => {
                    state.status_message = Some(message.clone());
                }
                TransferOutcome::Failed { message, partial } => {
                    state.transfer_error = Some(message.clone());
                    state.partial_failure = *partial;
                }
            }
            if outcome.ownership_committed() {
                self.current_slot.invalidate();
                state.current_location = Some(
                    state
                        .destination
                        .clone()
                        .filter(|location| location.id == request.destination_id)
                        .unwrap_or_else(|| Location::from_raw_id(request.destination_id.clone())),
                );
                state.current_location_id = Some(request.destination_id.clone());
            }
        }
        self.emit(SessionEvent::TransferStateChanged(outcome.state()));
        Some(outcome)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let search = self.search.state().await;
        let state = self.inner.lock().await;
        let current_location_label = match (&state.current_location, &state.current_location_id)
        {
            (Some(location), _) => location.display_name.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => UNKNOWN_LOCATION_LABEL.to_string(),
        };

        SessionSnapshot {
            case_id: self.context.case_id.clone(),
            program_id: self.context.program_id.clone(),
            current_location_id: state.current_location_id.clone(),
            current_location_label,
            destination_id: state.selection.destination_id().cloned(),
            destination: state.destination.clone(),
            destination_error: state.destination_error.as_ref().map(ResolveError::user_message),
            selected_paths: state.selection.selected_paths(),
            search_query: state.selection.query().to_string(),
            debounced_query: self.debouncer.current(),
            search_open: state.selection.results_open(),
            search_results: search.results,
            search_loading: search.loading,
            search_error: search.error.map(|e| e.user_message().to_string()),
            roots: state.roots.clone(),
            tree_error: state.tree_error.as_ref().map(ResolveError::user_message),
            transfer_state: state.transfer_state,
            submitting: state.submitting,
            status_message: state.status_message.clone(),
            transfer_error: state.transfer_error.clone(),
            partial_failure: state.partial_failure,
            decision: self.decide(&state),
        }
    }
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive_search(
    session: Weak<TransferSession>,
    mut settled: tokio::sync::watch::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = settled.changed() => {
                if changed.is_err() {
                    break;
                }
                let query = settled.borrow_and_update().clone();
                let Some(session) = session.upgrade() else {
                    break;
                };
                // Claimed in settle order, before the task is scheduled.
                let ticket = session.search.begin();
                tokio::spawn(async move {
                    session.run_claimed_search(ticket, &query).await;
                });
            }
        }
    }
    debug!("session: search driver stopped");
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
