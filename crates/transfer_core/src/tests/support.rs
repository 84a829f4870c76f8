//! Scripted in-memory `DataEngine` shared by the unit suites.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::error::ApiError;
use tokio::sync::Notify;

use crate::engine::{DataEngine, MutationSpec, QuerySpec};

pub(crate) type Reply = Result<Value, ApiError>;

#[derive(Clone, Default)]
pub(crate) struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub(crate) struct ScriptedEngine {
    queries: Mutex<Vec<QuerySpec>>,
    mutations: Mutex<Vec<MutationSpec>>,
    query_replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    mutation_replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    gates: Mutex<HashMap<String, Gate>>,
}

/// `resource`, or `resource|filter` when the query carries a filter.
pub(crate) fn query_key(spec: &QuerySpec) -> String {
    match spec.param_value("filter") {
        Some(filter) => format!("{}|{filter}", spec.resource),
        None => spec.resource.clone(),
    }
}

/// Ownership transfers are keyed by their case parameter name, imports by payload kind.
pub(crate) fn mutation_key(spec: &MutationSpec) -> String {
    if spec.resource == "tracker" {
        let kind = if spec.body.get("events").is_some() {
            "events"
        } else {
            "enrollments"
        };
        return format!("tracker#{kind}");
    }
    match spec.params.first() {
        Some((name, _)) => format!("{}#{name}", spec.resource),
        None => spec.resource.clone(),
    }
}

fn next_reply(replies: &Mutex<HashMap<String, VecDeque<Reply>>>, keys: &[String]) -> Reply {
    let mut replies = replies.lock().unwrap();
    for key in keys {
        if let Some(queue) = replies.get_mut(key) {
            if queue.len() > 1 {
                if let Some(reply) = queue.pop_front() {
                    return reply;
                }
            } else if let Some(reply) = queue.front() {
                return reply.clone();
            }
        }
    }
    Err(ApiError::from_status(
        404,
        Some(format!("no scripted reply for {keys:?}")),
    ))
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a reply; the last queued reply for a key repeats.
    pub fn on_query(&self, key: &str, reply: Reply) -> &Self {
        self.query_replies
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_mutation(&self, key: &str, reply: Reply) -> &Self {
        self.mutation_replies
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// The next request with `key` signals `entered` and waits for `release`.
    pub fn gate(&self, key: &str) -> Gate {
        let gate = Gate::default();
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), gate.clone());
        gate
    }

    pub fn queries(&self) -> Vec<QuerySpec> {
        self.queries.lock().unwrap().clone()
    }

    pub fn queries_for(&self, resource: &str) -> Vec<QuerySpec> {
        self.queries()
            .into_iter()
            .filter(|spec| spec.resource == resource)
            .collect()
    }

    pub fn mutations(&self) -> Vec<MutationSpec> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn mutations_for(&self, resource: &str) -> Vec<MutationSpec> {
        self.mutations()
            .into_iter()
            .filter(|spec| spec.resource == resource)
            .collect()
    }

    async fn pass_gate(&self, key: &str) {
        let gate = self.gates.lock().unwrap().remove(key);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl DataEngine for ScriptedEngine {
    async fn query(&self, spec: &QuerySpec) -> Result<Value, ApiError> {
        self.queries.lock().unwrap().push(spec.clone());
        let key = query_key(spec);
        self.pass_gate(&key).await;
        next_reply(&self.query_replies, &[key, spec.resource.clone()])
    }

    async fn mutate(&self, spec: &MutationSpec) -> Result<Value, ApiError> {
        self.mutations.lock().unwrap().push(spec.clone());
        let key = mutation_key(spec);
        self.pass_gate(&key).await;
        next_reply(&self.mutation_replies, &[key, spec.resource.clone()])
    }
}

pub(crate) fn org_unit_page(units: &[(&str, &str)]) -> Value {
    let units: Vec<Value> = units
        .iter()
        .map(|(id, name)| json!({"id": id, "displayName": name, "path": format!("/ROOT/{id}")}))
        .collect();
    json!({"pager": {"page": 1, "pageSize": 15}, "organisationUnits": units})
}

pub(crate) fn org_unit(id: &str, name: &str) -> Value {
    json!({"id": id, "displayName": name, "path": format!("/ROOT/{id}")})
}

pub(crate) fn import_ok() -> Value {
    json!({"status": "OK", "validationReport": {"errorReports": []}})
}

/// Case `T1` in location `A` with one `P1` enrollment carrying `event_count` events.
pub(crate) fn case_record(event_count: usize) -> Value {
    let events: Vec<Value> = (1..=event_count)
        .map(|n| {
            json!({
                "event": format!("V{n}"),
                "program": "P1",
                "programStage": "S1",
                "orgUnit": "A",
                "status": "ACTIVE",
                "occurredAt": format!("2024-01-0{n}T00:00:00.000"),
            })
        })
        .collect();
    json!({
        "trackedEntity": "T1",
        "trackedEntityType": "person",
        "orgUnit": "A",
        "enrollments": [
            {
                "enrollment": "E0",
                "program": "P0",
                "orgUnit": "A",
                "status": "COMPLETED",
                "events": [{"event": "X1", "orgUnit": "A", "status": "COMPLETED"}]
            },
            {
                "enrollment": "E1",
                "program": "P1",
                "orgUnit": "A",
                "status": "ACTIVE",
                "occurredAt": "2024-01-01T00:00:00.000",
                "enrolledAt": "2024-01-01T00:00:00.000",
                "events": events
            }
        ]
    })
}
