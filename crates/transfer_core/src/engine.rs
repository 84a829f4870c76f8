//! Query/mutate capability supplied by the host.

use async_trait::async_trait;
use serde_json::Value;
use shared::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub resource: String,
    pub params: Vec<(String, String)>,
}

impl QuerySpec {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationSpec {
    pub resource: String,
    pub kind: MutationKind,
    pub params: Vec<(String, String)>,
    pub body: Value,
}

impl MutationSpec {
    pub fn new(resource: impl Into<String>, kind: MutationKind, body: Value) -> Self {
        Self {
            resource: resource.into(),
            kind,
            params: Vec::new(),
            body,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[async_trait]
pub trait DataEngine: Send + Sync {
    async fn query(&self, spec: &QuerySpec) -> Result<Value, ApiError>;
    async fn mutate(&self, spec: &MutationSpec) -> Result<Value, ApiError>;
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    resource: &str,
    value: Value,
) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::invalid_response(format!("unexpected {resource} payload: {e}")))
}
