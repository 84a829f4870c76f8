//! reqwest-backed `DataEngine` against the tracker web API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    error::{ApiError, ApiErrorBody},
    protocol::ImportReport,
};
use tracing::debug;
use url::Url;

use crate::engine::{DataEngine, MutationKind, MutationSpec, QuerySpec};

#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

pub struct HttpDataEngine {
    http: Client,
    api_root: Url,
    auth: Option<BasicAuth>,
}

impl HttpDataEngine {
    /// `base_url` is the server root; resources resolve under `{base_url}/api/`.
    pub fn new(base_url: &str, auth: Option<BasicAuth>) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(anyhow!("base url must not be empty"));
        }
        let api_root = Url::parse(&format!("{trimmed}/api/"))
            .with_context(|| format!("invalid base url '{base_url}'"))?;
        Ok(Self {
            http: Client::new(),
            api_root,
            auth,
        })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn endpoint(&self, resource: &str) -> Result<Url, ApiError> {
        self.api_root
            .join(resource.trim_start_matches('/'))
            .map_err(|e| ApiError::transport(format!("invalid resource '{resource}': {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(auth) => request.basic_auth(&auth.username, Some(&auth.password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;
        read_response(response).await
    }
}

/// Error bodies of the tracker importer either are the report or wrap it in `response`.
#[derive(Deserialize)]
struct WrappedImportReport {
    #[serde(default)]
    response: Option<ImportReport>,
}

fn import_report_message(bytes: &[u8]) -> Option<String> {
    let direct = serde_json::from_slice::<ImportReport>(bytes).ok();
    let wrapped = serde_json::from_slice::<WrappedImportReport>(bytes)
        .ok()
        .and_then(|body| body.response);
    [direct, wrapped]
        .into_iter()
        .flatten()
        .find_map(|report| report.first_error_message().map(str::to_string))
}

async fn read_response(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::transport(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ApiErrorBody>(&bytes)
            .ok()
            .and_then(|body| body.message)
            .or_else(|| import_report_message(&bytes))
            .or_else(|| {
                let text = String::from_utf8_lossy(&bytes).trim().to_string();
                (!text.is_empty() && !text.starts_with('{')).then_some(text)
            });
        debug!(status = status.as_u16(), ?message, "transport: request rejected");
        return Err(ApiError::from_status(status.as_u16(), message));
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::invalid_response(format!("response is not JSON: {e}")))
}

#[async_trait]
impl DataEngine for HttpDataEngine {
    async fn query(&self, spec: &QuerySpec) -> Result<Value, ApiError> {
        let url = self.endpoint(&spec.resource)?;
        debug!(resource = %spec.resource, "transport: GET");
        self.send(self.http.get(url).query(&spec.params)).await
    }

    async fn mutate(&self, spec: &MutationSpec) -> Result<Value, ApiError> {
        let url = self.endpoint(&spec.resource)?;
        let request = match spec.kind {
            MutationKind::Create => self.http.post(url),
            MutationKind::Update => self.http.put(url),
        };
        debug!(resource = %spec.resource, kind = ?spec.kind, "transport: mutate");
        self.send(request.query(&spec.params).json(&spec.body)).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
