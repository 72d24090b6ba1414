//! Blocking HTTP client for the LabKey query API.

use std::time::Duration;

use ndd_model::LabkeyConfig;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::api::{LabkeyApi, Row};
use crate::error::{LabkeyError, Result};

const USER_AGENT_VALUE: &str = concat!("ndd-pipeline/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct SelectResponse {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    #[serde(default)]
    rows_affected: Option<usize>,
    #[serde(default)]
    rows: Vec<Value>,
}

#[derive(Clone)]
pub struct LabkeyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for LabkeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabkeyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// `<scheme>://<server>/<context>/<project>`, with spaces in the project path escaped.
pub fn base_url(config: &LabkeyConfig, project: &str) -> String {
    let scheme = if config.use_ssl { "https" } else { "http" };
    let mut url = format!("{scheme}://{}", config.server.trim_end_matches('/'));
    let context = config.context_path.trim_matches('/');
    if !context.is_empty() {
        url.push('/');
        url.push_str(context);
    }
    for segment in project.split('/').filter(|s| !s.is_empty()) {
        url.push('/');
        url.push_str(&segment.replace(' ', "%20"));
    }
    url
}

impl LabkeyClient {
    /// Client for the configured main project.
    pub fn from_config(config: &LabkeyConfig) -> Result<Self> {
        Self::new(base_url(config, &config.project), config.api_key.clone())
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| LabkeyError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/query-{action}.api", self.base_url)
    }

    fn post(&self, action: &str, schema: &str, query: &str, body: &Value) -> Result<Value> {
        let url = self.action_url(action);
        debug!(%url, schema, query, "LabKey request");
        let mut request = self.client.post(&url).json(body);
        if !self.api_key.is_empty() {
            request = request.basic_auth("apikey", Some(&self.api_key));
        }
        let response = request.send()?;
        Self::handle_response(response, schema, query)
    }

    fn handle_response(response: Response, schema: &str, query: &str) -> Result<Value> {
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            let exception = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("exception").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(text);
            return Err(LabkeyError::Status {
                schema: schema.to_string(),
                query: query.to_string(),
                status: status.as_u16(),
                exception,
            });
        }
        serde_json::from_str(&text).map_err(|_| LabkeyError::UnexpectedResponse(text))
    }

    fn save(&self, action: &str, schema: &str, query: &str, rows: &[Row]) -> Result<usize> {
        let body = json!({
            "schemaName": schema,
            "queryName": query,
            "rows": rows,
        });
        let value = self.post(action, schema, query, &body)?;
        let saved: SaveResponse = serde_json::from_value(value)?;
        Ok(saved.rows_affected.unwrap_or(saved.rows.len()))
    }
}

impl LabkeyApi for LabkeyClient {
    fn select_rows(&self, schema: &str, query: &str) -> Result<Vec<Row>> {
        let body = json!({
            "schemaName": schema,
            "queryName": query,
        });
        let value = self.post("selectRows", schema, query, &body)?;
        let selected: SelectResponse = serde_json::from_value(value)?;
        Ok(selected.rows)
    }

    fn insert_rows(&self, schema: &str, query: &str, rows: &[Row]) -> Result<usize> {
        self.save("insertRows", schema, query, rows)
    }

    fn update_rows(&self, schema: &str, query: &str, rows: &[Row]) -> Result<usize> {
        self.save("updateRows", schema, query, rows)
    }
}
