//! Blocking HTTP client for the REDCap API.

use std::time::Duration;

use ndd_model::{DataDictionary, Record, Table};
use reqwest::blocking::{Client, Response};
use tracing::{debug, info};

use crate::api::{RecordQuery, RedcapApi};
use crate::error::{RedcapError, Result};
use crate::response::{decode_body, parse_count, parse_csv};

const USER_AGENT_VALUE: &str = concat!("ndd-pipeline/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(120);

/// Client for one REDCap project, identified by its API token.
#[derive(Clone)]
pub struct RedcapClient {
    client: Client,
    api_url: String,
    token: String,
    /// Short project name used in log output.
    project: String,
}

impl std::fmt::Debug for RedcapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedcapClient")
            .field("api_url", &self.api_url)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl RedcapClient {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        project: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| RedcapError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            token: token.into(),
            project: project.into(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn post(&self, params: &[(&str, &str)]) -> Result<String> {
        let mut form: Vec<(&str, &str)> = vec![("token", self.token.as_str())];
        form.extend_from_slice(params);
        let response = self.client.post(&self.api_url).form(&form).send()?;
        Self::handle_response(response)
    }

    fn handle_response(response: Response) -> Result<String> {
        let status = response.status();
        let bytes = response.bytes()?;
        let body = decode_body(&bytes);
        if !status.is_success() {
            return Err(RedcapError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl RedcapApi for RedcapClient {
    fn export_records(&self, query: &RecordQuery) -> Result<Table> {
        let forms = query.forms.join(",");
        let records = query.records.join(",");
        let fields = query.fields.join(",");
        debug!(project = %self.project, %forms, %records, %fields, "exporting records");
        let body = self.post(&[
            ("content", "record"),
            ("format", "csv"),
            ("type", "flat"),
            ("forms", &forms),
            ("records", &records),
            ("fields", &fields),
        ])?;
        let table = parse_csv(&body)?;
        if !table.headers.is_empty() {
            debug!(project = %self.project, rows = table.len(), "records exported");
            return Ok(table);
        }
        // Nothing at all came back; recover the column set from the dictionary.
        let dictionary = self.export_metadata(&query.forms)?;
        Ok(Table::new(
            dictionary.field_names().map(str::to_string).collect(),
        ))
    }

    fn export_metadata(&self, forms: &[String]) -> Result<DataDictionary> {
        let forms = forms.join(",");
        let body = self.post(&[
            ("content", "metadata"),
            ("format", "csv"),
            ("type", "flat"),
            ("forms", &forms),
        ])?;
        let table = parse_csv(&body)?;
        if table.headers.is_empty() {
            return Err(RedcapError::UnexpectedResponse(
                "empty metadata export".to_string(),
            ));
        }
        let dictionary = DataDictionary::from_records(&table.to_records())?;
        debug!(project = %self.project, fields = dictionary.len(), "metadata exported");
        Ok(dictionary)
    }

    fn import_records(&self, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let data = serde_json::to_string(records)?;
        let body = self.post(&[
            ("content", "record"),
            ("format", "json"),
            ("type", "flat"),
            ("data", &data),
        ])?;
        let count = parse_count(&body)?;
        // REDCap counts records, so repeat instances of one record count once.
        info!(project = %self.project, rows = records.len(), count, "records imported");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = RedcapClient::new("https://redcap.example.org/api/", "TOKEN", "referral");
        assert!(client.is_ok());
        assert_eq!(client.unwrap().project(), "referral");
    }
}
