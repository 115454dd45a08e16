use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::KiraError;

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const GEO_TEXT_BASE: &str = "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi";

/// Blocking client shared by the GEO and SRA lookups. Retrying is left to the caller;
/// this only classifies failures as transient or not.
#[derive(Clone)]
pub struct NcbiHttp {
    client: Client,
    api_key: Option<String>,
}

impl NcbiHttp {
    pub fn new() -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-sr/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::NcbiHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| KiraError::NcbiHttp(err.to_string()))?;
        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Ok(Self { client, api_key })
    }

    pub fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, KiraError> {
        let mut request = self.client.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }
        let response = request.send().map_err(map_send_error)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(KiraError::NcbiStatus { status, message });
        }
        response.text().map_err(map_send_error)
    }

    pub fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, KiraError> {
        let text = self.get_text(url, query)?;
        serde_json::from_str(&text).map_err(|err| KiraError::UpstreamParse(err.to_string()))
    }

    pub fn esearch_ids(&self, db: &str, term: &str) -> Result<Vec<String>, KiraError> {
        let payload = self.get_json(
            &format!("{EUTILS_BASE}/esearch.fcgi"),
            &[("db", db), ("term", term), ("retmode", "json")],
        )?;
        Ok(esearch_idlist(&payload))
    }
}

pub fn esearch_idlist(payload: &Value) -> Vec<String> {
    payload["esearchresult"]["idlist"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn map_send_error(err: reqwest::Error) -> KiraError {
    if is_retryable_error(&err) {
        KiraError::Transient(err.to_string())
    } else {
        KiraError::NcbiHttp(err.to_string())
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn idlist_from_payload() {
        let payload: Value =
            serde_json::from_str(r#"{"esearchresult":{"count":"2","idlist":["11","12"]}}"#)
                .unwrap();
        assert_eq!(esearch_idlist(&payload), vec!["11", "12"]);
        assert!(esearch_idlist(&Value::Null).is_empty());
    }
}
