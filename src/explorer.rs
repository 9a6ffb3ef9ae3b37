//! Block explorer ABI lookup
//!
//! Talks to Etherscan/Blockscout-compatible APIs:
//! `GET {base}?module=contract&action=getabi&address=0x...[&apikey=...]`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ManifestError, Result};
use crate::types::Address;

/// Explorer API response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    /// On success, the ABI as a JSON-encoded string
    pub result: Value,
}

#[derive(Debug, Clone)]
pub struct ExplorerClient {
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl ExplorerClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_url: api_url.into(),
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Build the getabi request for an address.
    pub fn abi_request(&self, address: &Address) -> Result<reqwest::Request> {
        let mut params = vec![
            ("module", "contract".to_string()),
            ("action", "getabi".to_string()),
            ("address", address.to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }

        self.client
            .get(&self.api_url)
            .query(&params)
            .timeout(self.timeout)
            .build()
            .map_err(|e| ManifestError::Explorer(e.to_string()))
    }

    /// Fetch the verified ABI of the contract at `address`.
    pub async fn fetch_abi(&self, address: &Address) -> Result<Vec<Value>> {
        debug!(address = %address, explorer = %self.api_url, "Fetching ABI from explorer");

        let request = self.abi_request(address)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ManifestError::Explorer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ManifestError::Explorer(format!(
                "HTTP {} from {}",
                response.status(),
                self.api_url
            )));
        }

        let body: ExplorerResponse = response
            .json()
            .await
            .map_err(|e| ManifestError::Explorer(e.to_string()))?;
        parse_abi_response(body)
    }
}

/// Turn an explorer response into an ABI list.
pub fn parse_abi_response(body: ExplorerResponse) -> Result<Vec<Value>> {
    if body.status != "1" {
        let detail = body.result.as_str().unwrap_or(&body.message).to_string();
        warn!(message = %body.message, detail = %detail, "Explorer refused ABI request");
        return Err(ManifestError::Explorer(detail));
    }

    let abi = match body.result {
        Value::String(encoded) => serde_json::from_str::<Value>(&encoded)?,
        other => other,
    };
    match abi {
        Value::Array(items) => Ok(items),
        other => Err(ManifestError::Explorer(format!(
            "expected ABI array, got {}",
            other
        ))),
    }
}
