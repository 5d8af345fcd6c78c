//! HTTP client for peer nodes
//!
//! Calls are never retried; a failed call surfaces immediately so the
//! caller decides whether to try again. Failures are split into
//! connectivity problems and protocol problems.

use crate::error::{FederationError, Result};
use crate::protocol::{
    endpoint, stream_endpoint, HealthResponse, RegisterNodeRequest, RemoteFileRecord, FILES_PATH,
    HEALTH_PATH, REGISTER_PATH,
};
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, HttpStream, RetryPolicy};
use core_runtime::config::FederationConfig;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct NodeClient {
    http: Arc<dyn HttpClient>,
    config: FederationConfig,
}

impl NodeClient {
    pub fn new(http: Arc<dyn HttpClient>, config: FederationConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Health probe bounded by the validation timeout
    pub async fn health(&self, base_url: &str, api_key: Option<&str>) -> Result<HealthResponse> {
        let url = endpoint(base_url, HEALTH_PATH);
        let request = HttpRequest::get(&url).maybe_bearer_token(api_key);
        let response = self
            .send(request, self.config.validate_timeout, &url)
            .await?;
        let health: HealthResponse = parse(&response, &url)?;
        debug!(url = %base_url, status = %health.status, "Node health probed");
        Ok(health)
    }

    /// Registration handshake; the response body is not inspected.
    pub async fn register(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        body: &RegisterNodeRequest,
    ) -> Result<()> {
        let url = endpoint(base_url, REGISTER_PATH);
        let request = HttpRequest::post(&url)
            .maybe_bearer_token(api_key)
            .json(body)
            .map_err(|e| FederationError::protocol(&url, e))?;
        self.send(request, self.config.request_timeout, &url)
            .await?;
        Ok(())
    }

    /// File records the peer serves from its libraries
    pub async fn list_files(
        &self,
        base_url: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<RemoteFileRecord>> {
        let url = endpoint(base_url, FILES_PATH);
        let request = HttpRequest::get(&url).maybe_bearer_token(api_key);
        let response = self
            .send(request, self.config.request_timeout, &url)
            .await?;
        parse(&response, &url)
    }

    /// Opens the byte stream of one remote file
    pub async fn open_stream(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        remote_path: &str,
    ) -> Result<HttpStream> {
        let url = stream_endpoint(base_url, remote_path);
        let request = HttpRequest::get(&url)
            .maybe_bearer_token(api_key)
            .timeout(self.config.download_timeout);
        self.http
            .download_stream(request)
            .await
            .map_err(|e| classify(&url, e))
    }

    async fn send(&self, request: HttpRequest, timeout: Duration, url: &str) -> Result<HttpResponse> {
        let response = self
            .http
            .execute_with_retry(request.timeout(timeout), RetryPolicy::no_retry())
            .await
            .map_err(|e| classify(url, e))?;

        response
            .error_for_status()
            .map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, error: BridgeError) -> FederationError {
    if error.is_connectivity() {
        FederationError::connectivity(url, error)
    } else {
        FederationError::protocol(url, error)
    }
}

fn parse<T: DeserializeOwned>(response: &HttpResponse, url: &str) -> Result<T> {
    response.json().map_err(|e| FederationError::protocol(url, e))
}
