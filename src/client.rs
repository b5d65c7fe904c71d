use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{FetchError, FetchResult};
use crate::utils::{build_query, cache_buster};

pub const DEFAULT_BASE_URL: &str = "https://plan.navcanada.ca";
pub const DEFAULT_RELAY_URL: &str = "https://corsproxy.io/?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// production uses reqwest, tests script responses
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> FetchResult<TransportResponse>;

    async fn head(&self, url: &str) -> FetchResult<TransportResponse>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("wxrecall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn send(&self, request: RequestBuilder, read_body: bool) -> FetchResult<TransportResponse> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = if read_body {
            response.text().await.map_err(network_error)?
        } else {
            String::new()
        };

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body,
        })
    }
}

fn network_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network(format!("request timed out: {}", e))
    } else {
        FetchError::Network(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> FetchResult<TransportResponse> {
        self.send(self.client.get(url), true).await
    }

    async fn head(&self, url: &str) -> FetchResult<TransportResponse> {
        self.send(self.client.head(url), false).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base_url: String,
    pub relay_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
        }
    }
}

impl Endpoints {
    pub fn api_url(&self, query: &str) -> String {
        format!(
            "{}/weather/api/alpha/?{}",
            self.base_url.trim_end_matches('/'),
            query
        )
    }

    pub fn relay(&self, target: &str) -> String {
        format!("{}{}", self.relay_url, urlencoding::encode(target))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub ok: bool,
    pub status: u16,
    pub content_type: Option<String>,
    pub proxy_url: String,
}

// one row of the connectivity report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityCheck {
    pub target: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // fetches one alphanumeric product (metar, taf, notam, ...) for a site
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_alpha(&self, site: &str, type_code: &str) -> FetchResult<Value> {
        let stamp = cache_buster();
        let query = build_query(&[
            ("site", site),
            ("alpha", type_code),
            ("notam_choice", "default"),
            ("_", &stamp),
        ]);
        self.get_json(&query).await
    }

    // fetches one image product (GFA/CLDWX, SATELLITE/IR, ...) through the structured api
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_image(&self, site: &str, type_code: &str) -> FetchResult<Value> {
        let stamp = cache_buster();
        let query = build_query(&[("site", site), ("image", type_code), ("_", &stamp)]);
        self.get_json(&query).await
    }

    // issues a GET for an already-built query string and parses the body as json
    pub async fn get_json(&self, query: &str) -> FetchResult<Value> {
        let url = self.endpoints.relay(&self.endpoints.api_url(query));
        debug!(url = %url, "Requesting upstream");

        let response = self.transport.get(&url).await?;
        if !response.is_success() {
            return Err(FetchError::http(response.status, response.status_text));
        }

        serde_json::from_str(&response.body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    // HEAD through the relay; only the status and content type matter
    pub async fn probe(&self, target_url: &str) -> FetchResult<ProbeResult> {
        let proxy_url = self.endpoints.relay(target_url);
        let response = self.transport.head(&proxy_url).await?;
        Ok(ProbeResult {
            ok: response.is_success(),
            status: response.status,
            content_type: response.content_type,
            proxy_url,
        })
    }

    // upstream pages the relay has to reach for a run to work
    pub fn connectivity_targets(&self) -> Vec<String> {
        let base = self.endpoints.base_url.trim_end_matches('/');
        vec![
            format!("{}/weather/api/alpha/", base),
            format!("{}/weather/images/", base),
        ]
    }

    // a transport error marks the target unreachable instead of failing the report
    pub async fn check(&self, target_url: &str) -> ConnectivityCheck {
        match self.probe(target_url).await {
            Ok(result) => ConnectivityCheck {
                target: target_url.to_string(),
                reachable: result.ok,
                status: Some(result.status),
                error: None,
            },
            Err(e) => {
                debug!(target = %target_url, error = %e, "Connectivity check failed");
                ConnectivityCheck {
                    target: target_url.to_string(),
                    reachable: false,
                    status: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
