use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::client::ConnectivityCheck;
use crate::config::{build_requests, ALPHA_TYPES, IMAGE_TYPES};
use crate::decoder::{
    collect_images, decode_items, decode_notam, decode_upper_wind, ImageRef, NotamFields,
    UpperWind,
};
use crate::error::ConfigError;
use crate::models::{
    AppState, ContinuousBody, FetchBody, FetchSummary, ItemPayload, RunningStats, SiteResult,
};
use crate::regions::{gfa_region_for, region_name};
use crate::scheduler::{run_once, ContinuousRunner};
use crate::utils::{describe_wind, is_valid_icao, normalize_site};

// every failure leaves the api as {"error": "..."} with a matching status
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// an empty body means "use the defaults"
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    })
}

fn parse_site(icao: &str) -> Result<String, Response> {
    let site = normalize_site(icao);
    if is_valid_icao(&site) {
        Ok(site)
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            ConfigError::InvalidIcao(site).to_string(),
        ))
    }
}

// service banner with the current run status
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let continuous = state
        .continuous
        .lock()
        .await
        .as_ref()
        .filter(|runner| runner.is_running())
        .map(|runner| {
            json!({
                "interval": runner.interval().as_secs(),
                "started_at": runner.started_at(),
            })
        });

    Json(json!({
        "service": "wxrecall",
        "version": env!("CARGO_PKG_VERSION"),
        "sites": state.config.sites(),
        "policy": state.orchestrator.settings().policy,
        "alpha_types": ALPHA_TYPES,
        "image_types": IMAGE_TYPES,
        "status": state.orchestrator.status(),
        "continuous": continuous,
    }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.status())
}

// runs one fetch over the configured (or given) sites and records it
pub async fn fetch(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: FetchBody = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let sites = body.sites.unwrap_or_else(|| state.config.sites());
    let alpha = body.alpha.unwrap_or_else(|| state.config.alpha_types.clone());
    let image = body.image.unwrap_or_else(|| state.config.image_types.clone());
    let requests = build_requests(sites, &alpha, &image);
    if requests.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, ConfigError::NoSites.to_string());
    }

    info!(sites = requests.len(), "Manual fetch requested");
    let entry = run_once(&state.orchestrator, &state.session, &requests).await;
    Json(entry).into_response()
}

pub async fn history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.session.lock().await.history().to_vec())
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub runs: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub data_points: u64,
    pub success_rate: Option<f64>,
    pub average_response_ms: Option<f64>,
    pub p50_response_ms: Option<u64>,
    pub p95_response_ms: Option<u64>,
}

impl StatsResponse {
    fn from_stats(runs: usize, stats: &RunningStats) -> Self {
        Self {
            runs,
            total_requests: stats.total,
            successful_requests: stats.successful,
            failed_requests: stats.failed,
            data_points: stats.data_points,
            success_rate: stats.success_rate(),
            average_response_ms: stats.average_response_ms(),
            p50_response_ms: stats.percentile(50.0),
            p95_response_ms: stats.percentile(95.0),
        }
    }
}

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(StatsResponse::from_stats(session.len(), session.stats()))
}

pub async fn clear(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.session.lock().await.clear();
    Json(json!({ "cleared": true }))
}

pub async fn start_continuous(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: ContinuousBody = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let interval = body.interval.unwrap_or(state.config.interval);
    if interval == 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            ConfigError::InvalidValue {
                field: "interval",
                message: "must be at least 1 second".to_string(),
            }
            .to_string(),
        );
    }

    let mut continuous = state.continuous.lock().await;
    if continuous.as_ref().is_some_and(ContinuousRunner::is_running) {
        return error_response(StatusCode::CONFLICT, "Continuous mode is already running");
    }

    let runner = ContinuousRunner::start(
        state.orchestrator.clone(),
        state.session.clone(),
        state.config.site_requests(),
        Duration::from_secs(interval),
    );
    *continuous = Some(runner);

    Json(json!({ "running": true, "interval": interval })).into_response()
}

pub async fn stop_continuous(State(state): State<Arc<AppState>>) -> Response {
    match state.continuous.lock().await.take() {
        Some(runner) => {
            runner.stop();
            Json(json!({ "running": false })).into_response()
        }
        None => error_response(StatusCode::CONFLICT, "Continuous mode is not running"),
    }
}

// display-ready view of one alpha product
#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub relay_url: String,
    pub checks: Vec<ConnectivityCheck>,
    pub recommendations: Vec<String>,
}

fn recommendations(checks: &[ConnectivityCheck]) -> Vec<String> {
    let reachable = checks.iter().filter(|c| c.reachable).count();
    if reachable == checks.len() {
        return vec!["Relay and upstream are reachable".to_string()];
    }
    if reachable == 0 && checks.iter().all(|c| c.error.is_some()) {
        return vec![
            "The relay could not be contacted; check relay_url and network access".to_string(),
        ];
    }
    checks
        .iter()
        .filter(|c| !c.reachable)
        .map(|c| match (c.status, &c.error) {
            (Some(status), _) => format!("{} answered HTTP {} through the relay", c.target, status),
            (None, Some(error)) => format!("{} is unreachable: {}", c.target, error),
            (None, None) => format!("{} is unreachable", c.target),
        })
        .collect()
}

// HEADs each upstream page through the configured relay
pub async fn diagnostics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let client = state.orchestrator.client();
    let targets = client.connectivity_targets();
    let checks = join_all(targets.iter().map(|target| client.check(target))).await;
    info!(
        reachable = checks.iter().filter(|c| c.reachable).count(),
        total = checks.len(),
        "Connectivity diagnostics finished"
    );

    Json(DiagnosticsResponse {
        relay_url: client.endpoints().relay_url.clone(),
        recommendations: recommendations(&checks),
        checks,
    })
}

#[derive(Debug, Default, Serialize)]
pub struct AlphaView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub items: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notams: Vec<NotamFields>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upper_winds: Vec<UpperWind>,
    // one line per upper wind level, e.g. "18000 ft: 270 degrees (W) at 45 knots, -21°C"
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub wind_lines: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub decode_errors: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ImageView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Serialize)]
pub struct SiteView {
    pub site: String,
    pub fetched_at: DateTime<Utc>,
    pub gfa_region: Option<String>,
    pub region_name: Option<&'static str>,
    pub error: Option<String>,
    pub fetch_summary: Option<FetchSummary>,
    pub alpha: BTreeMap<String, AlphaView>,
    pub images: BTreeMap<String, ImageView>,
}

fn alpha_view(type_code: &str, payload: &ItemPayload) -> AlphaView {
    let data = match payload {
        ItemPayload::Error { error } => {
            return AlphaView {
                error: Some(error.clone()),
                ..Default::default()
            }
        }
        ItemPayload::Data(data) => data,
    };

    let mut view = AlphaView {
        items: decode_items(data),
        ..Default::default()
    };
    match type_code {
        "notam" => view.notams = view.items.iter().map(|text| decode_notam(text)).collect(),
        "upperwind" => {
            let entries: Vec<&Value> = match data.get("data").and_then(Value::as_array) {
                Some(items) => items.iter().collect(),
                None => vec![data],
            };
            for entry in entries {
                match decode_upper_wind(entry) {
                    Ok(wind) => {
                        view.wind_lines.extend(wind_lines(&wind));
                        view.upper_winds.push(wind);
                    }
                    Err(e) => view.decode_errors.push(e.to_string()),
                }
            }
        }
        _ => {}
    }
    view
}

fn wind_lines(wind: &UpperWind) -> Vec<String> {
    wind.levels
        .iter()
        .map(|level| {
            let altitude = level
                .altitude_ft
                .map(|ft| format!("{} ft", ft))
                .unwrap_or_else(|| "Unknown altitude".to_string());
            let to_u32 = |v: Option<i64>| v.and_then(|v| u32::try_from(v).ok());
            let wind_text = describe_wind(to_u32(level.wind_dir_deg), to_u32(level.wind_spd_kt));
            match level.temp_c {
                Some(temp) => format!("{}: {}, {}°C", altitude, wind_text, temp),
                None => format!("{}: {}", altitude, wind_text),
            }
        })
        .collect()
}

fn image_view(payload: &ItemPayload) -> ImageView {
    match payload {
        ItemPayload::Error { error } => ImageView {
            error: Some(error.clone()),
            images: Vec::new(),
        },
        ItemPayload::Data(data) => ImageView {
            error: None,
            images: collect_images(data),
        },
    }
}

// latest stored result for one airport, decoded for display
pub async fn site_detail(State(state): State<Arc<AppState>>, Path(icao): Path<String>) -> Response {
    let site = match parse_site(&icao) {
        Ok(site) => site,
        Err(response) => return response,
    };

    let session = state.session.lock().await;
    let Some((fetched_at, result)) = session.latest_for_site(&site) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("No data fetched yet for {}", site),
        );
    };

    let view = match result {
        SiteResult::Failed { error, .. } => SiteView {
            gfa_region: gfa_region_for(&site).map(str::to_string),
            region_name: gfa_region_for(&site).and_then(region_name),
            site,
            fetched_at,
            error: Some(error.clone()),
            fetch_summary: None,
            alpha: BTreeMap::new(),
            images: BTreeMap::new(),
        },
        SiteResult::Record(record) => SiteView {
            region_name: record.gfa_region.as_deref().and_then(region_name),
            gfa_region: record.gfa_region.clone(),
            site,
            fetched_at,
            error: None,
            fetch_summary: Some(record.fetch_summary.clone()),
            alpha: record
                .alpha_data
                .iter()
                .map(|(code, payload)| (code.clone(), alpha_view(code, payload)))
                .collect(),
            images: record
                .image_data
                .iter()
                .map(|(code, payload)| (code.clone(), image_view(payload)))
                .collect(),
        },
    };

    Json(view).into_response()
}

pub async fn region(Path(icao): Path<String>) -> Response {
    let site = match parse_site(&icao) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let region = gfa_region_for(&site);
    Json(json!({
        "site": site,
        "gfa_region": region,
        "region_name": region.and_then(region_name),
    }))
    .into_response()
}
