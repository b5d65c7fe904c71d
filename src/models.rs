use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::DashboardConfig;
use crate::orchestrator::FetchOrchestrator;
use crate::scheduler::ContinuousRunner;
use crate::session::SessionAggregator;

// shared state for the dashboard api
pub struct AppState {
    pub config: DashboardConfig,
    pub orchestrator: Arc<FetchOrchestrator>,
    pub session: Arc<Mutex<SessionAggregator>>,
    pub continuous: Mutex<Option<ContinuousRunner>>,
}

impl AppState {
    pub fn new(config: DashboardConfig, orchestrator: FetchOrchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            session: Arc::new(Mutex::new(SessionAggregator::new())),
            continuous: Mutex::new(None),
        }
    }
}

// body of POST /fetch, every field falls back to the configured value
#[derive(Debug, Default, Deserialize)]
pub struct FetchBody {
    pub sites: Option<Vec<String>>,
    pub alpha: Option<Vec<String>>,
    pub image: Option<Vec<String>>,
}

// body of POST /continuous/start
#[derive(Debug, Default, Deserialize)]
pub struct ContinuousBody {
    // seconds between runs
    pub interval: Option<u64>,
}

// one site and the data types selected for it, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRequest {
    pub icao: String,
    pub alpha_types: Vec<String>,
    pub image_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Alpha,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemStatus::Pending)
    }
}

// progress entry for one (site, type) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchItemOutcome {
    pub type_code: String,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
}

impl FetchItemOutcome {
    pub fn pending(type_code: &str, kind: ItemKind) -> Self {
        Self {
            type_code: type_code.to_string(),
            kind,
            status: ItemStatus::Pending,
            response_time_ms: None,
            error_message: None,
        }
    }

    pub fn succeed(&mut self, response_time_ms: u64) {
        debug_assert_eq!(self.status, ItemStatus::Pending);
        self.status = ItemStatus::Success;
        self.response_time_ms = Some(response_time_ms);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        debug_assert_eq!(self.status, ItemStatus::Pending);
        self.status = ItemStatus::Failed;
        self.error_message = Some(message.into());
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        debug_assert_eq!(self.status, ItemStatus::Pending);
        self.status = ItemStatus::Skipped;
        self.error_message = Some(reason.into());
    }
}

// what ends up in alpha_data / image_data: either the upstream value or {"error": "..."}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemPayload {
    Error { error: String },
    Data(Value),
}

impl ItemPayload {
    pub fn error(message: impl Into<String>) -> Self {
        ItemPayload::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ItemPayload::Error { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ItemPayload::Data(value) => Some(value),
            ItemPayload::Error { .. } => None,
        }
    }

    // nested collections count item by item, anything else counts once, errors count zero
    pub fn data_points(&self) -> u64 {
        match self {
            ItemPayload::Error { .. } => 0,
            ItemPayload::Data(value) => ["data", "images"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_array))
                .map(|items| items.len() as u64)
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub data_points: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl FetchSummary {
    pub fn started(start_time: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            data_points: 0,
            start_time,
            end_time: None,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total_requests == self.successful_requests + self.failed_requests
    }
}

// aggregated fetch result for one airport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub site: String,
    pub gfa_region: Option<String>,
    pub alpha_data: BTreeMap<String, ItemPayload>,
    pub image_data: BTreeMap<String, ItemPayload>,
    pub fetch_summary: FetchSummary,
    #[serde(default)]
    pub items: Vec<FetchItemOutcome>,
}

impl SiteRecord {
    pub fn new(site: &str, gfa_region: Option<&str>, start_time: DateTime<Utc>) -> Self {
        Self {
            site: site.to_string(),
            gfa_region: gfa_region.map(str::to_string),
            alpha_data: BTreeMap::new(),
            image_data: BTreeMap::new(),
            fetch_summary: FetchSummary::started(start_time),
            items: Vec::new(),
        }
    }

    pub fn payload(&self, kind: ItemKind, type_code: &str) -> Option<&ItemPayload> {
        match kind {
            ItemKind::Alpha => self.alpha_data.get(type_code),
            ItemKind::Image => self.image_data.get(type_code),
        }
    }

    pub fn response_times(&self) -> Vec<u64> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Success)
            .filter_map(|item| item.response_time_ms)
            .collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.fetch_summary.end_time.is_some()
            && self.fetch_summary.is_consistent()
            && self.items.iter().all(|item| item.status.is_terminal())
    }
}

// a site either produced a record or blew up outside per-item handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SiteResult {
    Record(SiteRecord),
    Failed { site: String, error: String },
}

impl SiteResult {
    pub fn site(&self) -> &str {
        match self {
            SiteResult::Record(record) => &record.site,
            SiteResult::Failed { site, .. } => site,
        }
    }

    pub fn record(&self) -> Option<&SiteRecord> {
        match self {
            SiteResult::Record(record) => Some(record),
            SiteResult::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub timestamp: DateTime<Utc>,
    pub sites: Vec<String>,
    pub data: BTreeMap<String, SiteResult>,
}

impl SessionEntry {
    // statistics contributed by this run, counted per request
    pub fn stats(&self) -> RunningStats {
        let mut stats = RunningStats::default();
        for result in self.data.values() {
            match result {
                SiteResult::Record(record) => {
                    let summary = &record.fetch_summary;
                    stats.total += summary.total_requests;
                    stats.successful += summary.successful_requests;
                    stats.failed += summary.failed_requests;
                    stats.data_points += summary.data_points;
                    stats.response_times.extend(record.response_times());
                }
                SiteResult::Failed { .. } => {
                    stats.total += 1;
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    pub fn has_errors(&self) -> bool {
        self.data.values().any(|result| match result {
            SiteResult::Record(record) => record.fetch_summary.failed_requests > 0,
            SiteResult::Failed { .. } => true,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub data_points: u64,
    pub response_times: Vec<u64>,
}

impl RunningStats {
    pub fn absorb(&mut self, other: RunningStats) {
        self.total += other.total;
        self.successful += other.successful;
        self.failed += other.failed;
        self.data_points += other.data_points;
        self.response_times.extend(other.response_times);
    }

    pub fn average_response_ms(&self) -> Option<f64> {
        if self.response_times.is_empty() {
            return None;
        }
        let sum: u64 = self.response_times.iter().sum();
        Some(sum as f64 / self.response_times.len() as f64)
    }

    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.successful as f64 / self.total as f64 * 100.0)
        }
    }

    // nearest-rank percentile over the raw samples
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.response_times.is_empty() {
            return None;
        }
        let mut sorted = self.response_times.clone();
        sorted.sort_unstable();
        let p = p.clamp(0.0, 100.0);
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }
}

// one image found by probing a candidate url
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectImage {
    pub period: String,
    pub url: String,
    pub proxy_url: String,
    pub content_type: Option<String>,
}

// result of the direct-url fallback for gfa, satellite and radar products
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectImageSet {
    #[serde(rename = "type")]
    pub kind: String,
    pub gfa_region: Option<String>,
    pub site: String,
    pub product: String,
    pub images: Vec<DirectImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    CompletedWithErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

// human-readable status the dashboard polls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
    pub progress: f64,
    pub message: String,
    pub level: StatusLevel,
    pub updated_at: DateTime<Utc>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            progress: 0.0,
            message: "Ready to scrape weather data".to_string(),
            level: StatusLevel::Info,
            updated_at: Utc::now(),
        }
    }
}
