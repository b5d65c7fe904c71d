use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::{ReqwestTransport, RemoteClient, Transport};
use crate::config::{unique_codes, DashboardConfig, FetchPolicy};
use crate::error::{FetchError, FetchResult};
use crate::gfa::GfaResolver;
use crate::imagery::{ImageCategory, ImageResolution, ImageryResolver};
use crate::models::{
    FetchItemOutcome, ItemKind, ItemPayload, RunState, RunStatus, SessionEntry, SiteRecord,
    SiteRequest, SiteResult, StatusLevel,
};
use crate::regions::gfa_region_for;
use crate::utils::{is_valid_icao, normalize_site};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub request_delay: Duration,
    pub policy: FetchPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
            policy: FetchPolicy::Sequential,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteProgress {
    pub site: String,
    pub completed: usize,
    pub total: usize,
}

impl SiteProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

// what a single item produced before it is folded into the record
enum ItemFetch {
    Skipped(String),
    Done {
        result: Result<Value, String>,
        elapsed_ms: u64,
    },
}

pub struct FetchOrchestrator {
    client: RemoteClient,
    gfa: GfaResolver,
    imagery: ImageryResolver,
    settings: OrchestratorSettings,
    status: watch::Sender<RunStatus>,
}

impl FetchOrchestrator {
    pub fn new(client: RemoteClient, settings: OrchestratorSettings) -> Self {
        let (status, _) = watch::channel(RunStatus::default());
        Self {
            gfa: GfaResolver::new(client.clone()),
            imagery: ImageryResolver::new(client.clone()),
            client,
            settings,
            status,
        }
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: &DashboardConfig) -> Self {
        let client = RemoteClient::new(transport, config.endpoints());
        Self::new(
            client,
            OrchestratorSettings {
                request_delay: config.request_delay(),
                policy: config.policy,
            },
        )
    }

    // production wiring: reqwest behind the relay with the configured timeout
    pub fn from_config(config: &DashboardConfig) -> FetchResult<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    pub fn settings(&self) -> OrchestratorSettings {
        self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    fn publish(&self, state: RunState, progress: f64, message: String, level: StatusLevel) {
        self.status.send_replace(RunStatus {
            state,
            progress,
            message,
            level,
            updated_at: Utc::now(),
        });
    }

    pub async fn run(&self, requests: &[SiteRequest]) -> SessionEntry {
        self.run_with_progress(requests, |_| {}).await
    }

    // fetch every site in order, calling `on_progress` after each one
    pub async fn run_with_progress<F>(&self, requests: &[SiteRequest], mut on_progress: F) -> SessionEntry
    where
        F: FnMut(&SiteProgress) + Send,
    {
        let requests = unique_requests(requests);
        let total = requests.len();

        info!(sites = total, policy = ?self.settings.policy, "Starting fetch run");
        self.publish(
            RunState::Running,
            0.0,
            format!("Preparing to fetch data for {} site(s)...", total),
            StatusLevel::Info,
        );

        let mut sites = Vec::with_capacity(total);
        let mut data = BTreeMap::new();

        for (index, request) in requests.iter().enumerate() {
            self.publish(
                RunState::Running,
                index as f64 / total as f64,
                format!("Fetching data for {}...", request.icao),
                StatusLevel::Info,
            );

            let result = self.fetch_site(request).await;
            sites.push(request.icao.clone());
            data.insert(request.icao.clone(), result);

            let progress = SiteProgress {
                site: request.icao.clone(),
                completed: index + 1,
                total,
            };
            on_progress(&progress);
            self.publish(
                RunState::Running,
                progress.fraction(),
                format!("Fetched {} ({}/{})", request.icao, index + 1, total),
                StatusLevel::Info,
            );
        }

        let entry = SessionEntry {
            timestamp: Utc::now(),
            sites,
            data,
        };

        let stats = entry.stats();
        let (state, level) = if entry.has_errors() {
            (RunState::CompletedWithErrors, StatusLevel::Error)
        } else {
            (RunState::Completed, StatusLevel::Success)
        };
        info!(
            sites = total,
            successful = stats.successful,
            failed = stats.failed,
            data_points = stats.data_points,
            "Fetch run complete"
        );
        self.publish(
            state,
            1.0,
            format!(
                "Completed fetching data for {} sites ({} of {} requests succeeded)",
                total, stats.successful, stats.total
            ),
            level,
        );

        entry
    }

    // site boundary: anything escaping per-item handling, panics included, lands here
    async fn fetch_site(&self, request: &SiteRequest) -> SiteResult {
        match AssertUnwindSafe(self.fetch_site_items(request)).catch_unwind().await {
            Ok(Ok(record)) => SiteResult::Record(record),
            Ok(Err(e)) => {
                error!(site = %request.icao, error = %e, "Site fetch failed");
                SiteResult::Failed {
                    site: request.icao.clone(),
                    error: e.to_string(),
                }
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(site = %request.icao, error = %message, "Site fetch panicked");
                SiteResult::Failed {
                    site: request.icao.clone(),
                    error: message,
                }
            }
        }
    }

    async fn fetch_site_items(&self, request: &SiteRequest) -> FetchResult<SiteRecord> {
        let site = request.icao.as_str();
        if !is_valid_icao(site) {
            return Err(FetchError::InvalidSite(site.to_string()));
        }

        let region = gfa_region_for(site);
        let mut record = SiteRecord::new(site, region, Utc::now());

        let plan: Vec<(ItemKind, &str)> = request
            .alpha_types
            .iter()
            .map(|code| (ItemKind::Alpha, code.as_str()))
            .chain(
                request
                    .image_types
                    .iter()
                    .map(|code| (ItemKind::Image, code.as_str())),
            )
            .collect();
        record.items = plan
            .iter()
            .map(|(kind, code)| FetchItemOutcome::pending(code, *kind))
            .collect();

        match self.settings.policy {
            FetchPolicy::Sequential => {
                for (index, (kind, code)) in plan.iter().enumerate() {
                    let fetch = self.fetch_item(site, region, *kind, code).await;
                    let throttle = matches!(fetch, ItemFetch::Done { .. });
                    apply_item(&mut record, index, *kind, code, fetch);
                    if throttle && !self.settings.request_delay.is_zero() {
                        tokio::time::sleep(self.settings.request_delay).await;
                    }
                }
            }
            FetchPolicy::Parallel => {
                let fetches = join_all(
                    plan.iter()
                        .map(|(kind, code)| self.fetch_item(site, region, *kind, code)),
                )
                .await;
                for (index, ((kind, code), fetch)) in plan.iter().zip(fetches).enumerate() {
                    apply_item(&mut record, index, *kind, code, fetch);
                }
            }
        }

        finalize(&mut record);
        info!(
            site = %site,
            region = ?region,
            total = record.fetch_summary.total_requests,
            successful = record.fetch_summary.successful_requests,
            failed = record.fetch_summary.failed_requests,
            data_points = record.fetch_summary.data_points,
            "Site fetch finished"
        );
        Ok(record)
    }

    async fn fetch_item(
        &self,
        site: &str,
        region: Option<&str>,
        kind: ItemKind,
        code: &str,
    ) -> ItemFetch {
        if code.trim().is_empty() {
            return ItemFetch::Skipped("empty type code".to_string());
        }

        let started = Instant::now();
        let result = match kind {
            ItemKind::Alpha => self
                .client
                .fetch_alpha(site, code)
                .await
                .map_err(|e| e.to_string()),
            ItemKind::Image => self.fetch_image_item(site, region, code).await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = &result {
            warn!(site = %site, item = %code, error = %e, "Failed to fetch item");
        }

        ItemFetch::Done { result, elapsed_ms }
    }

    async fn fetch_image_item(
        &self,
        site: &str,
        region: Option<&str>,
        code: &str,
    ) -> Result<Value, String> {
        let resolution = match (ImageCategory::of(code), region) {
            (ImageCategory::Gfa, Some(region)) => self.gfa.resolve(site, region, code).await,
            _ => self
                .imagery
                .resolve(site, region, code)
                .await
                .map_err(|e| e.to_string())?,
        };

        debug!(site = %site, image = %code, images = ?resolution.image_count(), "Image resolved");

        // an empty direct probe is a soft failure, counted like any other
        if resolution.is_empty() {
            return Err(empty_resolution_message(code, &resolution));
        }
        Ok(resolution.into_payload())
    }
}

fn empty_resolution_message(code: &str, resolution: &ImageResolution) -> String {
    match resolution {
        ImageResolution::Direct {
            api_error: Some(api_error),
            ..
        } => format!("No imagery found for {} (last api error: {})", code, api_error),
        _ => format!("No imagery found for {}", code),
    }
}

// keep the first request per site, normalising the code
fn unique_requests(requests: &[SiteRequest]) -> Vec<SiteRequest> {
    let mut unique: Vec<SiteRequest> = Vec::with_capacity(requests.len());
    for request in requests {
        let icao = normalize_site(&request.icao);
        if icao.is_empty() || unique.iter().any(|r| r.icao == icao) {
            continue;
        }
        // repeated type codes would fetch twice but store once
        unique.push(SiteRequest {
            icao,
            alpha_types: unique_codes(&request.alpha_types, str::to_lowercase),
            image_types: unique_codes(&request.image_types, str::to_uppercase),
        });
    }
    unique
}

fn apply_item(record: &mut SiteRecord, index: usize, kind: ItemKind, code: &str, fetch: ItemFetch) {
    let payload = match fetch {
        ItemFetch::Skipped(reason) => {
            record.items[index].skip(reason);
            return;
        }
        ItemFetch::Done {
            result: Ok(value),
            elapsed_ms,
        } => {
            record.items[index].succeed(elapsed_ms);
            record.fetch_summary.successful_requests += 1;
            ItemPayload::Data(value)
        }
        ItemFetch::Done { result: Err(e), .. } => {
            record.items[index].fail(e.clone());
            record.fetch_summary.failed_requests += 1;
            ItemPayload::error(e)
        }
    };
    record.fetch_summary.total_requests += 1;

    let target = match kind {
        ItemKind::Alpha => &mut record.alpha_data,
        ItemKind::Image => &mut record.image_data,
    };
    target.insert(code.to_string(), payload);
}

fn finalize(record: &mut SiteRecord) {
    let data_points: u64 = record
        .alpha_data
        .values()
        .chain(record.image_data.values())
        .map(ItemPayload::data_points)
        .sum();
    record.fetch_summary.data_points = data_points;
    record.fetch_summary.end_time = Some(Utc::now());
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unexpected panic".to_string())
}
