use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::models::{SessionEntry, SiteRequest};
use crate::orchestrator::FetchOrchestrator;
use crate::session::SessionAggregator;

// run the orchestrator once and record the result in the session
pub async fn run_once(
    orchestrator: &FetchOrchestrator,
    session: &Mutex<SessionAggregator>,
    requests: &[SiteRequest],
) -> SessionEntry {
    let entry = orchestrator.run(requests).await;
    session.lock().await.record(entry.clone());
    entry
}

pub struct ContinuousRunner {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
    interval: Duration,
    started_at: DateTime<Utc>,
}

impl ContinuousRunner {
    pub fn start(
        orchestrator: Arc<FetchOrchestrator>,
        session: Arc<Mutex<SessionAggregator>>,
        requests: Vec<SiteRequest>,
        interval: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = broadcast::channel::<()>(1);

        info!(
            interval_secs = interval.as_secs(),
            sites = requests.len(),
            "Starting continuous mode"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // a run that overruns the period pushes the next one back instead of bunching up
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut runs: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!(runs, "Stopping continuous mode");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                // only the wait is interruptible, a started run always finishes
                runs += 1;
                let entry = run_once(&orchestrator, &session, &requests).await;
                info!(run = runs, sites = entry.sites.len(), "Continuous fetch finished");
            }
        });

        Self {
            shutdown,
            handle,
            interval,
            started_at: Utc::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    // ask the loop to exit once any in-flight run is done
    pub fn stop(&self) {
        self.shutdown.send(()).ok();
    }

    pub async fn stop_and_wait(self) {
        self.stop();
        self.handle.await.ok();
    }
}
