use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::{RunningStats, SessionEntry, SiteResult};

#[derive(Debug, Default)]
pub struct SessionAggregator {
    history: Vec<SessionEntry>,
    stats: RunningStats,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    // append a finished run and fold its counters into the running totals
    pub fn record(&mut self, entry: SessionEntry) -> &SessionEntry {
        let run_stats = entry.stats();
        info!(
            sites = entry.sites.len(),
            total = run_stats.total,
            failed = run_stats.failed,
            history = self.history.len() + 1,
            "Recorded fetch run"
        );
        self.stats.absorb(run_stats);
        self.history.push(entry);
        &self.history[self.history.len() - 1]
    }

    pub fn clear(&mut self) {
        info!(history = self.history.len(), "Clearing session history");
        self.history.clear();
        self.stats = RunningStats::default();
    }

    pub fn history(&self) -> &[SessionEntry] {
        &self.history
    }

    pub fn latest(&self) -> Option<&SessionEntry> {
        self.history.last()
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    // newest result for a site, searching back through the history
    pub fn latest_for_site(&self, site: &str) -> Option<(DateTime<Utc>, &SiteResult)> {
        self.history
            .iter()
            .rev()
            .find_map(|entry| entry.data.get(site).map(|result| (entry.timestamp, result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteRecord;
    use std::collections::BTreeMap;

    fn entry_with(site: &str, result: SiteResult) -> SessionEntry {
        let mut data = BTreeMap::new();
        data.insert(site.to_string(), result);
        SessionEntry {
            timestamp: Utc::now(),
            sites: vec![site.to_string()],
            data,
        }
    }

    fn record(site: &str, successful: u64, failed: u64) -> SiteResult {
        let mut record = SiteRecord::new(site, None, Utc::now());
        record.fetch_summary.successful_requests = successful;
        record.fetch_summary.failed_requests = failed;
        record.fetch_summary.total_requests = successful + failed;
        record.fetch_summary.data_points = successful;
        record.fetch_summary.end_time = Some(Utc::now());
        SiteResult::Record(record)
    }

    #[test]
    fn test_record_accumulates_stats() {
        let mut session = SessionAggregator::new();
        session.record(entry_with("CYYT", record("CYYT", 2, 1)));
        session.record(entry_with(
            "CYQX",
            SiteResult::Failed {
                site: "CYQX".to_string(),
                error: "boom".to_string(),
            },
        ));

        assert_eq!(session.len(), 2);
        let stats = session.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.data_points, 2);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut session = SessionAggregator::new();
        session.record(entry_with("CYYT", record("CYYT", 1, 0)));
        session.clear();

        assert!(session.is_empty());
        assert!(session.latest().is_none());
        assert_eq!(session.stats(), &RunningStats::default());
    }

    #[test]
    fn test_latest_for_site_prefers_newest() {
        let mut session = SessionAggregator::new();
        session.record(entry_with("CYYT", record("CYYT", 1, 0)));
        session.record(entry_with("CYQX", record("CYQX", 1, 0)));
        session.record(entry_with("CYYT", record("CYYT", 0, 2)));

        let (_, result) = session.latest_for_site("CYYT").unwrap();
        assert_eq!(result.record().unwrap().fetch_summary.failed_requests, 2);
        assert!(session.latest_for_site("CYHZ").is_none());
    }
}
