// src/pipeline/scheduler.rs

//! Polling loop over every watched section.
//!
//! A cycle fetches each section, admits what is new, and fans each admitted
//! release out before the next one in the same section. Sections are
//! independent: a failing section is logged and skipped, and only storage
//! failures stop the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, ReleaseRecord, SectionCatalog, SectionDescriptor};
use crate::pipeline::{ChangeDetector, NotificationDispatcher};
use crate::services::ListingSource;

/// Counters for one polling cycle.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sections_total: usize,
    pub sections_failed: usize,

    /// Sections seeded during the cycle because they had no history yet
    pub sections_seeded: usize,

    pub admitted: usize,
    pub suppressed: usize,
    pub delivered: usize,
    pub deactivated: usize,
    pub failed_deliveries: usize,
}

impl CycleStats {
    fn new(sections_total: usize) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            sections_total,
            sections_failed: 0,
            sections_seeded: 0,
            admitted: 0,
            suppressed: 0,
            delivered: 0,
            deactivated: 0,
            failed_deliveries: 0,
        }
    }

    fn record(&mut self, outcome: SectionOutcome) {
        match outcome {
            SectionOutcome::Seeded => self.sections_seeded += 1,
            SectionOutcome::Processed {
                admitted,
                suppressed,
                delivered,
                deactivated,
                failed,
            } => {
                self.admitted += admitted;
                self.suppressed += suppressed;
                self.delivered += delivered;
                self.deactivated += deactivated;
                self.failed_deliveries += failed;
            }
        }
    }
}

/// Counters for the bootstrap phase.
#[derive(Debug, Clone, Default)]
pub struct BootstrapStats {
    pub seeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum SectionOutcome {
    Seeded,
    Processed {
        admitted: usize,
        suppressed: usize,
        delivered: usize,
        deactivated: usize,
        failed: usize,
    },
}

/// Drives bootstrap and the polling loop.
pub struct Scheduler {
    catalog: SectionCatalog,
    source: Arc<dyn ListingSource>,
    detector: ChangeDetector,
    dispatcher: NotificationDispatcher,
    max_concurrent: usize,
    request_delay: Duration,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        catalog: SectionCatalog,
        source: Arc<dyn ListingSource>,
        detector: ChangeDetector,
        dispatcher: NotificationDispatcher,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            source,
            detector,
            dispatcher,
            max_concurrent: config.crawler.max_concurrent.max(1),
            request_delay: Duration::from_millis(config.crawler.request_delay_ms),
            poll_interval: config.scheduler.poll_interval(),
            shutdown,
        }
    }

    pub fn catalog(&self) -> &SectionCatalog {
        &self.catalog
    }

    /// Fetch a section in insertion order: the top of a listing page is
    /// its newest release, so it gets the highest sequence id.
    async fn fetch_oldest_first(&self, section: &SectionDescriptor) -> Result<Vec<ReleaseRecord>> {
        let mut records = self.source.fetch(section).await?;
        records.reverse();
        Ok(records)
    }

    /// Seed sections with their current listings without notifying.
    ///
    /// Sections that already have history are skipped unless `force` is set.
    pub async fn bootstrap(&self, force: bool) -> Result<BootstrapStats> {
        log::info!("Bootstrapping {} sections", self.catalog.len());
        let mut stats = BootstrapStats::default();

        let mut results = stream::iter(&self.catalog.sections)
            .map(|section| async move {
                let result = self.seed_section(section, force).await;
                (section, result)
            })
            .buffer_unordered(self.max_concurrent);

        let mut index = 0;
        while let Some((section, result)) = results.next().await {
            index += 1;
            match result {
                Ok(true) => stats.seeded += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    self.contain(e, &format!("Seeding {}", section.section_key))?;
                }
            }
            self.pause_between_requests(index).await?;
        }

        log::info!(
            "Bootstrap complete: {} seeded, {} already seeded, {} failed",
            stats.seeded,
            stats.skipped,
            stats.failed
        );
        Ok(stats)
    }

    /// Seed one section. Returns false when it was skipped.
    async fn seed_section(&self, section: &SectionDescriptor, force: bool) -> Result<bool> {
        let key = section.section_key;
        if !force && self.detector.is_initialized(key).await? {
            return Ok(false);
        }
        let records = self.fetch_oldest_first(section).await?;
        self.detector.initialize(key, &records).await?;
        Ok(true)
    }

    /// Run one polling cycle over every section.
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let mut stats = CycleStats::new(self.catalog.len());

        let mut results = stream::iter(&self.catalog.sections)
            .map(|section| async move {
                let result = self.process_section(section).await;
                (section, result)
            })
            .buffer_unordered(self.max_concurrent);

        let mut index = 0;
        while let Some((section, result)) = results.next().await {
            index += 1;
            match result {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    stats.sections_failed += 1;
                    self.contain(e, &format!("Section {}", section.section_key))?;
                }
            }
            self.pause_between_requests(index).await?;
        }

        stats.finished_at = Utc::now();
        log::info!(
            "Cycle complete in {}s: {} new, {} suppressed, {} delivered, {}/{} sections failed",
            (stats.finished_at - stats.started_at).num_seconds(),
            stats.admitted,
            stats.suppressed,
            stats.delivered,
            stats.sections_failed,
            stats.sections_total
        );
        Ok(stats)
    }

    /// Fetch, diff, and fan out one section.
    async fn process_section(&self, section: &SectionDescriptor) -> Result<SectionOutcome> {
        let key = section.section_key;
        let records = self.fetch_oldest_first(section).await?;

        if !self.detector.is_initialized(key).await? {
            log::info!("{key} has no history yet, seeding instead of announcing");
            self.detector.initialize(key, &records).await?;
            return Ok(SectionOutcome::Seeded);
        }

        let admission = self.detector.admit(key, &records).await?;

        let mut delivered = 0;
        let mut deactivated = 0;
        let mut failed = 0;
        for record in &admission.admitted {
            let report = self.dispatcher.dispatch(record).await?;
            delivered += report.delivered.len();
            deactivated += report.deactivated.len();
            failed += report.failed.len();
        }

        Ok(SectionOutcome::Processed {
            admitted: admission.admitted.len(),
            suppressed: admission.suppressed.len(),
            delivered,
            deactivated,
            failed,
        })
    }

    /// Bootstrap, then poll until shutdown or a fatal error.
    pub async fn run(&self) -> Result<()> {
        match self.bootstrap(false).await {
            Err(AppError::Shutdown) => return Ok(()),
            result => {
                result?;
            }
        }

        loop {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(AppError::Shutdown) => break,
                Err(e) => {
                    log::error!("Stopping scheduler: {e}");
                    return Err(e);
                }
            }

            log::info!("Next cycle in {}s", self.poll_interval.as_secs());
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        log::info!("Scheduler stopped");
        Ok(())
    }

    /// Log a per-section failure, or return it when it must stop the run.
    fn contain(&self, error: AppError, context: &str) -> Result<()> {
        if error.is_fatal() || matches!(error, AppError::Shutdown) {
            return Err(error);
        }
        log::warn!("{context} failed: {error}");
        Ok(())
    }

    /// Wait the configured delay after a finished section, unless it was
    /// the last one.
    async fn pause_between_requests(&self, finished: usize) -> Result<()> {
        if self.request_delay.is_zero() || finished >= self.catalog.len() {
            return Ok(());
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(AppError::Shutdown),
            _ = tokio::time::sleep(self.request_delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Genre, KnownIdEntry, Listing, SectionKey};
    use crate::pipeline::testing::{RecordingSender, StubSource};
    use crate::storage::{LocalStorage, LocalSubscriberRegistry, ReleaseStore};
    use async_trait::async_trait;
    use tempfile::{TempDir, tempdir};

    const TECHNO_NEW: SectionKey = SectionKey {
        genre: Genre::TechnoElectro,
        listing: Listing::New,
    };
    const REGGAE_NEW: SectionKey = SectionKey {
        genre: Genre::Reggae,
        listing: Listing::New,
    };

    struct Harness {
        _dir: TempDir,
        storage: Arc<LocalStorage>,
        source: Arc<StubSource>,
        sender: Arc<RecordingSender>,
        scheduler: Scheduler,
    }

    fn catalog(keys: &[SectionKey]) -> SectionCatalog {
        SectionCatalog {
            sections: keys
                .iter()
                .map(|key| SectionDescriptor::new("https://example.com", *key))
                .collect(),
        }
    }

    async fn harness(max_concurrent: usize) -> Harness {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path(), 100));
        let registry = Arc::new(LocalSubscriberRegistry::new(
            dir.path().join("subscribers.json"),
        ));
        registry.subscribe(1, Genre::TechnoElectro).await.unwrap();
        registry.subscribe(2, Genre::Reggae).await.unwrap();

        let source = Arc::new(StubSource::default());
        let sender = Arc::new(RecordingSender::default());

        let mut config = Config::default();
        config.crawler.max_concurrent = max_concurrent;

        let scheduler = Scheduler::new(
            &config,
            catalog(&[TECHNO_NEW, REGGAE_NEW]),
            source.clone(),
            ChangeDetector::new(storage.clone()),
            NotificationDispatcher::new(registry, sender.clone(), 4),
            CancellationToken::new(),
        );

        Harness {
            _dir: dir,
            storage,
            source,
            sender,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_without_notifying() {
        let h = harness(1).await;
        h.source.set(TECHNO_NEW, &[102, 101]);
        h.source.set(REGGAE_NEW, &[201]);

        let stats = h.scheduler.bootstrap(false).await.unwrap();
        assert_eq!(stats.seeded, 2);
        assert_eq!(h.sender.sent_count(), 0);

        let stats = h.scheduler.bootstrap(false).await.unwrap();
        assert_eq!(stats.skipped, 2);

        let stats = h.scheduler.bootstrap(true).await.unwrap();
        assert_eq!(stats.seeded, 2);
    }

    #[tokio::test]
    async fn test_cycle_announces_new_release_once() {
        let h = harness(2).await;
        h.source.set(TECHNO_NEW, &[102, 101]);
        h.source.set(REGGAE_NEW, &[201]);
        h.scheduler.bootstrap(false).await.unwrap();

        h.source.set(TECHNO_NEW, &[103, 102, 101]);
        let stats = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(h.sender.sent_to(), vec![1]);

        let entries: Vec<KnownIdEntry> = h.storage.entries(TECHNO_NEW).await.unwrap();
        let newest = entries.iter().max_by_key(|e| e.sequence_id).unwrap();
        assert_eq!(newest.external_id, 103);

        let stats = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(stats.admitted, 0);
        assert_eq!(h.sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_top_of_page_gets_highest_sequence() {
        let h = harness(1).await;
        h.source.set(TECHNO_NEW, &[3, 2, 1]);
        h.scheduler.bootstrap(false).await.unwrap();

        let ids: Vec<u64> = h
            .storage
            .entries(TECHNO_NEW)
            .await
            .unwrap()
            .iter()
            .map(|e| e.external_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failing_section_does_not_abort_cycle() {
        let h = harness(1).await;
        h.source.set(TECHNO_NEW, &[101]);
        h.source.set(REGGAE_NEW, &[201]);
        h.scheduler.bootstrap(false).await.unwrap();

        h.source.break_section(TECHNO_NEW);
        h.source.set(REGGAE_NEW, &[202, 201]);
        let stats = h.scheduler.run_cycle().await.unwrap();

        assert_eq!(stats.sections_failed, 1);
        assert_eq!(stats.admitted, 1);
        assert_eq!(h.sender.sent_to(), vec![2]);
    }

    #[tokio::test]
    async fn test_unseeded_section_is_seeded_during_cycle() {
        let h = harness(1).await;
        h.source.set(REGGAE_NEW, &[201]);
        h.source.break_section(TECHNO_NEW);
        let stats = h.scheduler.bootstrap(false).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.seeded, 1);

        h.source.restore(TECHNO_NEW);
        h.source.set(TECHNO_NEW, &[5, 4]);
        h.source.set(REGGAE_NEW, &[202, 201]);
        let stats = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(stats.sections_seeded, 1);
        assert_eq!(stats.admitted, 1);
        assert_eq!(h.sender.sent_to(), vec![2]);

        let ids: Vec<u64> = h
            .storage
            .entries(TECHNO_NEW)
            .await
            .unwrap()
            .iter()
            .map(|e| e.external_id)
            .collect();
        assert_eq!(ids, vec![4, 5]);
    }

    /// Store whose backing medium is gone.
    struct UnreachableStore;

    #[async_trait]
    impl ReleaseStore for UnreachableStore {
        async fn is_seeded(&self, _key: SectionKey) -> Result<bool> {
            Err(AppError::storage("sections", "disk unavailable"))
        }
        async fn seed(&self, _key: SectionKey, _records: &[ReleaseRecord]) -> Result<usize> {
            Err(AppError::storage("sections", "disk unavailable"))
        }
        async fn record_new(
            &self,
            _key: SectionKey,
            _records: &[ReleaseRecord],
        ) -> Result<Vec<ReleaseRecord>> {
            Err(AppError::storage("sections", "disk unavailable"))
        }
        async fn find(&self, _key: SectionKey, _id: u64) -> Result<Option<ReleaseRecord>> {
            Err(AppError::storage("sections", "disk unavailable"))
        }
        async fn entries(&self, _key: SectionKey) -> Result<Vec<KnownIdEntry>> {
            Err(AppError::storage("sections", "disk unavailable"))
        }
        async fn save_catalog(&self, _catalog: &SectionCatalog) -> Result<()> {
            Err(AppError::storage("sections.json", "disk unavailable"))
        }
        async fn load_catalog(&self) -> Result<Option<SectionCatalog>> {
            Err(AppError::storage("sections.json", "disk unavailable"))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_stops_run() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(LocalSubscriberRegistry::new(
            dir.path().join("subscribers.json"),
        ));
        let source = Arc::new(StubSource::default());
        source.set(TECHNO_NEW, &[1]);

        let scheduler = Scheduler::new(
            &Config::default(),
            catalog(&[TECHNO_NEW]),
            source,
            ChangeDetector::new(Arc::new(UnreachableStore)),
            NotificationDispatcher::new(registry, Arc::new(RecordingSender::default()), 1),
            CancellationToken::new(),
        );

        assert!(scheduler.run_cycle().await.unwrap_err().is_fatal());
        assert!(scheduler.run().await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let source = Arc::new(StubSource::default());
        source.set(TECHNO_NEW, &[1]);

        let scheduler = Scheduler::new(
            &Config::default(),
            catalog(&[TECHNO_NEW]),
            source,
            ChangeDetector::new(Arc::new(LocalStorage::new(dir.path(), 10))),
            NotificationDispatcher::new(
                Arc::new(LocalSubscriberRegistry::new(dir.path().join("s.json"))),
                Arc::new(RecordingSender::default()),
                1,
            ),
            shutdown.clone(),
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), scheduler.run())
            .await
            .unwrap()
            .unwrap();
    }
}
