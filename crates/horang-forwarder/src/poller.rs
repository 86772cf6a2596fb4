//! The poll loop
//!
//! One sequential worker walks the whole tree, reads what each file gained,
//! forwards one batch per file and then sleeps. Per file and per cycle:
//!
//! ```text
//! DISCOVERED -> CLASSIFIED -> { SKIPPED | READ_EMPTY | READ_NONEMPTY } -> (FORWARDED) -> OFFSET_UPDATED
//! ```
//!
//! Skip-list matches never touch the offset store. A file whose offset is the
//! skip sentinel is never handed to a reader again. CLASSIFIED happens once per
//! file: the first format detected on non-blank content is pinned in the
//! offset store and reused on every later cycle.

use crate::config::{CommitPolicy, ForwarderConfig};
use crate::detect::{FileFormat, SkipRules};
use crate::enrich::{Enricher, GeoLookup};
use crate::forwarder::Forwarder;
use crate::offsets::OffsetStore;
use crate::readers;
use horang_common::{Batch, FileOffset, HorangError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use walkdir::WalkDir;

/// Counters for one pass over the tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub files_seen: usize,
    /// Matched a skip-list rule this cycle
    pub skipped_by_rule: usize,
    /// Already carried the skip sentinel
    pub excluded: usize,
    /// Newly rejected by their reader
    pub rejected: usize,
    /// Nothing new to read, or the file could not be read this cycle
    pub unchanged: usize,
    pub batches_forwarded: usize,
    pub batches_failed: usize,
    pub records_forwarded: usize,
}

pub struct Poller<'a> {
    root: PathBuf,
    interval: Duration,
    rules: SkipRules,
    commit_policy: CommitPolicy,
    offsets: OffsetStore,
    enricher: Enricher<'a>,
    forwarder: Forwarder,
    cycles: u64,
}

impl<'a> Poller<'a> {
    pub fn new(config: ForwarderConfig, lookup: &'a dyn GeoLookup, forwarder: Forwarder) -> Self {
        Self {
            rules: config.skip_rules(),
            interval: config.poll_interval(),
            commit_policy: config.commit_policy,
            root: config.root,
            offsets: OffsetStore::new(),
            enricher: Enricher::new(lookup),
            forwarder,
            cycles: 0,
        }
    }

    pub fn offsets(&self) -> &OffsetStore {
        &self.offsets
    }

    /// Cycle until `shutdown` resolves; errors from a cycle are fatal
    ///
    /// Shutdown is observed mid-cycle as well as during the sleep. A batch
    /// abandoned that way leaves its offset uncommitted.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            root = %self.root.display(),
            interval_secs = self.interval.as_secs(),
            sink = self.forwarder.sink_name(),
            commit_policy = %self.commit_policy,
            "Poll loop started"
        );

        loop {
            let report = tokio::select! {
                _ = &mut shutdown => None,
                report = self.run_cycle() => Some(report?),
            };
            let Some(report) = report else {
                self.log_stopped(true);
                return Ok(());
            };
            debug!(?report, "Cycle complete");

            tokio::select! {
                _ = &mut shutdown => {
                    self.log_stopped(false);
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn log_stopped(&self, mid_cycle: bool) {
        info!(
            cycles = self.cycles,
            tracked = self.offsets.len(),
            excluded = self.offsets.skipped(),
            mid_cycle,
            "Poll loop stopped"
        );
    }

    /// Walk the tree once
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycles += 1;
        let span = info_span!("poll_cycle", n = self.cycles);
        self.walk().instrument(span).await
    }

    async fn walk(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(HorangError::Walk(format!("{}: {}", self.root.display(), e)));
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            report.files_seen += 1;
            self.process(entry.path(), &mut report).await?;
        }

        if report.records_forwarded > 0 || report.rejected > 0 || report.batches_failed > 0 {
            info!(
                files = report.files_seen,
                forwarded = report.records_forwarded,
                batches = report.batches_forwarded,
                failed = report.batches_failed,
                rejected = report.rejected,
                "Cycle finished"
            );
        }
        Ok(report)
    }

    async fn process(&mut self, path: &Path, report: &mut CycleReport) -> Result<()> {
        if self.rules.matches(path) {
            report.skipped_by_rule += 1;
            return Ok(());
        }

        let offset = match self.offsets.get(path) {
            FileOffset::Skip => {
                report.excluded += 1;
                return Ok(());
            }
            FileOffset::Resume(offset) => offset,
        };

        let pinned = self.offsets.format(path);
        let (format, outcome) = match readers::read_path(path, pinned, offset) {
            Ok(read) => read,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File unreadable this cycle");
                report.unchanged += 1;
                return Ok(());
            }
        };

        if outcome.is_rejected() {
            info!(path = %path.display(), format = %format, "Excluding file");
            self.offsets.set(path, FileOffset::Skip);
            report.rejected += 1;
            return Ok(());
        }

        if pinned.is_none() && format != FileFormat::Unsupported {
            self.offsets.pin_format(path, format);
        }

        if outcome.records.is_empty() {
            if outcome.next != FileOffset::Resume(offset) {
                self.offsets.set(path, outcome.next);
            }
            report.unchanged += 1;
            return Ok(());
        }

        let records = self.enricher.enrich_all(outcome.records)?;
        let batch = Batch::new(path, offset, records);
        let delivered = self.forwarder.forward(&batch).await;

        if delivered {
            report.batches_forwarded += 1;
            report.records_forwarded += batch.len();
        } else {
            report.batches_failed += 1;
        }

        if self.commit_policy.should_commit(delivered) {
            self.offsets.set(path, outcome.next);
            debug!(path = %path.display(), format = %format, next = %outcome.next, "Offset committed");
        } else {
            debug!(path = %path.display(), offset, "Offset held for retry");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::enrich::{AsnInfo, Lookup};
    use crate::sink::{Sink, StreamSink};
    use std::fs;
    use std::net::IpAddr;
    use tempfile::TempDir;

    struct NoLookup;

    impl GeoLookup for NoLookup {
        fn country(&self, _ip: IpAddr) -> Result<Lookup<String>> {
            Ok(Lookup::NotFound)
        }

        fn city(&self, _ip: IpAddr) -> Result<Lookup<String>> {
            Ok(Lookup::NotFound)
        }

        fn asn(&self, _ip: IpAddr) -> Result<Lookup<AsnInfo>> {
            Ok(Lookup::NotFound)
        }
    }

    /// Never answers
    struct HangSink;

    #[async_trait::async_trait]
    impl Sink for HangSink {
        fn name(&self) -> &str {
            "hang"
        }

        async fn deliver(&self, _batch: &Batch) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
    }

    fn poller_with(root: &Path, sink: Box<dyn Sink>) -> Poller<'static> {
        let config = ForwarderConfig {
            root: root.to_path_buf(),
            ..ForwarderConfig::default()
        };
        let forwarder = Forwarder::new(sink, config.delivery.policy());
        Poller::new(config, &NoLookup, forwarder)
    }

    fn poller(root: &Path) -> Poller<'static> {
        poller_with(root, Box::new(StreamSink::new(std::io::sink())))
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut poller = poller(&dir.path().join("gone"));
        assert!(matches!(poller.run_cycle().await, Err(HorangError::Walk(_))));
    }

    #[tokio::test]
    async fn test_skip_listed_file_not_tracked() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tool.py"), "print('hi')\n").unwrap();
        fs::write(dir.path().join("__init__.txt"), "x\n").unwrap();

        let mut poller = poller(dir.path());
        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.files_seen, 2);
        assert_eq!(report.skipped_by_rule, 2);
        assert!(poller.offsets().is_empty());
    }

    #[tokio::test]
    async fn test_plaintext_partial_line_waits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "started\nhalf").unwrap();

        let mut poller = poller(dir.path());
        let report = poller.run_cycle().await.unwrap();
        assert_eq!(report.records_forwarded, 1);
        assert_eq!(poller.offsets().peek(&path), Some(FileOffset::Resume(8)));

        let report = poller.run_cycle().await.unwrap();
        assert_eq!(report.records_forwarded, 0);
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_binary_file_is_excluded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.dat");
        fs::write(&path, [0u8, 159, 146, 150, 0, 1]).unwrap();

        let mut poller = poller(dir.path());
        assert_eq!(poller.run_cycle().await.unwrap().rejected, 1);
        assert_eq!(poller.offsets().peek(&path), Some(FileOffset::Skip));

        let report = poller.run_cycle().await.unwrap();
        assert_eq!(report.excluded, 1);
        assert_eq!(report.rejected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut poller = poller(dir.path());
        poller
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(poller.cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_hanging_delivery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "started\n").unwrap();

        let mut poller = poller_with(dir.path(), Box::new(HangSink));
        let started = tokio::time::Instant::now();
        poller
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(poller.cycles, 1);
        assert_eq!(poller.offsets().peek(&path), Some(FileOffset::Resume(0)));
    }
}
