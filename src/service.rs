//! Orchestrator.
//!
//! Owns the poll cadence and is the only writer of the state store. Each
//! cycle scans every active target, diffs it, hands the events to the alert
//! dispatcher and writes the report. Key watchers run on their own threads
//! and are started and joined from here.

use crate::alert::AlertHandle;
use crate::config::{MonitorConfig, MonitorTarget, RegistryTarget};
use crate::diff;
use crate::error::{MonitorError, MonitorResult};
use crate::event::{ChangeEvent, ChangeKind};
use crate::keystore::{read_or_unavailable, KeyValueStore};
use crate::lister::DirectoryLister;
use crate::report::{generate_report, ReportSink};
use crate::scanner::Scanner;
use crate::shutdown::ShutdownToken;
use crate::state::StateStore;
use crate::watcher::{KeyWatcher, WatcherExit, WatcherHandle};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// What one poll cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub events: Vec<ChangeEvent>,
    /// Targets whose root could not be listed this cycle
    pub skipped: Vec<PathBuf>,
    pub scan_issues: usize,
    pub report_written: bool,
}

impl CycleReport {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

pub struct MonitorService {
    config: MonitorConfig,
    targets: Vec<MonitorTarget>,
    registry: Vec<RegistryTarget>,
    store: StateStore,
    scanner: Scanner,
    keys: Arc<dyn KeyValueStore>,
    alerts: AlertHandle,
    report: Box<dyn ReportSink>,
    shutdown: ShutdownToken,
    watchers: Vec<WatcherHandle>,
    cycle: u64,
    started: bool,
}

impl MonitorService {
    /// Build the service; fails when no target is active
    pub fn new(
        config: MonitorConfig,
        targets: Vec<MonitorTarget>,
        lister: Arc<dyn DirectoryLister>,
        keys: Arc<dyn KeyValueStore>,
        alerts: AlertHandle,
        report: Box<dyn ReportSink>,
    ) -> MonitorResult<Self> {
        if !targets.iter().any(|t| t.active) {
            return Err(MonitorError::Startup("no accessible folders to monitor".to_string()));
        }

        let scanner = Scanner::new(lister, config.exclude.clone());
        let registry = config.registry.clone();

        Ok(MonitorService {
            config,
            targets,
            registry,
            store: StateStore::new(),
            scanner,
            keys,
            alerts,
            report,
            shutdown: ShutdownToken::new(),
            watchers: Vec::new(),
            cycle: 0,
            started: false,
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn targets(&self) -> &[MonitorTarget] {
        &self.targets
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Token that stops `run` and every watcher when cancelled
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Seed the baseline and start the key watchers
    ///
    /// The initial scan is recorded without alerts so existing files are not
    /// reported as new on the first cycle.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        info!("Monitoring {} folder(s) via {}", self.targets.len(), self.keys.backend());
        self.alerts.note("[*] Monitoring started");

        for target in &self.targets {
            if !target.active {
                debug!("Inactive target {} not seeded", target.path.display());
                continue;
            }

            match self.scanner.scan(&target.path) {
                Ok(scan) => {
                    let count = diff::seed(&mut self.store, target, &scan);
                    self.alerts
                        .note(format!("[*] Baseline for {} ({}): {} files", target.path.display(), target.label, count));
                }
                Err(e) => {
                    warn!("Baseline scan failed: {}", e);
                    self.alerts.note(format!("[ERROR] Baseline scan failed: {}", e));
                }
            }
        }

        self.seed_registry();
        self.start_watchers();
    }

    fn seed_registry(&mut self) {
        for target in self.registry.iter().filter(|t| t.active) {
            let key = target.key();
            for value in &target.values {
                let observed = read_or_unavailable(self.keys.as_ref(), &key, value);
                self.store.seed_registry_value(&target.subkey, value, observed);
            }
        }
    }

    fn start_watchers(&mut self) {
        let timeout = self.config.watch_timeout();

        for target in &self.registry {
            if !target.active {
                debug!("Inactive registry target {} not watched", target.key());
                continue;
            }

            for value in &target.values {
                let watcher = KeyWatcher::new(
                    target.key(),
                    value.clone(),
                    Arc::clone(&self.keys),
                    self.alerts.clone(),
                    self.shutdown.clone(),
                    timeout,
                );

                // Open failures are already logged by the watcher
                if let Ok(handle) = watcher.start() {
                    debug!("Watching {}", handle.name());
                    self.watchers.push(handle);
                }
            }
        }

        info!("{} key watcher(s) running", self.watchers.len());
    }

    // ========================================================================
    // Poll Cycle
    // ========================================================================

    /// Scan, diff, alert and report once
    pub fn run_cycle(&mut self) -> CycleReport {
        self.start();

        self.cycle += 1;
        let mut summary = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };
        self.alerts.note(format!("[DEBUG] Cycle {} started", self.cycle));

        for target in &self.targets {
            if !target.active {
                debug!("Skipping inactive target {}", target.path.display());
                continue;
            }

            let scan = match self.scanner.scan(&target.path) {
                Ok(scan) => scan,
                Err(e) => {
                    warn!("{}", e);
                    self.alerts.note(format!("[ERROR] Skipping {} this cycle: {}", target.path.display(), e));
                    summary.skipped.push(target.path.clone());
                    continue;
                }
            };

            summary.scan_issues += scan.issues.len();
            for issue in &scan.issues {
                self.alerts
                    .note(format!("[DEBUG] Skipped {} ({:?}): {}", issue.path.display(), issue.kind, issue.message));
            }

            // A target unreachable at startup has no baseline yet
            if self.store.snapshot(&target.path).is_none() {
                let count = diff::seed(&mut self.store, target, &scan);
                self.alerts
                    .note(format!("[*] Baseline for {} ({}): {} files", target.path.display(), target.label, count));
                continue;
            }

            let events = diff::diff(&mut self.store, target, &scan);
            for event in &events {
                self.alerts.emit(event);
            }
            self.alerts
                .note(format!("[DEBUG] {}: {} files", target.path.display(), scan.files.len()));
            summary.events.extend(events);
        }

        let report = generate_report(&self.store, &self.targets, &self.registry, self.keys.as_ref());
        match self.report.write(&report) {
            Ok(()) => summary.report_written = true,
            Err(e) => {
                error!("Failed to write report: {}", e);
                self.alerts.note(format!("[ERROR] Failed to write report: {}", e));
            }
        }

        self.alerts.note(format!(
            "[*] Cycle {} complete: {} new, {} modified, {} deleted",
            summary.cycle,
            summary.count(ChangeKind::New),
            summary.count(ChangeKind::Modified),
            summary.count(ChangeKind::Deleted),
        ));

        summary
    }

    /// Poll until the shutdown token is cancelled, then stop
    pub fn run(&mut self) -> Vec<WatcherExit> {
        self.start();
        let interval = self.config.interval();
        info!("Polling every {:?}", interval);

        while self.sleep_interval(interval) {
            let summary = self.run_cycle();
            debug!(
                "Cycle {}: {} event(s), {} skipped target(s), {} scan issue(s)",
                summary.cycle,
                summary.events.len(),
                summary.skipped.len(),
                summary.scan_issues
            );
        }

        self.stop()
    }

    /// Sleep for `interval`; false if shutdown was requested meanwhile
    fn sleep_interval(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        loop {
            if self.shutdown.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Cancel and join every watcher, then flush the sinks
    pub fn stop(&mut self) -> Vec<WatcherExit> {
        self.shutdown.cancel();

        let exits: Vec<WatcherExit> = self.watchers.drain(..).map(WatcherHandle::join).collect();
        if self.started {
            info!("Monitoring stopped; {} watcher(s) joined", exits.len());
            self.alerts.note("[*] Monitoring stopped");
            self.alerts.flush();
        }
        exits
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for handle in self.watchers.drain(..) {
            handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertDispatcher, ConsoleOptions, DispatcherStats, SilentNotifier};
    use crate::keystore::MemoryKeyStore;
    use crate::lister::FsLister;
    use crate::logsink::LogFile;
    use crate::report::{MemoryReport, Report};
    use std::fs;
    use std::thread::JoinHandle;

    struct BrokenReport;

    impl ReportSink for BrokenReport {
        fn write(&mut self, _report: &Report) -> MonitorResult<()> {
            Err(MonitorError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }
    }

    fn quiet_config() -> MonitorConfig {
        MonitorConfig {
            registry: Vec::new(),
            include_user_folders: false,
            system_folders: Vec::new(),
            ..MonitorConfig::default()
        }
    }

    fn dispatcher(dir: &tempfile::TempDir) -> MonitorResult<(AlertHandle, JoinHandle<DispatcherStats>)> {
        let log = LogFile::open(&dir.path().join("agent.log"))?;
        let console = ConsoleOptions { enabled: false, colored: false };
        AlertDispatcher::new(log, Box::new(SilentNotifier), console).spawn()
    }

    fn service(
        target: &std::path::Path,
        alerts: AlertHandle,
        report: Box<dyn ReportSink>,
    ) -> MonitorResult<MonitorService> {
        MonitorService::new(
            quiet_config(),
            vec![MonitorTarget::new(target, "Test")],
            Arc::new(FsLister),
            Arc::new(MemoryKeyStore::new()),
            alerts,
            report,
        )
    }

    #[test]
    fn test_no_active_targets_is_startup_failure() -> MonitorResult<()> {
        let dir = tempfile::tempdir()?;
        let (alerts, _worker) = dispatcher(&dir)?;

        let mut target = MonitorTarget::new(dir.path(), "Test");
        target.active = false;
        let result = MonitorService::new(
            quiet_config(),
            vec![target],
            Arc::new(FsLister),
            Arc::new(MemoryKeyStore::new()),
            alerts,
            Box::new(MemoryReport::new()),
        );
        assert!(matches!(result, Err(MonitorError::Startup(_))));
        Ok(())
    }

    #[test]
    fn test_existing_files_are_not_new() -> MonitorResult<()> {
        let dir = tempfile::tempdir()?;
        let watched = dir.path().join("watched");
        fs::create_dir(&watched)?;
        fs::write(watched.join("existing.txt"), b"x")?;

        let (alerts, _worker) = dispatcher(&dir)?;
        let mut service = service(&watched, alerts, Box::new(MemoryReport::new()))?;

        service.start();
        let first = service.run_cycle();
        assert!(first.events.is_empty());
        assert_eq!(service.store().tracked_files(), 1);
        service.stop();
        Ok(())
    }

    #[test]
    fn test_unreachable_root_keeps_snapshot() -> MonitorResult<()> {
        let dir = tempfile::tempdir()?;
        let watched = dir.path().join("watched");
        fs::create_dir(&watched)?;
        fs::write(watched.join("a.txt"), b"a")?;

        let (alerts, _worker) = dispatcher(&dir)?;
        let mut service = service(&watched, alerts, Box::new(MemoryReport::new()))?;
        service.start();

        fs::remove_dir_all(&watched)?;
        let cycle = service.run_cycle();

        assert!(cycle.events.is_empty());
        assert_eq!(cycle.skipped, vec![watched.clone()]);
        assert_eq!(service.store().snapshot(&watched).map(|s| s.len()), Some(1));
        service.stop();
        Ok(())
    }

    #[test]
    fn test_unreachable_target_does_not_block_others() -> MonitorResult<()> {
        let dir = tempfile::tempdir()?;
        let gone = dir.path().join("gone");
        let alive = dir.path().join("alive");
        fs::create_dir(&gone)?;
        fs::create_dir(&alive)?;
        fs::write(gone.join("a.txt"), b"a")?;

        let (alerts, _worker) = dispatcher(&dir)?;
        let mut service = MonitorService::new(
            quiet_config(),
            vec![MonitorTarget::new(&gone, "First"), MonitorTarget::new(&alive, "Second")],
            Arc::new(FsLister),
            Arc::new(MemoryKeyStore::new()),
            alerts,
            Box::new(MemoryReport::new()),
        )?;
        service.start();

        fs::remove_dir_all(&gone)?;
        fs::write(alive.join("b.txt"), b"b")?;
        let cycle = service.run_cycle();

        assert_eq!(cycle.skipped, vec![gone.clone()]);
        assert_eq!(cycle.events.len(), 1);
        assert_eq!(cycle.events[0].kind, ChangeKind::New);
        assert_eq!(cycle.events[0].subject, alive.join("b.txt").display().to_string());
        assert!(cycle.report_written);
        service.stop();
        Ok(())
    }

    #[test]
    fn test_report_failure_does_not_stop_cycle() -> MonitorResult<()> {
        let dir = tempfile::tempdir()?;
        let watched = dir.path().join("watched");
        fs::create_dir(&watched)?;

        let (alerts, _worker) = dispatcher(&dir)?;
        let mut service = service(&watched, alerts, Box::new(BrokenReport))?;
        service.start();

        fs::write(watched.join("new.txt"), b"n")?;
        let cycle = service.run_cycle();
        assert_eq!(cycle.count(ChangeKind::New), 1);
        assert!(!cycle.report_written);

        assert_eq!(service.run_cycle().cycle, 2);
        service.stop();
        Ok(())
    }

    #[test]
    fn test_run_returns_after_cancel() -> MonitorResult<()> {
        let dir = tempfile::tempdir()?;
        let (alerts, _worker) = dispatcher(&dir)?;
        let report = MemoryReport::new();
        let mut service = service(dir.path(), alerts, Box::new(report.clone()))?;

        let token = service.shutdown_token();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(1500));
            token.cancel();
        });

        service.run();
        canceller.join().ok();
        assert!(report.writes() >= 1);
        Ok(())
    }
}
