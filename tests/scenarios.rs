use hostwatch::alert::{AlertDispatcher, AlertHandle, ConsoleOptions, DispatcherStats, RecordingNotifier};
use hostwatch::config::{MonitorConfig, MonitorTarget, RegistryTarget};
use hostwatch::discovery::{discover, Candidate};
use hostwatch::error::MonitorResult;
use hostwatch::event::ChangeKind;
use hostwatch::keystore::{MemoryKeyStore, RegistryRoot};
use hostwatch::lister::FsLister;
use hostwatch::logsink::LogFile;
use hostwatch::report::MemoryReport;
use hostwatch::service::MonitorService;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const RUN_KEY: &str = "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run";

fn config(registry: Vec<RegistryTarget>) -> MonitorConfig {
    MonitorConfig {
        include_user_folders: false,
        system_folders: Vec::new(),
        registry,
        watch_timeout_ms: 50,
        ..MonitorConfig::default()
    }
}

fn dispatcher(
    dir: &Path,
    notifier: &RecordingNotifier,
) -> MonitorResult<(AlertHandle, JoinHandle<DispatcherStats>)> {
    let log = LogFile::open(&dir.join("hostwatch.log"))?;
    let console = ConsoleOptions { enabled: false, colored: false };
    AlertDispatcher::new(log, Box::new(notifier.clone()), console).spawn()
}

// Files written back to back can share a modification second; a later
// write must land in a later second to be seen as a modification.
fn next_second() {
    thread::sleep(Duration::from_millis(1100));
}

#[test]
fn folder_add_delete_quiet_cycles() -> MonitorResult<()> {
    let dir = tempfile::tempdir()?;
    let watched = dir.path().join("watched");
    fs::create_dir(&watched)?;
    fs::write(watched.join("a.txt"), b"a")?;

    let notifier = RecordingNotifier::new();
    let (alerts, worker) = dispatcher(dir.path(), &notifier)?;
    let mut service = MonitorService::new(
        config(Vec::new()),
        vec![MonitorTarget::new(&watched, "Test")],
        Arc::new(FsLister),
        Arc::new(MemoryKeyStore::new()),
        alerts,
        Box::new(MemoryReport::new()),
    )?;
    service.start();

    let first = service.run_cycle();
    assert!(first.events.is_empty());

    fs::write(watched.join("b.txt"), b"b")?;
    let second = service.run_cycle();
    assert_eq!(second.events.len(), 1);
    assert_eq!(second.events[0].kind, ChangeKind::New);
    assert!(second.events[0].subject.ends_with("b.txt"));

    fs::remove_file(watched.join("a.txt"))?;
    let third = service.run_cycle();
    assert_eq!(third.events.len(), 1);
    assert_eq!(third.events[0].kind, ChangeKind::Deleted);
    assert!(third.events[0].subject.ends_with("a.txt"));

    let fourth = service.run_cycle();
    assert!(fourth.events.is_empty());

    let snapshot = service.store().snapshot(&watched).map(|s| s.keys().cloned().collect::<Vec<_>>());
    assert_eq!(snapshot, Some(vec![watched.join("b.txt")]));

    service.stop();
    drop(service);
    let stats = worker.join().map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "dispatcher panicked"))?;
    assert_eq!(stats.alerts, 2);
    assert_eq!(notifier.notifications().len(), 2);
    Ok(())
}

#[test]
fn modified_file_is_reported_once() -> MonitorResult<()> {
    let dir = tempfile::tempdir()?;
    let watched = dir.path().join("watched");
    fs::create_dir_all(watched.join("nested"))?;
    fs::write(watched.join("nested").join("c.txt"), b"c")?;

    let notifier = RecordingNotifier::new();
    let (alerts, _worker) = dispatcher(dir.path(), &notifier)?;
    let mut service = MonitorService::new(
        config(Vec::new()),
        vec![MonitorTarget::new(&watched, "Test")],
        Arc::new(FsLister),
        Arc::new(MemoryKeyStore::new()),
        alerts,
        Box::new(MemoryReport::new()),
    )?;
    service.start();

    next_second();
    fs::write(watched.join("nested").join("c.txt"), b"changed")?;

    let cycle = service.run_cycle();
    assert_eq!(cycle.count(ChangeKind::Modified), 1);
    assert!(service.run_cycle().events.is_empty());

    service.stop();
    Ok(())
}

#[test]
fn registry_value_change_is_alerted_and_reported() -> MonitorResult<()> {
    let dir = tempfile::tempdir()?;
    let watched = dir.path().join("watched");
    fs::create_dir(&watched)?;

    let run = RegistryTarget::new(RegistryRoot::LocalMachine, RUN_KEY, ["X"]);
    let keys = MemoryKeyStore::new();
    keys.create_key(&run.key());

    let notifier = RecordingNotifier::new();
    let (alerts, worker) = dispatcher(dir.path(), &notifier)?;
    let report = MemoryReport::new();
    let mut service = MonitorService::new(
        config(vec![run.clone()]),
        vec![MonitorTarget::new(&watched, "Test")],
        Arc::new(FsLister),
        Arc::new(keys.clone()),
        alerts,
        Box::new(report.clone()),
    )?;
    service.start();
    assert_eq!(service.watcher_count(), 1);
    assert_eq!(service.store().registry_baseline()[RUN_KEY]["X"], "N/A");

    keys.set_value(&run.key(), "X", "C:\\app.exe");

    let deadline = Instant::now() + Duration::from_secs(5);
    while notifier.notifications().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }

    let cycle = service.run_cycle();
    assert!(cycle.events.is_empty());
    let last = report.last().map(|r| r.registry[RUN_KEY]["X"].clone());
    assert_eq!(last.as_deref(), Some("C:\\app.exe"));

    // The baseline is captured once and never refreshed
    assert_eq!(service.store().registry_baseline()[RUN_KEY]["X"], "N/A");

    let exits = service.stop();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].notifications, 1);
    drop(service);
    worker.join().ok();

    let seen = notifier.notifications();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].1.starts_with("Registry value changed: "));
    assert!(seen[0].1.ends_with("New value: C:\\app.exe"));
    Ok(())
}

#[test]
fn one_inaccessible_folder_of_five() -> MonitorResult<()> {
    let dir = tempfile::tempdir()?;
    let mut candidates = Vec::new();
    for name in ["one", "two", "three", "four"] {
        let path = dir.path().join(name);
        fs::create_dir(&path)?;
        candidates.push(Candidate::new(path, "System"));
    }
    candidates.insert(2, Candidate::new(dir.path().join("locked"), "System"));

    let found = discover(candidates, &FsLister);
    assert_eq!(found.targets.len(), 4);
    assert_eq!(found.skipped.len(), 1);
    assert_eq!(found.skipped[0].0.path, dir.path().join("locked"));

    let notifier = RecordingNotifier::new();
    let (alerts, _worker) = dispatcher(dir.path(), &notifier)?;
    let mut service = MonitorService::new(
        config(Vec::new()),
        found.targets,
        Arc::new(FsLister),
        Arc::new(MemoryKeyStore::new()),
        alerts,
        Box::new(MemoryReport::new()),
    )?;
    service.start();
    let cycle = service.run_cycle();
    assert!(cycle.skipped.is_empty());
    assert!(cycle.report_written);
    service.stop();
    Ok(())
}

#[test]
fn unchanged_tree_is_idempotent() -> MonitorResult<()> {
    let dir = tempfile::tempdir()?;
    let watched = dir.path().join("watched");
    fs::create_dir_all(watched.join("deep").join("er"))?;
    for name in ["x.txt", "deep/y.txt", "deep/er/z.txt"] {
        fs::write(watched.join(name), name.as_bytes())?;
    }

    let notifier = RecordingNotifier::new();
    let (alerts, _worker) = dispatcher(dir.path(), &notifier)?;
    let mut service = MonitorService::new(
        config(Vec::new()),
        vec![MonitorTarget::new(&watched, "Test")],
        Arc::new(FsLister),
        Arc::new(MemoryKeyStore::new()),
        alerts,
        Box::new(MemoryReport::new()),
    )?;
    service.start();

    for _ in 0..3 {
        assert!(service.run_cycle().events.is_empty());
    }
    assert_eq!(service.store().tracked_files(), 3);
    service.stop();
    Ok(())
}
