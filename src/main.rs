use anyhow::{Context, Result};
use hostwatch::alert::{AlertDispatcher, ConsoleOptions, DesktopNotifier, Notifier, SilentNotifier};
use hostwatch::cli::{self, Args, Command};
use hostwatch::config::MonitorConfig;
use hostwatch::discovery;
use hostwatch::keystore::{JsonFileKeyStore, KeyValueStore, RegistryKeyStore};
use hostwatch::lister::FsLister;
use hostwatch::logsink::LogFile;
use hostwatch::report::JsonFileReport;
use hostwatch::service::MonitorService;
use log::{error, info, warn, LevelFilter};
use std::process;
use std::sync::Arc;

fn main() {
    let args = cli::parse_args();

    let mut logger = env_logger::Builder::from_default_env();
    logger.format_timestamp_millis();
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    match run(&args) {
        Ok(()) => {}
        Err(e) => {
            error!("{:#}", e);
            eprintln!("hostwatch: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<()> {
    // ========================================================================
    // Load Configuration
    // ========================================================================

    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    match args.command() {
        Command::Version => {
            println!("hostwatch {} (driver {})", env!("CARGO_PKG_VERSION"), hostwatch_driver::DRIVER_VERSION);
            Ok(())
        }
        Command::Targets => print_targets(&config),
        Command::Run => monitor(args, config, false),
        Command::Once => monitor(args, config, true),
    }
}

fn key_store(config: &MonitorConfig) -> Arc<dyn KeyValueStore> {
    if cfg!(windows) {
        Arc::new(RegistryKeyStore)
    } else {
        Arc::new(JsonFileKeyStore::new(config.key_store_path.clone()))
    }
}

fn print_targets(config: &MonitorConfig) -> Result<()> {
    let found = discovery::discover(discovery::candidates(config), &FsLister);

    println!("Folders:");
    for target in &found.targets {
        println!("  {} ({})", target.path.display(), target.label);
    }
    for (candidate, reason) in &found.skipped {
        println!("  {} ({}) skipped: {}", candidate.path.display(), candidate.label, reason);
    }

    println!("Registry:");
    for target in &config.registry {
        let state = if target.active { "" } else { " [inactive]" };
        if target.values.is_empty() {
            println!("  {}{} (no values)", target.key(), state);
        }
        for value in &target.values {
            println!("  {}\\{}{}", target.key(), value, state);
        }
    }
    Ok(())
}

fn monitor(args: &Args, config: MonitorConfig, once: bool) -> Result<()> {
    // ========================================================================
    // Open Sinks
    // ========================================================================

    let log = LogFile::open(&config.log_path).context("no writable log file")?;

    let notifier: Box<dyn Notifier> = if config.popups {
        match DesktopNotifier::spawn() {
            Ok(desktop) => Box::new(desktop),
            Err(e) => {
                warn!("Popups disabled: {}", e);
                Box::new(SilentNotifier)
            }
        }
    } else {
        Box::new(SilentNotifier)
    };
    let console = ConsoleOptions {
        enabled: config.console_alerts,
        colored: args.color.enabled(),
    };
    let (alerts, dispatcher) = AlertDispatcher::new(log, notifier, console)
        .spawn()
        .context("starting alert dispatcher")?;

    // ========================================================================
    // Discover Targets
    // ========================================================================

    let found = discovery::discover(discovery::candidates(&config), &FsLister);
    for (candidate, reason) in &found.skipped {
        alerts.note(format!("[ERROR] Cannot access {}: {}", candidate.path.display(), reason));
    }
    info!("{} folder(s) to monitor, {} skipped", found.targets.len(), found.skipped.len());

    let report = Box::new(JsonFileReport::new(config.report_path.clone()));
    let keys = key_store(&config);
    let mut service =
        match MonitorService::new(config, found.targets, Arc::new(FsLister), keys, alerts.clone(), report) {
            Ok(service) => service,
            Err(e) => {
                alerts.note(format!("[ERROR] {}", e));
                drop(alerts);
                dispatcher.join().ok();
                return Err(e).context("no accessible folders to monitor");
            }
        };
    drop(alerts);

    // ========================================================================
    // Run
    // ========================================================================

    service.start();

    if once {
        let summary = service.run_cycle();
        println!(
            "Cycle {}: {} change(s), {} skipped folder(s), report {}",
            summary.cycle,
            summary.events.len(),
            summary.skipped.len(),
            if summary.report_written { "written" } else { "not written" }
        );
        service.stop();
    } else {
        let token = service.shutdown_token();
        ctrlc::set_handler(move || token.cancel()).context("installing Ctrl+C handler")?;
        println!("Monitoring... press Ctrl+C to stop");
        service.run();
    }

    drop(service);
    if let Ok(stats) = dispatcher.join() {
        info!("{} alert(s), {} notification failure(s)", stats.alerts, stats.notification_failures);
    }
    Ok(())
}
