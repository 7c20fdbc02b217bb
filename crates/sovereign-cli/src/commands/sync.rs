use std::sync::Arc;
use std::time::Duration;

use sovereign_core::scheduler::{run_background_push, ConnectivityMonitor, SyncScheduler};
use sovereign_core::{CycleReport, SyncOutcome, SyncState};
use tokio::sync::mpsc;

use crate::commands::common::{print_json, CliContext};
use crate::error::CliError;

pub async fn run_sync(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let engine = context.engine().await?;

    match engine.sync().await? {
        SyncOutcome::Coalesced => println!("A sync is already running"),
        SyncOutcome::Completed(report) => {
            if as_json {
                print_json(&report)?;
            } else {
                for line in format_report_lines(&report) {
                    println!("{line}");
                }
            }
            if let Some(error) = report.cycle_error {
                return Err(CliError::SyncFailed(error));
            }
        }
    }
    Ok(())
}

pub async fn run_background_sync(context: &CliContext) -> Result<(), CliError> {
    let outcome = run_background_push(
        &context.store_handle(),
        context.remote()?,
        context.auth_provider(),
    )
    .await?;

    if let Some(report) = outcome.report() {
        for line in format_report_lines(report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_watch(context: &CliContext, probe_interval_secs: u64) -> Result<(), CliError> {
    let engine = Arc::new(context.engine().await?);
    engine.refresh_counts().await?;

    let scheduler = Arc::new(SyncScheduler::new(Arc::clone(&engine), &context.config));
    let monitor = ConnectivityMonitor::new(
        context.remote()?,
        Duration::from_secs(probe_interval_secs.max(1)),
    );

    let (events_tx, events_rx) = mpsc::channel(8);
    let probe = monitor.spawn(events_tx);
    scheduler.start_periodic();

    let mut snapshots = engine.subscribe();
    let reporter = tokio::spawn(async move {
        let mut last_state = None;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if last_state == Some(snapshot.state) {
                continue;
            }
            last_state = Some(snapshot.state);
            match snapshot.state {
                SyncState::Syncing => println!("syncing..."),
                SyncState::Idle => println!(
                    "idle: {} pending, {} failed",
                    snapshot.pending, snapshot.failed
                ),
                SyncState::Error => println!(
                    "error: {}",
                    snapshot.sync_error.as_deref().unwrap_or("unknown")
                ),
            }
        }
    });

    println!("Watching for connectivity changes (Ctrl-C to stop)");
    let runner = Arc::clone(&scheduler);
    tokio::select! {
        () = runner.run(events_rx) => {}
        result = tokio::signal::ctrl_c() => result?,
    }

    scheduler.stop_periodic();
    probe.abort();
    reporter.abort();
    println!("Stopped");
    Ok(())
}

pub fn format_report_lines(report: &CycleReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Pushed {} operation(s); {} still pending, {} newly failed",
        report.pushed.len(),
        report.still_pending.len(),
        report.newly_failed.len()
    )];

    if report.pulled {
        lines.push(format!(
            "Countries: {} new, {} updated, {} skipped",
            report.countries.inserted, report.countries.updated, report.countries.skipped
        ));
        lines.push(format!(
            "Projects: {} new, {} updated, {} skipped",
            report.projects.inserted, report.projects.updated, report.projects.skipped
        ));
    }
    if !report.newly_failed.is_empty() {
        lines.push(format!(
            "Gave up on operation(s) {:?}; see `sovereign queue failed`",
            report.newly_failed
        ));
    }
    if report.unauthorized {
        lines.push("The API rejected the credential; sign in again".to_string());
    }
    lines
}
