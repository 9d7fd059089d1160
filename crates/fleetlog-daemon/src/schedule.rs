//! Background timing loops
//!
//! Three loops, all ticking once a minute and checking the orchestrator's
//! running flag between iterations so shutdown completes within seconds:
//!
//! - **upload schedule** - fires `process_queue()` at the daily `HH:MM`
//!   (within a one-minute window, latched per day) or every interval
//!   period after start; also fires age-based cleanup at its own time
//! - **custodian cycle** - runs the deferred-deletion sweep on its cadence
//! - **metrics cycle** - periodic metrics publish with current disk usage

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveTime};
use fleetlog_core::config::Schedule;
use fleetlog_core::domain::clock::HhMm;
use tracing::{error, info};

use crate::orchestrator::Orchestrator;

/// Tick granularity for every loop.
const TICK: Duration = Duration::from_secs(60);

/// Decides a daily-mode fire: within the one-minute window of `at`, at most
/// once per day.
fn daily_due(at: HhMm, now: NaiveTime, today: NaiveDate, last_fired: Option<NaiveDate>) -> bool {
    at.is_near(now) && last_fired != Some(today)
}

/// Decides an interval-mode fire: `fired` whole periods have elapsed and
/// the next one is due.
fn interval_due(period: Duration, elapsed: Duration, fired: u32) -> bool {
    !period.is_zero() && elapsed >= period * (fired + 1)
}

/// Upload scheduling plus age-based cleanup timing.
pub async fn run_upload_schedule(orchestrator: Arc<Orchestrator>) {
    info!("Schedule loop started");
    let started = tokio::time::Instant::now();
    let mut last_upload_day: Option<NaiveDate> = None;
    let mut last_age_day: Option<NaiveDate> = None;
    let mut intervals_fired: u32 = 0;

    loop {
        tokio::time::sleep(TICK).await;
        if !orchestrator.is_running() {
            break;
        }
        let config = orchestrator.snapshot();
        let now = Local::now();

        match &config.upload.schedule {
            Schedule::Daily(at) => {
                if daily_due(*at, now.time(), now.date_naive(), last_upload_day) {
                    info!(schedule = %at, "Scheduled upload time reached");
                    last_upload_day = Some(now.date_naive());
                    orchestrator.process_queue().await;
                }
            }
            Schedule::Interval(interval) => {
                let period = Duration::from_secs(interval.period_minutes() * 60);
                if interval_due(period, started.elapsed(), intervals_fired) {
                    intervals_fired += 1;
                    info!(
                        period_minutes = interval.period_minutes(),
                        "Interval upload due"
                    );
                    orchestrator.process_queue().await;
                }
            }
        }

        let age = &config.deletion.age_based;
        if age.enabled && daily_due(age.schedule_time, now.time(), now.date_naive(), last_age_day)
        {
            info!(max_age_days = age.max_age_days, "Scheduled age-based cleanup");
            last_age_day = Some(now.date_naive());
            let custodian = orchestrator.custodian().clone();
            let max_age_days = age.max_age_days;
            let result =
                tokio::task::spawn_blocking(move || custodian.cleanup_by_age(max_age_days)).await;
            if let Err(e) = result {
                error!(error = %e, "Age-based cleanup task failed");
            }
        }
    }
    info!("Schedule loop stopped");
}

/// Deferred-deletion sweeps on their configured cadence.
pub async fn run_custodian_cycle(orchestrator: Arc<Orchestrator>) {
    info!("Custodian cycle started");
    let mut minutes_since_sweep: u64 = 0;

    loop {
        tokio::time::sleep(TICK).await;
        if !orchestrator.is_running() {
            break;
        }
        let config = orchestrator.snapshot();
        minutes_since_sweep += 1;
        if minutes_since_sweep < config.deletion.deferred_interval_minutes {
            continue;
        }
        minutes_since_sweep = 0;

        if !config.deletion.after_upload.enabled {
            continue;
        }
        let custodian = orchestrator.custodian().clone();
        let result = tokio::task::spawn_blocking(move || custodian.cleanup_deferred()).await;
        match result {
            Ok(deleted) if deleted > 0 => {
                info!(deleted, "Deferred deletion cycle complete");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Deferred deletion task failed"),
        }
    }
    info!("Custodian cycle stopped");
}

/// Periodic metrics publish with current disk usage.
pub async fn run_metrics_cycle(orchestrator: Arc<Orchestrator>) {
    info!("Metrics cycle started");
    let mut minutes_since_publish: u64 = 0;

    loop {
        tokio::time::sleep(TICK).await;
        if !orchestrator.is_running() {
            break;
        }
        let config = orchestrator.snapshot();
        minutes_since_publish += 1;
        if minutes_since_publish < config.monitoring.interval_minutes {
            continue;
        }
        minutes_since_publish = 0;

        let disk_percent = orchestrator
            .custodian()
            .disk_usage()
            .ok()
            .map(|usage| usage.used_percent());
        orchestrator.metrics().publish(disk_percent).await;
    }
    info!("Metrics cycle stopped");
}
