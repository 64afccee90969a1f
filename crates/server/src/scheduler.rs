// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (C8): one logical timer per active BackupSchedule, recomputed
//! from wall clock on every tick so a restart catches up at most the most
//! recent missed occurrence (§4.8). Grounded on the teacher's
//! `upstream/health.rs` `spawn_health_checker` shape — a `tokio::select!`
//! between shutdown and an interval tick — generalized from one fixed
//! interval to a per-schedule next-fire computation, plus a second sweeper
//! loop for daily retention GC.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Utc};

use crate::backup_engine;
use crate::db::models::{BackupKind, BackupSchedule, Cadence};
use crate::jobs_engine;
use crate::state::AppState;

/// How often the scheduler wakes to check whether any schedule's fire time
/// has passed. Coarser than per-schedule precision, fine enough that no
/// schedule fires more than a minute late.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                tracing::info!("scheduler shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = tick(&state).await {
                    tracing::warn!(err = %e, "scheduler tick failed");
                }
            }
        }
    }
}

pub async fn run_retention_sweeper(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(state.config.retention_sweep_interval());
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                tracing::info!("retention sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                tracing::debug!("running daily retention sweep");
                backup_engine::sweep_all(&state.db).await;
            }
        }
    }
}

async fn tick(state: &Arc<AppState>) -> Result<(), crate::error::ApiError> {
    let schedules = crate::db::schedules::list_enabled(&state.db).await?;
    let now = Utc::now();

    for schedule in schedules {
        let due = match schedule.next_fire_at {
            Some(at) => now >= at,
            None => true,
        };
        if !due {
            continue;
        }

        if let Some(next_at) = schedule.next_fire_at {
            tracing::info!(customer_id = %schedule.customer_id, fired_at = %next_at, "backup schedule firing");
            fire(state, &schedule).await;
        }

        // Recompute from `now`, not from the missed `next_fire_at`, so a
        // long-sleeping process catches up exactly one occurrence instead
        // of flooding the agent with a backlog (§4.8 "no flood").
        let next = compute_next_fire(&schedule, now);
        crate::db::schedules::set_next_fire_at(&state.db, &schedule.customer_id, next).await?;
    }

    Ok(())
}

async fn fire(state: &Arc<AppState>, schedule: &BackupSchedule) {
    let kinds: Vec<BackupKind> = serde_json::from_value(schedule.kinds.clone()).unwrap_or_default();
    let Ok(devices) = crate::db::devices::list_for_customer(&state.db, &schedule.customer_id).await else {
        tracing::warn!(customer_id = %schedule.customer_id, "failed to list devices for scheduled backup");
        return;
    };
    let Ok(agents) = crate::db::agents::list_for_customer(&state.db, &schedule.customer_id).await else {
        tracing::warn!(customer_id = %schedule.customer_id, "failed to list agents for scheduled backup");
        return;
    };
    let Some(agent) = agents.iter().find(|a| state.hub.is_online(&a.id)) else {
        tracing::warn!(customer_id = %schedule.customer_id, "no online agent for scheduled backup wave");
        return;
    };

    let kind = kinds.first().copied().unwrap_or(BackupKind::Config);
    for device in devices.iter().filter(|d| d.monitored) {
        if let Err(e) =
            jobs_engine::dispatch_backup(state, &schedule.customer_id, &device.id, &agent.id, kind).await
        {
            tracing::warn!(device_id = %device.id, err = %e, "scheduled backup dispatch failed");
        }
    }
}

/// Compute the next fire time strictly after `after`, per the schedule's
/// cadence. `at` is `"HH:MM"` in UTC.
fn compute_next_fire(schedule: &BackupSchedule, after: DateTime<Utc>) -> DateTime<Utc> {
    let at = parse_hhmm(&schedule.at).unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default());

    match schedule.cadence {
        Cadence::Daily => next_daily(after, at),
        Cadence::Weekly => next_weekly(schedule, after, at),
        Cadence::Monthly => next_monthly(schedule, after, at),
        Cadence::Cron => next_cron(schedule, after),
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

fn next_daily(after: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&after.date_naive().and_time(at));
    if today > after {
        today
    } else {
        Utc.from_utc_datetime(&(after.date_naive() + chrono::Duration::days(1)).and_time(at))
    }
}

fn next_weekly(schedule: &BackupSchedule, after: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let days: Vec<u32> = schedule
        .days
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| vec![after.weekday().num_days_from_sunday()]);

    for offset in 0..8 {
        let candidate_date = after.date_naive() + chrono::Duration::days(offset);
        let candidate = Utc.from_utc_datetime(&candidate_date.and_time(at));
        let weekday = candidate_date.weekday().num_days_from_sunday();
        if days.contains(&weekday) && candidate > after {
            return candidate;
        }
    }
    // Unreachable in practice (the 8-day window always contains a match),
    // but never panic on a malformed `days` list.
    next_daily(after, at)
}

fn next_monthly(schedule: &BackupSchedule, after: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let day_of_month = schedule.day_of_month.unwrap_or(1).clamp(1, 28) as u32;
    let this_month = after
        .date_naive()
        .with_day(day_of_month)
        .map(|d| Utc.from_utc_datetime(&d.and_time(at)));

    if let Some(candidate) = this_month {
        if candidate > after {
            return candidate;
        }
    }

    let (year, month) = if after.month() == 12 { (after.year() + 1, 1) } else { (after.year(), after.month() + 1) };
    chrono::NaiveDate::from_ymd_opt(year, month, day_of_month)
        .map(|d| Utc.from_utc_datetime(&d.and_time(at)))
        .unwrap_or_else(|| next_daily(after, at))
}

/// Matches only the `(minute, hour)` fields of the 5-field cron string;
/// day-of-month/month/weekday fields are logged and ignored (DESIGN.md:
/// documented limitation, not silent truncation).
fn next_cron(schedule: &BackupSchedule, after: DateTime<Utc>) -> DateTime<Utc> {
    let Some(expr) = &schedule.cron else {
        return next_daily(after, NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default());
    };
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        tracing::warn!(cron = %expr, "malformed cron expression, falling back to daily midnight");
        return next_daily(after, NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default());
    }
    if fields[2] != "*" || fields[3] != "*" || fields[4] != "*" {
        tracing::warn!(cron = %expr, "cron day-of-month/month/weekday fields are unsupported and ignored");
    }

    let minute: u32 = fields[0].parse().unwrap_or(0);
    let hour: u32 = fields[1].parse().unwrap_or(0);
    let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    next_daily(after, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::RetentionStrategy;

    fn schedule(cadence: Cadence, at: &str) -> BackupSchedule {
        BackupSchedule {
            customer_id: "cust-1".into(),
            enabled: true,
            cadence,
            at: at.into(),
            days: None,
            day_of_month: None,
            cron: None,
            kinds: serde_json::json!(["config"]),
            retention_days: 30,
            retention_count: 10,
            retention_strategy: RetentionStrategy::Both,
            next_fire_at: None,
        }
    }

    #[test]
    fn daily_fires_tomorrow_if_time_passed() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        let next = compute_next_fire(&schedule(Cadence::Daily, "02:00"), after);
        assert_eq!(next.date_naive(), after.date_naive() + chrono::Duration::days(1));
        assert_eq!(next.hour(), 2);
    }

    #[test]
    fn daily_fires_today_if_time_not_yet_passed() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let next = compute_next_fire(&schedule(Cadence::Daily, "02:00"), after);
        assert_eq!(next.date_naive(), after.date_naive());
    }

    #[test]
    fn cron_ignores_unsupported_fields_and_uses_minute_hour() {
        let mut s = schedule(Cadence::Cron, "00:00");
        s.cron = Some("30 4 * * *".to_owned());
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = compute_next_fire(&s, after);
        assert_eq!(next.hour(), 4);
        assert_eq!(next.minute(), 30);
    }
}
