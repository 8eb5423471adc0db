//! Scheduler for the periodic prioritization pass
//!
//! Manages the pass with support for:
//! - Cron expression parsing (5-field)
//! - Timezone-aware scheduling
//! - Sleep/wake detection via time-jump polling
//! - Missed run handling (runs once if within grace period)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::ingest_queue::SharedStats;
use crate::prioritization::{run_prioritization_pass, PassSummary};
use crate::state::AppState;

/// Grace period for a run missed while asleep (2 hours)
const MISSED_RUN_GRACE_PERIOD_SECS: i64 = 7200;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Poll interval for scheduler loop
const POLL_INTERVAL_SECS: u64 = 30;

/// Window around a scheduled time inside which a poll counts as on time
const DUE_WINDOW_SECS: i64 = 60;

pub struct Scheduler {
    state: Arc<AppState>,
    stats: SharedStats,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, stats: SharedStats) -> Result<Self, String> {
        let schedule = parse_cron(&state.config.prioritization_schedule)?;
        Ok(Self {
            state,
            stats,
            schedule,
        })
    }

    /// Start the scheduler loop
    ///
    /// Runs indefinitely. Each poll checks whether a scheduled time has
    /// come due; after a detected wake it runs at most one missed pass.
    pub async fn run(&self) {
        let tz = self.state.timezone;
        let mut last_check = Utc::now();
        let mut last_run: Option<DateTime<Utc>> = None;

        if let Ok(next) = next_run_time(&self.schedule, tz, last_check) {
            log::info!("Scheduler: first prioritization pass at {}", next);
        }

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();

            // Detect sleep: time jumped more than 5 minutes
            let time_jump = (now - last_check).num_seconds();
            let due = if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Scheduler: detected system wake (time jumped {} seconds), checking for a missed pass",
                    time_jump
                );
                find_missed_run(&self.schedule, tz, now, last_run)
                    .or_else(|| should_run_now(&self.schedule, tz, now, last_run))
            } else {
                should_run_now(&self.schedule, tz, now, last_run)
            };

            if let Some(scheduled) = due {
                self.run_pass(now).await;
                last_run = Some(scheduled);
            }

            last_check = now;
        }
    }

    /// Run one pass on a blocking thread with its own connection.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Option<PassSummary> {
        let state = self.state.clone();
        let result = tokio::task::spawn_blocking(move || {
            let db = state.open_db()?;
            run_prioritization_pass(&db, state.local_date(now), now, &state.config.scoring)
        })
        .await;

        let ingest = *self.stats.lock();
        log::info!(
            "Scheduler: ingestion so far: {} processed, {} promoted, {} duplicates, {} degraded, {} failed",
            ingest.processed,
            ingest.promoted,
            ingest.duplicates,
            ingest.degraded,
            ingest.failed
        );

        match result {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                log::error!("Scheduler: prioritization pass failed: {}", e);
                None
            }
            Err(e) => {
                log::error!("Scheduler: prioritization pass panicked: {}", e);
                None
            }
        }
    }
}

/// The scheduled time matching `now`, unless it already ran.
pub fn should_run_now(
    schedule: &Schedule,
    tz: Tz,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let now_local = now.with_timezone(&tz);
    let window = chrono::Duration::seconds(DUE_WINDOW_SECS);
    let next = schedule.after(&(now_local - window)).next()?;
    let next_utc = next.with_timezone(&Utc);

    if next_utc > now || (now - next_utc).num_seconds() >= DUE_WINDOW_SECS {
        return None;
    }
    match last_run {
        Some(last) if last >= next_utc => None,
        _ => Some(next_utc),
    }
}

/// Most recent scheduled time within the grace period that has not run.
pub fn find_missed_run(
    schedule: &Schedule,
    tz: Tz,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let grace_start = now.with_timezone(&tz) - chrono::Duration::seconds(MISSED_RUN_GRACE_PERIOD_SECS);
    schedule
        .after(&grace_start)
        .map(|t| t.with_timezone(&Utc))
        .take_while(|t| *t <= now)
        .filter(|t| last_run.map(|last| last < *t).unwrap_or(true))
        .last()
}

/// Parse a cron expression
pub fn parse_cron(expr: &str) -> Result<Schedule, String> {
    // The cron crate expects 6 fields (with seconds), but we use 5-field format
    let full_expr = format!("0 {}", expr);

    full_expr
        .parse::<Schedule>()
        .map_err(|e| format!("Invalid cron expression '{}': {}", expr, e))
}

/// Next scheduled time after `after`, evaluated in `tz`
pub fn next_run_time(schedule: &Schedule, tz: Tz, after: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| "No upcoming scheduled time".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_cron_every_five_minutes() {
        assert!(parse_cron("*/5 * * * *").is_ok());
    }

    #[test]
    fn test_parse_cron_invalid() {
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn test_next_run_time_respects_timezone() {
        let schedule = parse_cron("0 8 * * *").unwrap();
        let tz: Tz = "America/New_York".parse().unwrap();
        let next = next_run_time(&schedule, tz, at("2026-10-19T10:00:00Z")).unwrap();
        // 08:00 EDT is 12:00 UTC
        assert_eq!(next, at("2026-10-19T12:00:00Z"));
    }

    #[test]
    fn test_should_run_now_once_per_slot() {
        let schedule = parse_cron("*/5 * * * *").unwrap();
        let tz = Tz::UTC;
        let now = at("2026-10-19T10:05:20Z");

        let slot = should_run_now(&schedule, tz, now, None);
        assert_eq!(slot, Some(at("2026-10-19T10:05:00Z")));
        assert_eq!(should_run_now(&schedule, tz, now, slot), None);
        assert_eq!(should_run_now(&schedule, tz, at("2026-10-19T10:07:00Z"), None), None);
    }

    #[test]
    fn test_find_missed_run_after_wake() {
        let schedule = parse_cron("0 * * * *").unwrap();
        let tz = Tz::UTC;
        let now = at("2026-10-19T10:30:00Z");

        let missed = find_missed_run(&schedule, tz, now, Some(at("2026-10-19T08:00:00Z")));
        assert_eq!(missed, Some(at("2026-10-19T10:00:00Z")));
        assert_eq!(find_missed_run(&schedule, tz, now, missed), None);
    }
}
