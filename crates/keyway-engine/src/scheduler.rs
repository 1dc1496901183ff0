//! Periodic calendar sync planning.
//!
//! One long-lived task per enabled calendar, driven by its
//! `sync_interval_min`. Tasks are re-planned on calendar CRUD through
//! [`SyncScheduler::schedule_calendar`] and reconciled against the
//! database every five minutes to track changes made elsewhere. At most
//! one sync is in flight per calendar.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use keyway_core::settings::defaults;
use keyway_core::types::DbId;
use keyway_db::models::calendar::CalendarSubscription;
use keyway_db::repositories::CalendarRepo;
use keyway_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::feed::FeedSource;
use crate::sync::{SyncError, SyncService};

/// Cadence of the task-set reconciliation.
pub const REFRESH_TICK: Duration = Duration::from_secs(300);

struct Job {
    interval_min: i64,
    cancel: CancellationToken,
}

/// Plans and runs periodic calendar syncs.
pub struct SyncScheduler<F: FeedSource> {
    pool: DbPool,
    sync: Arc<SyncService<F>>,
    default_interval_min: i64,
    jobs: RwLock<HashMap<DbId, Job>>,
    in_flight: Mutex<HashSet<DbId>>,
    cancel: CancellationToken,
    /// Back-reference handed to the spawned sync tasks.
    weak: Weak<Self>,
}

impl<F: FeedSource> SyncScheduler<F> {
    pub fn new(
        pool: DbPool,
        sync: Arc<SyncService<F>>,
        default_interval_min: i64,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let default_interval_min = if default_interval_min <= 0 {
            defaults::DEFAULT_SYNC_INTERVAL_MIN
        } else {
            default_interval_min
        };

        Arc::new_cyclic(|weak| Self {
            pool,
            sync,
            default_interval_min,
            jobs: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            cancel,
            weak: weak.clone(),
        })
    }

    /// Load enabled calendars, schedule each, and start the refresh loop.
    pub async fn start(&self) -> Result<(), keyway_db::StoreError> {
        let calendars = CalendarRepo::list_enabled(&self.pool).await?;
        let count = calendars.len();
        for calendar in calendars {
            self.schedule_calendar(&calendar);
        }
        tracing::info!(calendars = count, "Calendar sync scheduler started");

        let Some(scheduler) = self.weak.upgrade() else {
            return Ok(());
        };
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_TICK);
            interval.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => break,
                    _ = interval.tick() => scheduler.refresh().await,
                }
            }
        });

        Ok(())
    }

    /// Stop every sync task.
    pub fn stop(&self) {
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
        }
        tracing::info!("Calendar sync scheduler stopped");
    }

    /// Add or re-plan the periodic task for a calendar. Disabled calendars
    /// are unscheduled.
    pub fn schedule_calendar(&self, calendar: &CalendarSubscription) {
        if !calendar.enabled {
            self.unschedule_calendar(&calendar.id);
            return;
        }

        let interval_min = if calendar.sync_interval_min < 1 {
            self.default_interval_min
        } else {
            calendar.sync_interval_min
        };

        let mut jobs = self.jobs.write().expect("jobs lock poisoned");

        // An unchanged interval keeps the existing task and its phase.
        if let Some(job) = jobs.get(&calendar.id) {
            if job.interval_min == interval_min {
                return;
            }
        }

        if let Some(job) = jobs.remove(&calendar.id) {
            job.cancel.cancel();
        }

        let Some(scheduler) = self.weak.upgrade() else {
            return;
        };
        let cancel = self.cancel.child_token();
        jobs.insert(
            calendar.id.clone(),
            Job {
                interval_min,
                cancel: cancel.clone(),
            },
        );
        drop(jobs);

        let calendar_id = calendar.id.clone();
        tracing::info!(
            calendar_id = %calendar_id,
            interval_min,
            "Scheduled calendar sync"
        );

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(interval_min as u64 * 60));
            interval.tick().await; // skip the immediate tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.sync_one(&calendar_id).await;
                    }
                }
            }
        });
    }

    /// Remove a calendar's periodic task.
    pub fn unschedule_calendar(&self, calendar_id: &str) {
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        if let Some(job) = jobs.remove(calendar_id) {
            job.cancel.cancel();
            tracing::info!(calendar_id, "Unscheduled calendar sync");
        }
    }

    /// Trigger an immediate one-shot sync (manual sync endpoint).
    pub fn trigger_sync(&self, calendar_id: &str) {
        let Some(scheduler) = self.weak.upgrade() else {
            return;
        };
        let calendar_id = calendar_id.to_string();
        tokio::spawn(async move {
            scheduler.sync_one(&calendar_id).await;
        });
    }

    /// Ids of all currently scheduled calendars.
    pub fn scheduled_calendars(&self) -> Vec<DbId> {
        self.jobs
            .read()
            .expect("jobs lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Run one sync, skipping if this calendar already has one in flight.
    async fn sync_one(&self, calendar_id: &str) {
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            if !in_flight.insert(calendar_id.to_string()) {
                tracing::debug!(calendar_id, "Sync already in flight; skipping");
                return;
            }
        }

        let result = self.sync.sync_calendar(calendar_id, &self.cancel).await;

        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(calendar_id);

        match result {
            Ok(result) => {
                tracing::info!(
                    calendar_id,
                    events = result.events_found,
                    created = result.pins_created,
                    updated = result.pins_updated,
                    removed = result.pins_removed,
                    "Calendar sync completed"
                );
            }
            Err(SyncError::CalendarNotFound(_)) => {
                // Deleted mid-flight: drop its schedule.
                self.unschedule_calendar(calendar_id);
            }
            Err(e) => {
                tracing::warn!(calendar_id, error = %e, "Calendar sync failed");
            }
        }
    }

    /// Reconcile the task set against the database.
    async fn refresh(&self) {
        let calendars = match CalendarRepo::list_enabled(&self.pool).await {
            Ok(calendars) => calendars,
            Err(e) => {
                tracing::error!(error = %e, "Failed to refresh calendar schedules");
                return;
            }
        };

        let current: HashSet<DbId> = calendars.iter().map(|c| c.id.clone()).collect();
        for calendar in &calendars {
            self.schedule_calendar(calendar);
        }

        let stale: Vec<DbId> = {
            let jobs = self.jobs.read().expect("jobs lock poisoned");
            jobs.keys().filter(|id| !current.contains(*id)).cloned().collect()
        };
        for id in stale {
            self.unschedule_calendar(&id);
        }
    }
}
