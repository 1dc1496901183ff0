//! The static schedule evaluator.
//!
//! Once a minute, each static PIN's schedule is evaluated against local
//! time. The residency map records the last *confirmed* state: a schedule
//! edge enqueues SET or CLEAR intents for every assignment, but the flag
//! only flips once all of those writes have been observed to succeed.
//! Until then the edge stays in flight and is re-driven on every tick
//! (failed assignments are re-queued), so a transient lock outage heals
//! without an operator action and a partial failure never records the PIN
//! as resident.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Local;
use keyway_core::schedule;
use keyway_core::types::DbId;
use keyway_db::error::StoreResult;
use keyway_db::models::static_pin::StaticPin;
use keyway_db::models::sync_status;
use keyway_db::repositories::StaticPinRepo;
use keyway_db::DbPool;
use keyway_events::{types as event_types, EngineEvent, EventBus};
use keyway_locks::{IntentSink, Owner};
use tokio_util::sync::CancellationToken;

/// Cadence of the schedule evaluation.
pub const EVALUATOR_TICK: Duration = Duration::from_secs(60);

/// Evaluates static PIN schedules and emits intents on edges.
pub struct StaticScheduleEvaluator {
    pool: DbPool,
    sink: Arc<dyn IntentSink>,
    bus: Arc<EventBus>,
    /// pin id -> last confirmed residency (every assignment write landed).
    residency: RwLock<HashMap<DbId, bool>>,
    /// pin id -> direction of an edge whose writes are still unconfirmed.
    in_flight: RwLock<HashMap<DbId, bool>>,
}

impl StaticScheduleEvaluator {
    pub fn new(pool: DbPool, sink: Arc<dyn IntentSink>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            sink,
            bus,
            residency: RwLock::new(HashMap::new()),
            in_flight: RwLock::new(HashMap::new()),
        })
    }

    /// Seed the residency map by evaluating every PIN at the current local
    /// time. Emits no intents: whatever is on the locks stays until the
    /// next edge.
    pub async fn initialize(&self) -> StoreResult<()> {
        let (weekday, hhmm) = schedule::day_and_time(&Local::now());
        let pins = StaticPinRepo::list_enabled_with_schedules(&self.pool).await?;

        let mut map = self.residency.write().expect("residency lock poisoned");
        for pin in pins {
            let resident = schedule::should_be_resident(
                pin.pin.enabled,
                pin.pin.always_active,
                &pin.windows(),
                weekday,
                &hhmm,
            );
            map.insert(pin.pin.id.clone(), resident);
        }
        tracing::info!(pins = map.len(), "Static PIN residency initialised");
        Ok(())
    }

    /// Evaluate all schedules at the current local time.
    pub async fn evaluate_now(&self) -> StoreResult<()> {
        let (weekday, hhmm) = schedule::day_and_time(&Local::now());
        self.evaluate_at(weekday, &hhmm).await
    }

    /// Evaluate all schedules at an explicit local weekday and time.
    pub async fn evaluate_at(&self, weekday: i64, hhmm: &str) -> StoreResult<()> {
        let pins = StaticPinRepo::list(&self.pool).await?;

        for pin in &pins {
            let schedules = StaticPinRepo::schedules(&self.pool, &pin.id).await?;
            let windows: Vec<_> = schedules.iter().map(|s| s.window()).collect();

            let should = schedule::should_be_resident(
                pin.enabled,
                pin.always_active,
                &windows,
                weekday,
                hhmm,
            );
            let confirmed = self
                .residency
                .read()
                .expect("residency lock poisoned")
                .get(&pin.id)
                .copied()
                .unwrap_or(false);
            let in_flight = self
                .in_flight
                .read()
                .expect("in-flight lock poisoned")
                .get(&pin.id)
                .copied();

            // The state the last emitted intents drove toward.
            let target = in_flight.unwrap_or(confirmed);

            if should != target {
                self.start_edge(pin, should).await?;
            } else if let Some(direction) = in_flight {
                self.settle_edge(pin, direction).await?;
            }
            // Steady state with no in-flight edge: no intents. A row that
            // fails outside an edge needs an external signal to retry.
        }

        // Forget PINs that no longer exist.
        let live: std::collections::HashSet<_> = pins.iter().map(|p| p.id.clone()).collect();
        self.residency
            .write()
            .expect("residency lock poisoned")
            .retain(|id, _| live.contains(id));
        self.in_flight
            .write()
            .expect("in-flight lock poisoned")
            .retain(|id, _| live.contains(id));

        Ok(())
    }

    /// Begin an edge: SET (rising) or CLEAR (falling) on every assignment.
    /// The residency flag is untouched until the writes are confirmed.
    async fn start_edge(&self, pin: &StaticPin, resident: bool) -> StoreResult<()> {
        StaticPinRepo::mark_assignments_pending(&self.pool, &pin.id).await?;

        for assignment in StaticPinRepo::assignments(&self.pool, &pin.id).await? {
            if resident {
                self.sink.queue_set(
                    &assignment.lock_id,
                    &pin.pin_code,
                    assignment.slot_number,
                    Owner::Static(pin.id.clone()),
                );
            } else {
                self.sink.queue_clear(
                    &assignment.lock_id,
                    assignment.slot_number,
                    Owner::Static(pin.id.clone()),
                );
            }
        }

        self.in_flight
            .write()
            .expect("in-flight lock poisoned")
            .insert(pin.id.clone(), resident);

        let (old_status, new_status) = if resident {
            ("inactive", "active")
        } else {
            ("active", "inactive")
        };
        tracing::info!(pin_id = %pin.id, name = %pin.name, new_status, "Static PIN schedule edge");
        self.bus.publish(
            EngineEvent::new(event_types::PIN_STATUS_CHANGED)
                .with_source("static_pin", pin.id.clone())
                .with_payload(serde_json::json!({
                    "pin_id": pin.id,
                    "pin_type": "static",
                    "old_status": old_status,
                    "new_status": new_status,
                })),
        );
        Ok(())
    }

    /// Check an in-flight edge against the recorded writer outcomes.
    /// All writes landed: confirm the residency flip. Otherwise re-queue
    /// the failed assignments and leave the edge in flight.
    async fn settle_edge(&self, pin: &StaticPin, direction: bool) -> StoreResult<()> {
        let assignments = StaticPinRepo::assignments(&self.pool, &pin.id).await?;

        if assignments
            .iter()
            .all(|a| a.sync_status == sync_status::SYNCED)
        {
            self.residency
                .write()
                .expect("residency lock poisoned")
                .insert(pin.id.clone(), direction);
            self.in_flight
                .write()
                .expect("in-flight lock poisoned")
                .remove(&pin.id);
            return Ok(());
        }

        for assignment in assignments {
            if assignment.sync_status != sync_status::FAILED {
                // Pending rows are already queued or owned by the drain.
                continue;
            }

            StaticPinRepo::update_assignment_sync(
                &self.pool,
                &pin.id,
                &assignment.lock_id,
                sync_status::PENDING,
            )
            .await?;

            if direction {
                self.sink.queue_set(
                    &assignment.lock_id,
                    &pin.pin_code,
                    assignment.slot_number,
                    Owner::Static(pin.id.clone()),
                );
            } else {
                self.sink.queue_clear(
                    &assignment.lock_id,
                    assignment.slot_number,
                    Owner::Static(pin.id.clone()),
                );
            }
        }
        Ok(())
    }
}

/// Run the one-minute evaluator loop until cancelled.
pub async fn run_evaluator_loop(evaluator: Arc<StaticScheduleEvaluator>, cancel: CancellationToken) {
    tracing::info!("Static schedule evaluator started");
    let mut interval = tokio::time::interval(EVALUATOR_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Static schedule evaluator stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = evaluator.evaluate_now().await {
                    tracing::error!(error = %e, "Schedule evaluation failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::tests::RecordingSink;
    use keyway_db::models::lock::CreateLock;
    use keyway_db::models::static_pin::{CreateStaticPin, StaticPinSchedule, UpdateStaticPin};
    use keyway_db::repositories::LockRepo;
    use sqlx::SqlitePool;

    async fn seed(pool: &SqlitePool) -> (String, String) {
        let lock = LockRepo::create(
            pool,
            &CreateLock {
                entity_id: "lock.back_door".to_string(),
                name: "Back Door".to_string(),
                protocol: "zwave".to_string(),
                total_slots: 10,
                guest_slots: 5,
                static_slots: 5,
                direct_integration: None,
            },
        )
        .await
        .unwrap();

        // Cleaner code, Friday 22:00 -> 06:00, slot 3.
        let pin = StaticPinRepo::create(
            pool,
            &CreateStaticPin {
                name: "Cleaner".to_string(),
                pin_code: "7777".to_string(),
                enabled: true,
                always_active: false,
                slot_number: 3,
                schedules: vec![StaticPinSchedule {
                    id: String::new(),
                    static_pin_id: String::new(),
                    day_of_week: 5,
                    start_time: "22:00".to_string(),
                    end_time: "06:00".to_string(),
                }],
                lock_ids: vec![lock.id.clone()],
            },
        )
        .await
        .unwrap();

        // The seed assignment starts pending; settle it so edge detection
        // is observed in isolation.
        StaticPinRepo::update_assignment_sync(pool, &pin.id, &lock.id, "synced")
            .await
            .unwrap();

        (pin.id, lock.id)
    }

    fn evaluator(pool: SqlitePool) -> (Arc<StaticScheduleEvaluator>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let eval = StaticScheduleEvaluator::new(
            pool,
            Arc::clone(&sink) as Arc<dyn IntentSink>,
            Arc::new(EventBus::default()),
        );
        (eval, sink)
    }

    fn confirmed(eval: &StaticScheduleEvaluator, pin: &str) -> bool {
        eval.residency
            .read()
            .unwrap()
            .get(pin)
            .copied()
            .unwrap_or(false)
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn rising_edge_queues_a_set(pool: SqlitePool) {
        let (pin, _lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool);

        // Friday 21:00: outside the window, no intents.
        eval.evaluate_at(5, "21:00").await.unwrap();
        assert!(sink.recorded().is_empty());

        // Friday 23:30: inside, one SET at slot 3.
        eval.evaluate_at(5, "23:30").await.unwrap();
        let ops = sink.recorded();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].1, "set");
        assert_eq!(ops[0].2, 3);
        assert_eq!(ops[0].3.as_deref(), Some("7777"));

        // The write outcome is unknown, so residency is not yet flipped.
        assert!(!confirmed(&eval, &pin));
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn successful_edge_is_confirmed_without_new_intents(pool: SqlitePool) {
        let (pin, lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool.clone());

        eval.evaluate_at(5, "23:30").await.unwrap();
        // The writer reports success.
        StaticPinRepo::update_assignment_sync(&pool, &pin, &lock, "synced")
            .await
            .unwrap();

        eval.evaluate_at(5, "23:45").await.unwrap();
        assert_eq!(sink.recorded().len(), 1);
        assert!(confirmed(&eval, &pin));

        // Steady state afterwards: still nothing new.
        eval.evaluate_at(5, "23:50").await.unwrap();
        assert_eq!(sink.recorded().len(), 1);
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn falling_edge_queues_a_clear(pool: SqlitePool) {
        let (pin, lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool.clone());

        eval.evaluate_at(5, "23:30").await.unwrap();
        StaticPinRepo::update_assignment_sync(&pool, &pin, &lock, "synced")
            .await
            .unwrap();

        // Saturday: the Friday bucket no longer matches.
        eval.evaluate_at(6, "00:10").await.unwrap();
        let ops = sink.recorded();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].1, "clear");
        assert_eq!(ops[1].2, 3);
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn overnight_window_is_active_early_in_the_bucket_day(pool: SqlitePool) {
        let (_pin, _lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool);

        // Friday 05:59 falls inside the wrapped part of 22:00 -> 06:00.
        eval.evaluate_at(5, "05:59").await.unwrap();
        let ops = sink.recorded();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].1, "set");
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn failed_write_leaves_residency_and_retries_next_tick(pool: SqlitePool) {
        let (pin, lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool.clone());

        eval.evaluate_at(5, "23:30").await.unwrap();
        assert_eq!(sink.recorded().len(), 1);

        // The writer reports a failure: the flag must stay down and the
        // SET must be re-emitted while the window holds.
        StaticPinRepo::update_assignment_sync(&pool, &pin, &lock, "failed")
            .await
            .unwrap();

        eval.evaluate_at(5, "23:45").await.unwrap();
        let ops = sink.recorded();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].1, "set");
        assert!(!confirmed(&eval, &pin));

        // Once the retry lands, the next tick confirms the flip.
        StaticPinRepo::update_assignment_sync(&pool, &pin, &lock, "synced")
            .await
            .unwrap();
        eval.evaluate_at(5, "23:50").await.unwrap();
        assert_eq!(sink.recorded().len(), 2);
        assert!(confirmed(&eval, &pin));
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn failure_outside_an_edge_is_not_retried(pool: SqlitePool) {
        let (pin, lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool.clone());

        eval.evaluate_at(5, "23:30").await.unwrap();
        StaticPinRepo::update_assignment_sync(&pool, &pin, &lock, "synced")
            .await
            .unwrap();
        eval.evaluate_at(5, "23:45").await.unwrap();
        assert!(confirmed(&eval, &pin));

        // A later failure with no schedule edge needs an external signal;
        // the evaluator must not hammer the lock every minute.
        StaticPinRepo::update_assignment_sync(&pool, &pin, &lock, "failed")
            .await
            .unwrap();
        eval.evaluate_at(5, "23:50").await.unwrap();
        assert_eq!(sink.recorded().len(), 1);
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn disabling_a_resident_pin_is_a_falling_edge(pool: SqlitePool) {
        let (pin, lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool.clone());

        eval.evaluate_at(5, "23:30").await.unwrap();
        StaticPinRepo::update_assignment_sync(&pool, &pin, &lock, "synced")
            .await
            .unwrap();

        StaticPinRepo::update(
            &pool,
            &pin,
            &UpdateStaticPin {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        eval.evaluate_at(5, "23:45").await.unwrap();
        let ops = sink.recorded();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].1, "clear");
    }

    #[sqlx::test(migrations = "../keyway-db/migrations")]
    async fn initialize_seeds_residency_without_intents(pool: SqlitePool) {
        let (_pin, _lock) = seed(&pool).await;
        let (eval, sink) = evaluator(pool);

        eval.initialize().await.unwrap();
        assert!(sink.recorded().is_empty());
    }
}
