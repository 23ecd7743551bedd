//! Synthetic write load, driven through the same write coordinator as
//! client traffic.
//!
//! Ticking is time-triggered, not completion-triggered: every `1/rate`
//! seconds one operation is spawned without awaiting the previous one, so
//! in-flight transactions are unbounded at high rates. Tick failures are
//! logged and counted, never surfaced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::coordinator::WriteCoordinator;
use crate::core::{AppError, Result, SessionStats};
use crate::storage::Store;

const PHRASES: &[&str] = &[
    "shipping a quick update",
    "thinking out loud",
    "notes from the road",
    "status check",
    "what a day",
    "small wins add up",
];

/// Post content for generated writes: a pooled phrase plus a random suffix.
pub fn synthetic_content() -> String {
    let mut rng = rand::thread_rng();
    let phrase = PHRASES[rng.gen_range(0..PHRASES.len())];
    format!("{phrase} #{:04x}", rng.gen_range(0u32..0x10000))
}

/// A generated unique-looking user name.
pub fn synthetic_name() -> String {
    format!("user-{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadStatus {
    pub running: bool,
    pub rate: Option<f64>,
}

struct RunningWorkload {
    rate: f64,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Idle/Running state machine around the tick loop. Start while running and
/// stop while idle are errors, not no-ops.
pub struct WorkloadGenerator {
    coordinator: Arc<WriteCoordinator>,
    store: Arc<Store>,
    stats: Arc<SessionStats>,
    inner: Mutex<Option<RunningWorkload>>,
}

impl WorkloadGenerator {
    pub fn new(
        coordinator: Arc<WriteCoordinator>,
        store: Arc<Store>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            coordinator,
            store,
            stats,
            inner: Mutex::new(None),
        }
    }

    pub async fn start(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(AppError::validation(
                "writesPerSecond must be a positive number",
            ));
        }
        let mut inner = self.inner.lock().await;
        if inner.is_some() {
            return Err(AppError::invalid_state("workload is already running"));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(
            self.coordinator.clone(),
            self.store.clone(),
            self.stats.clone(),
            rate,
            cancelled.clone(),
            wake.clone(),
        ));
        *inner = Some(RunningWorkload {
            rate,
            cancelled,
            wake,
            handle,
        });
        info!(rate, "workload started");
        Ok(())
    }

    /// Cancels future tick scheduling before returning. An operation already
    /// spawned by an earlier tick may still complete; no new one will.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let running = inner
            .take()
            .ok_or_else(|| AppError::invalid_state("workload is not running"))?;
        running.cancelled.store(true, Ordering::SeqCst);
        running.wake.notify_waiters();
        running.handle.abort();
        info!("workload stopped");
        Ok(())
    }

    pub async fn status(&self) -> WorkloadStatus {
        let inner = self.inner.lock().await;
        WorkloadStatus {
            running: inner.is_some(),
            rate: inner.as_ref().map(|running| running.rate),
        }
    }
}

async fn run_loop(
    coordinator: Arc<WriteCoordinator>,
    store: Arc<Store>,
    stats: Arc<SessionStats>,
    rate: f64,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    let period = Duration::from_secs_f64((1.0 / rate).max(1e-6));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                spawn_tick(&coordinator, &store, &stats);
            }
            _ = wake.notified() => break,
        }
    }
}

fn spawn_tick(coordinator: &Arc<WriteCoordinator>, store: &Arc<Store>, stats: &Arc<SessionStats>) {
    let coordinator = coordinator.clone();
    let store = store.clone();
    let stats = stats.clone();
    tokio::spawn(async move {
        if let Err(err) = run_tick(&coordinator, &store).await {
            stats.record_workload_error();
            warn!(error = %err, "workload tick failed");
        }
    });
}

/// One weighted random mutation: 70% create post, 15% update, 10% delete,
/// 5% create user.
async fn run_tick(coordinator: &WriteCoordinator, store: &Store) -> Result<()> {
    let roll: u8 = rand::thread_rng().gen_range(0..100);
    match roll {
        0..=69 => {
            // Needs an existing author; before any user exists the tick is
            // skipped, not failed.
            let Some(author) = store.sample_user().await else {
                return Ok(());
            };
            coordinator
                .create_post(&author.name, &synthetic_content())
                .await?;
        }
        70..=84 => {
            coordinator.update_post().await?;
        }
        85..=94 => {
            coordinator.delete_post().await?;
        }
        _ => {
            coordinator.create_user(&synthetic_name()).await?;
        }
    }
    Ok(())
}
