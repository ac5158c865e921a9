//! Graceful shutdown controller shared by a process's units.
//!
//! Uses `ArcSwap` for lock-free health state reads and an atomic counter
//! with RAII guards to track in-flight caller work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Process health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Units are initializing (not yet accepting work).
    Starting,
    /// Fully operational.
    Ready,
    /// Draining in-flight work; unit dispatchers are stopping.
    Draining,
    /// All in-flight work has completed.
    Stopped,
}

/// Coordinates shutdown across a process's unit dispatchers and callers.
///
/// 1. Unit dispatchers select on [`ShutdownController::shutdown_receiver`]
/// 2. Callers wrap suspending work in [`ShutdownController::begin_request`]
/// 3. [`ShutdownController::trigger_shutdown`] moves to Draining and signals
///    every receiver
/// 4. [`ShutdownController::wait_for_drain`] waits until in-flight work
///    finishes
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    health_state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            health_state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    /// Transitions to `Ready` once every unit is subscribed.
    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// The current health state.
    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// A receiver that resolves when shutdown is triggered. Unit dispatchers
    /// select on this alongside their subscription stream.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Initiates graceful shutdown: transitions to `Draining` and signals
    /// every receiver. New caller work is rejected from here on.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        // Receivers may already be gone; that is fine.
        let _ = self.shutdown_signal.send(true);
    }

    /// `true` once shutdown has been triggered.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self.health_state(),
            HealthState::Draining | HealthState::Stopped
        )
    }

    /// Registers a unit of caller work. Returns `None` once draining, so
    /// callers reject new work instead of racing the teardown.
    #[must_use]
    pub fn begin_request(&self) -> Option<InFlightGuard> {
        if self.is_shutting_down() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(InFlightGuard {
            counter: Arc::clone(&self.in_flight),
        })
    }

    /// Number of requests currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until in-flight work drains or `timeout` passes, then moves to
    /// `Stopped`. Returns `true` if the drain completed cleanly.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let drained = loop {
            if self.in_flight() == 0 {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        self.health_state.store(Arc::new(HealthState::Stopped));
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII marker for one in-flight request.
pub struct InFlightGuard {
    counter: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_starting_state() {
        let controller = ShutdownController::new();
        assert_eq!(controller.health_state(), HealthState::Starting);
        assert!(!controller.is_shutting_down());
    }

    #[test]
    fn ready_then_draining_transitions() {
        let controller = ShutdownController::new();
        controller.set_ready();
        assert_eq!(controller.health_state(), HealthState::Ready);

        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Draining);
        assert!(controller.is_shutting_down());
    }

    #[test]
    fn in_flight_guard_tracks_work() {
        let controller = ShutdownController::new();
        controller.set_ready();

        let guard = controller.begin_request().unwrap();
        assert_eq!(controller.in_flight(), 1);
        drop(guard);
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn draining_rejects_new_work() {
        let controller = ShutdownController::new();
        controller.set_ready();
        controller.trigger_shutdown();
        assert!(controller.begin_request().is_none());
    }

    #[tokio::test]
    async fn shutdown_signal_reaches_receivers() {
        let controller = ShutdownController::new();
        let mut rx = controller.shutdown_receiver();

        controller.trigger_shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_completes_when_work_finishes() {
        let controller = Arc::new(ShutdownController::new());
        controller.set_ready();
        let guard = controller.begin_request().unwrap();
        controller.trigger_shutdown();

        let worker = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(guard);
                let _ = controller;
            })
        };

        assert!(controller.wait_for_drain(Duration::from_secs(1)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_at_timeout() {
        let controller = ShutdownController::new();
        controller.set_ready();
        let _guard = controller.begin_request().unwrap();
        controller.trigger_shutdown();

        assert!(!controller.wait_for_drain(Duration::from_millis(100)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
