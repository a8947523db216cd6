//! Idle monitor
//!
//! Tracks the time since the last user activity and reports edge
//! transitions: `active -> idle` once the timeout is crossed, and
//! `idle -> active` on the next touch. Callbacks only fire on edges, never
//! on every tick.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;

/// An edge reported by [`IdleMonitor::check_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTransition {
    BecameIdle,
    BecameActive,
}

#[derive(Debug)]
struct IdleState {
    last_activity: Instant,
    idle: bool,
}

#[derive(Debug)]
pub struct IdleMonitor {
    timeout: Duration,
    state: Mutex<IdleState>,
}

impl IdleMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: Mutex::new(IdleState {
                last_activity: Instant::now(),
                idle: false,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record user activity now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, at: Instant) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_activity = at;
    }

    pub fn is_idle(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).idle
    }

    /// Compare `now` against the last activity and return the edge, if any.
    pub fn check_at(&self, now: Instant) -> Option<IdleTransition> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(state.last_activity);
        let should_be_idle = elapsed > self.timeout;

        match (state.idle, should_be_idle) {
            (false, true) => {
                state.idle = true;
                Some(IdleTransition::BecameIdle)
            }
            (true, false) => {
                state.idle = false;
                Some(IdleTransition::BecameActive)
            }
            _ => None,
        }
    }

    /// Poll every `poll` until `shutdown` flips to `true` or its sender is
    /// dropped. Callbacks run to completion before shutdown is observed.
    pub async fn run<I, A>(
        &self,
        poll: Duration,
        mut on_idle: I,
        mut on_active: A,
        mut shutdown: watch::Receiver<bool>,
    ) where
        I: FnMut(),
        A: FnMut(),
    {
        // `interval` panics on a zero period.
        let mut ticker = interval(poll.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            timeout_secs = self.timeout.as_secs(),
            poll_secs = poll.as_secs(),
            "Idle monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.check_at(Instant::now()) {
                        Some(IdleTransition::BecameIdle) => {
                            crate::log_component!(debug, "idle", "Entering idle state");
                            on_idle();
                        }
                        Some(IdleTransition::BecameActive) => {
                            crate::log_component!(debug, "idle", "Leaving idle state");
                            on_active();
                        }
                        None => {}
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Idle monitor stopped");
    }
}
