//! Session watchdog
//!
//! While a protected route is open, periodically keeps the session fresh:
//! - first check after a short settle delay
//! - then one check per refresh interval
//! - a check refreshes only if the minimum gap since the last refresh passed
//! - never more than one refresh in flight
//!
//! [`Watchdog`] is a clock-driven state machine with no timers of its own;
//! [`Watchdog::spawn`] runs it on tokio timers against a [`SessionStore`].

use crate::store::SessionStore;
use callscope_core::{Clock, SessionConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// What the driver should do after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Idle,
    Refresh,
}

#[derive(Debug, Default)]
struct WatchState {
    next_check: Option<DateTime<Utc>>,
    in_flight: bool,
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(1))
}

/// Background session refresher for protected routes
#[derive(Debug)]
pub struct Watchdog {
    clock: Arc<dyn Clock>,
    settle: chrono::Duration,
    interval: chrono::Duration,
    min_gap: chrono::Duration,
    state: Mutex<WatchState>,
    wake: Notify,
}

impl Watchdog {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: &SessionConfig) -> Self {
        Self {
            clock,
            settle: to_chrono(config.settle_delay()),
            interval: to_chrono(config.refresh_interval()),
            min_gap: to_chrono(config.min_refresh_gap()),
            state: Mutex::new(WatchState::default()),
            wake: Notify::new(),
        }
    }

    /// A protected route was entered; moving between protected routes keeps
    /// the current schedule
    pub fn enter_protected(&self) {
        let mut state = self.state.lock();
        if state.next_check.is_none() {
            let first = self.clock.now() + self.settle;
            state.next_check = Some(first);
            tracing::debug!(first_check = %first, "session watchdog started");
            self.wake.notify_one();
        }
    }

    /// All protected routes were left
    pub fn leave_protected(&self) {
        let mut state = self.state.lock();
        if state.next_check.take().is_some() {
            tracing::debug!("session watchdog stopped");
            self.wake.notify_one();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().next_check.is_some()
    }

    #[must_use]
    pub fn next_check(&self) -> Option<DateTime<Utc>> {
        self.state.lock().next_check
    }

    /// Evaluate the schedule at the current time
    ///
    /// A returned [`WatchdogAction::Refresh`] marks a refresh in flight until
    /// [`Watchdog::complete`] is called.
    pub fn poll(&self, last_refresh: Option<DateTime<Utc>>) -> WatchdogAction {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let Some(due) = state.next_check else {
            return WatchdogAction::Idle;
        };
        if now < due || state.in_flight {
            return WatchdogAction::Idle;
        }

        state.next_check = Some(now + self.interval);
        let stale = last_refresh.map_or(true, |at| now - at >= self.min_gap);
        if stale {
            state.in_flight = true;
            WatchdogAction::Refresh
        } else {
            tracing::trace!(?last_refresh, "session refreshed recently; skipping");
            WatchdogAction::Idle
        }
    }

    /// The refresh started by the last poll finished
    pub fn complete(&self) {
        self.state.lock().in_flight = false;
    }

    /// Drive the watchdog on tokio timers
    #[must_use]
    pub fn spawn(self: &Arc<Self>, session: Arc<SessionStore>) -> WatchdogTask {
        let watchdog = Arc::clone(self);
        WatchdogTask {
            handle: tokio::spawn(async move { watchdog.run(session).await }),
        }
    }

    async fn run(self: Arc<Self>, session: Arc<SessionStore>) {
        loop {
            let Some(due) = self.next_check() else {
                self.wake.notified().await;
                continue;
            };

            let wait = (due - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = self.wake.notified() => continue,
            }

            if session.check_expiry() {
                continue;
            }
            if self.poll(session.last_refresh()) == WatchdogAction::Refresh {
                match session.refresh_session().await {
                    Ok(refreshed) => {
                        tracing::debug!(expires_at = %refreshed.expires_at, "background refresh done");
                    }
                    Err(err) => tracing::warn!(error = %err, "background refresh failed"),
                }
                self.complete();
            }
        }
    }
}

/// Running watchdog driver; stops when dropped
#[derive(Debug)]
pub struct WatchdogTask {
    handle: JoinHandle<()>,
}

impl WatchdogTask {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for WatchdogTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callscope_core::ManualClock;
    use chrono::Duration as Span;

    fn watchdog() -> (Watchdog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (Watchdog::new(clock.clone(), &SessionConfig::default()), clock)
    }

    #[test]
    fn waits_for_settle_delay() {
        let (dog, clock) = watchdog();
        dog.enter_protected();

        assert_eq!(dog.poll(None), WatchdogAction::Idle);
        clock.advance(Span::milliseconds(499));
        assert_eq!(dog.poll(None), WatchdogAction::Idle);
        clock.advance(Span::milliseconds(1));
        assert_eq!(dog.poll(None), WatchdogAction::Refresh);
    }

    #[test]
    fn respects_minimum_gap() {
        let (dog, clock) = watchdog();
        let signed_in_at = clock.now();
        dog.enter_protected();

        clock.advance(Span::seconds(1));
        assert_eq!(dog.poll(Some(signed_in_at)), WatchdogAction::Idle);

        // next check at ~10 minutes; well past the 8 minute gap
        clock.advance(Span::minutes(5));
        assert_eq!(dog.poll(Some(signed_in_at)), WatchdogAction::Idle);
        clock.advance(Span::minutes(5));
        assert_eq!(dog.poll(Some(signed_in_at)), WatchdogAction::Refresh);
    }

    #[test]
    fn skips_when_refreshed_recently() {
        let (dog, clock) = watchdog();
        dog.enter_protected();
        clock.advance(Span::minutes(10));

        let recent = clock.now() - Span::minutes(7);
        assert_eq!(dog.poll(Some(recent)), WatchdogAction::Idle);
    }

    #[test]
    fn never_overlaps() {
        let (dog, clock) = watchdog();
        dog.enter_protected();
        clock.advance(Span::seconds(1));
        assert_eq!(dog.poll(None), WatchdogAction::Refresh);

        clock.advance(Span::minutes(11));
        assert_eq!(dog.poll(None), WatchdogAction::Idle);

        dog.complete();
        assert_eq!(dog.poll(None), WatchdogAction::Refresh);
    }

    #[test]
    fn leaving_protected_routes_stops_checks() {
        let (dog, clock) = watchdog();
        dog.enter_protected();
        dog.leave_protected();
        clock.advance(Span::hours(1));

        assert!(!dog.is_active());
        assert_eq!(dog.poll(None), WatchdogAction::Idle);
    }

    #[test]
    fn moving_between_protected_routes_keeps_schedule() {
        let (dog, clock) = watchdog();
        dog.enter_protected();
        let first = dog.next_check();
        clock.advance(Span::milliseconds(300));
        dog.enter_protected();
        assert_eq!(dog.next_check(), first);
    }
}
