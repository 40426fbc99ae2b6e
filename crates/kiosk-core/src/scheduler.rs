//! Timers for the helper loop and the server ping loop.
//!
//! Nothing here sleeps or spawns. The session asks each loop, once per
//! frame, whether work is due at `now`, the same way the shell's listeners
//! are polled from the frame loop.

use std::time::{Duration, Instant};

/// Fires at a fixed period. The first fire happens as soon as it is polled.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next: Option<Instant>,
}

impl IntervalTimer {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Whether the timer fires at `now`. Firing schedules the next one.
    pub fn due(&mut self, now: Instant) -> bool {
        if self.next.is_some_and(|next| now < next) {
            return false;
        }
        self.next = Some(now + self.period);
        true
    }

    /// Delay the next fire by one full period from `now`.
    pub fn start_after(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    /// Forget the schedule; the next poll fires immediately.
    pub fn reset(&mut self) {
        self.next = None;
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Phase of the helper loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperPhase {
    /// Fetching defaults; retried until the helper answers.
    Bootstrapping,
    /// Defaults received; polling for updates.
    Polling,
}

/// Work the helper loop wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperAction {
    Bootstrap,
    Poll,
}

/// Bootstrap with unbounded fixed-delay retry, then periodic polling.
#[derive(Debug, Clone)]
pub struct HelperLoop {
    phase: HelperPhase,
    retry_delay: Duration,
    bootstrap_timeout: Duration,
    next_bootstrap: Option<Instant>,
    bootstrap_in_flight: bool,
    /// When an unanswered bootstrap is given up on.
    bootstrap_deadline: Option<Instant>,
    poll: IntervalTimer,
}

impl HelperLoop {
    /// `bootstrap_timeout` is the request timeout of a bootstrap; a
    /// bootstrap still unanswered `retry_delay` after that is overdue.
    pub fn new(poll_interval: Duration, retry_delay: Duration, bootstrap_timeout: Duration) -> Self {
        Self {
            phase: HelperPhase::Bootstrapping,
            retry_delay,
            bootstrap_timeout,
            next_bootstrap: None,
            bootstrap_in_flight: false,
            bootstrap_deadline: None,
            poll: IntervalTimer::new(poll_interval),
        }
    }

    pub fn phase(&self) -> HelperPhase {
        self.phase
    }

    /// What to send at `now`, if anything.
    pub fn next_action(&mut self, now: Instant) -> Option<HelperAction> {
        match self.phase {
            HelperPhase::Bootstrapping => {
                if self.bootstrap_in_flight || self.next_bootstrap.is_some_and(|at| now < at) {
                    return None;
                }
                self.bootstrap_in_flight = true;
                self.bootstrap_deadline = Some(now + self.bootstrap_timeout + self.retry_delay);
                Some(HelperAction::Bootstrap)
            },
            HelperPhase::Polling => self.poll.due(now).then_some(HelperAction::Poll),
        }
    }

    /// Whether the in-flight bootstrap has gone unanswered for too long.
    /// The caller should treat it as failed.
    pub fn bootstrap_overdue(&self, now: Instant) -> bool {
        self.bootstrap_in_flight && self.bootstrap_deadline.is_some_and(|at| now >= at)
    }

    /// The bootstrap request failed at `now`; retry after the delay.
    pub fn bootstrap_failed(&mut self, now: Instant) {
        self.bootstrap_in_flight = false;
        self.bootstrap_deadline = None;
        self.next_bootstrap = Some(now + self.retry_delay);
    }

    /// The bootstrap request succeeded at `now`; polling starts one
    /// interval later.
    pub fn bootstrap_succeeded(&mut self, now: Instant) {
        self.bootstrap_in_flight = false;
        self.bootstrap_deadline = None;
        self.next_bootstrap = None;
        self.phase = HelperPhase::Polling;
        self.poll.start_after(now);
    }
}

/// Ping timer that only runs while a control server is configured.
#[derive(Debug, Clone)]
pub struct ServerLoop {
    timer: IntervalTimer,
    active: bool,
}

impl ServerLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            timer: IntervalTimer::new(interval),
            active: false,
        }
    }

    /// Whether a ping is due. `has_server` says whether there is anything
    /// to ping; when it goes false the loop stops and restarts from scratch
    /// once a server reappears.
    pub fn due(&mut self, now: Instant, has_server: bool) -> bool {
        if !has_server {
            if self.active {
                log::info!("Control server cleared; pings stopped");
                self.active = false;
            }
            self.timer.reset();
            return false;
        }
        if !self.active {
            log::info!("Control server configured; pinging every {:?}", self.timer.period());
            self.active = true;
        }
        self.timer.due(now)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
