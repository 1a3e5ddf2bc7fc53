//! Readiness-driven event pump.
//!
//! One pump runs per session on its own thread:
//!
//! ```text
//!            timeout                 NoData
//!   WAITING ─────────┐    ready    ┌────────── DRAINING
//!      ▲  └──────────┘ ──────────▶ │  decode, dispatch, repeat
//!      └───────────────────────────┘
//!   cancelled (checked before every wait and after every event) ──▶ STOPPED
//! ```
//!
//! Events are handed to the consumer in kernel order before the next decode
//! attempt. A read error stops the pump and is returned to the caller; it is
//! never retried.

use crate::channel::ChannelSink;
use crate::decoder::{self, Decoded};
use crate::dispatch::{AnomalyReporter, KeyStateDispatcher};
use crate::error::{Error, Result};
use crate::event::DecodedEvent;
use crate::session::DeviceSession;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default bound on a single readiness wait.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(20);

/// Cooperative stop signal shared between a pump and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the pump to stop. Takes effect at the next check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Where the pump is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Blocked on readiness.
    Waiting,
    /// Decoding and dispatching available events.
    Draining,
    /// Finished, by cancellation or error.
    Stopped,
}

/// Counters collected over one pump run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Readiness waits that reported data.
    pub wakeups: u64,
    /// Readiness waits that timed out.
    pub timeouts: u64,
    /// Events handed to the consumer.
    pub events: u64,
}

/// The readiness loop for one session.
pub struct Pump<'a> {
    session: &'a DeviceSession,
    timeout: Duration,
    state: PumpState,
    stats: PumpStats,
}

impl<'a> Pump<'a> {
    pub fn new(session: &'a DeviceSession) -> Self {
        Self {
            session,
            timeout: DEFAULT_READINESS_TIMEOUT,
            state: PumpState::Waiting,
            stats: PumpStats::default(),
        }
    }

    /// Bound each readiness wait, and with it the cancellation latency.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Run until `cancel` fires or a read fails, handing every decoded event
    /// to `consumer` in order.
    pub fn run<F>(&mut self, cancel: &CancelToken, mut consumer: F) -> Result<PumpStats>
    where
        F: FnMut(&DecodedEvent),
    {
        let result = self.run_inner(cancel, &mut consumer);
        self.state = PumpState::Stopped;
        match &result {
            Ok(stats) => log::debug!(
                "Pump for {} stopped: {} events, {} wakeups, {} timeouts",
                self.session.path().display(),
                stats.events,
                stats.wakeups,
                stats.timeouts
            ),
            Err(e) => log::error!(
                "Pump for {} terminated: {}",
                self.session.path().display(),
                e
            ),
        }
        result
    }

    fn run_inner(
        &mut self,
        cancel: &CancelToken,
        consumer: &mut dyn FnMut(&DecodedEvent),
    ) -> Result<PumpStats> {
        let mut readiness = self.session.readiness()?;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.stats);
            }

            self.state = PumpState::Waiting;
            log::trace!("Waiting for events on {}", self.session.path().display());
            let ready = readiness
                .wait(self.timeout)
                .map_err(|e| Error::read(&e))?;
            if !ready {
                self.stats.timeouts += 1;
                continue;
            }

            self.stats.wakeups += 1;
            self.state = PumpState::Draining;
            loop {
                match decoder::next_event(self.session)? {
                    Decoded::NoData => break,
                    Decoded::Event(event) => {
                        consumer(&event);
                        self.stats.events += 1;
                    }
                }
                if cancel.is_cancelled() {
                    return Ok(self.stats);
                }
            }
        }
    }
}

impl DeviceSession {
    /// Run a pump with the default timeout, feeding `dispatcher`.
    pub fn run_pump<S, R>(
        &self,
        cancel: &CancelToken,
        dispatcher: &mut KeyStateDispatcher<S, R>,
    ) -> Result<PumpStats>
    where
        S: ChannelSink,
        R: AnomalyReporter,
    {
        Pump::new(self).run(cancel, |event| dispatcher.dispatch(event))
    }
}
