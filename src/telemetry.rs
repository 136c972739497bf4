//! Probe and hit rate counters plus the once-a-second reporter.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::scanner::control::Control;

/// Reporting ticks that make up one minute.
const TICKS_PER_MINUTE: u32 = 60;

/// Counters bumped by workers and reset only by the reporter.
#[derive(Debug, Default)]
pub struct RateCounters {
    probes: AtomicU64,
    hits: AtomicU64,
}

impl RateCounters {
    /// Both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per request sent.
    pub fn record_probe(&self) {
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    /// Called once per file found.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Probes since the last [`take_probes`](Self::take_probes). Does not reset.
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    /// Hits since the last [`take_hits`](Self::take_hits). Does not reset.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Reads and resets the probe counter.
    pub fn take_probes(&self) -> u64 {
        self.probes.swap(0, Ordering::Relaxed)
    }

    /// Reads and resets the hit counter.
    pub fn take_hits(&self) -> u64 {
        self.hits.swap(0, Ordering::Relaxed)
    }
}

/// One line of throughput output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateReport {
    /// Probes in the last interval.
    pub probes_per_sec: u64,
    /// Probes since the minute started.
    pub probes_this_minute: u64,
    /// Hits since the minute started.
    pub hits_this_minute: u64,
    /// Probes since the scan started.
    pub total_probes: u64,
    /// Hits in completed minutes. Display adds the current minute.
    pub total_hits: u64,
}

impl fmt::Display for RateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Requests/sec = {} | Requests/min = {} | Found/min = {} | Total Req = {} | Total Found = {}",
            self.probes_per_sec,
            self.probes_this_minute,
            self.hits_this_minute,
            self.total_probes,
            self.total_hits + self.hits_this_minute,
        )
    }
}

/// Owns the read-and-reset schedule of [`RateCounters`].
///
/// The probe counter is drained every tick; the hit counter is only read
/// until the minute rolls over, then drained into the total.
#[derive(Debug)]
pub struct RateReporter {
    counters: Arc<RateCounters>,
    ticks: u32,
    probes_this_minute: u64,
    total_probes: u64,
    total_hits: u64,
}

impl RateReporter {
    /// Takes over resetting `counters`.
    pub fn new(counters: Arc<RateCounters>) -> Self {
        Self {
            counters,
            ticks: 0,
            probes_this_minute: 0,
            total_probes: 0,
            total_hits: 0,
        }
    }

    /// Advances the schedule by one interval and returns what to display.
    pub fn tick(&mut self) -> RateReport {
        let probes = self.counters.take_probes();
        self.probes_this_minute += probes;
        self.total_probes += probes;

        let report = RateReport {
            probes_per_sec: probes,
            probes_this_minute: self.probes_this_minute,
            hits_this_minute: self.counters.hits(),
            total_probes: self.total_probes,
            total_hits: self.total_hits,
        };

        self.ticks += 1;
        if self.ticks == TICKS_PER_MINUTE {
            self.ticks = 0;
            self.probes_this_minute = 0;
            self.total_hits += self.counters.take_hits();
        }

        report
    }

    /// Runs [`run`](Self::run) on its own task.
    pub fn spawn(self, interval: Duration, control: Control) -> ReporterTask {
        ReporterTask {
            handle: tokio::spawn(self.run(interval, control)),
        }
    }

    /// Logs a report every `interval` until the scan is stopped.
    pub async fn run(mut self, interval: Duration, control: Control) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = control.stopped() => break,
                _ = ticker.tick() => info!("{}", self.tick()),
            }
        }
    }
}

/// Handle to a spawned [`RateReporter`].
#[derive(Debug)]
pub struct ReporterTask {
    handle: JoinHandle<()>,
}

impl ReporterTask {
    /// Cancels the reporter without waiting for a stop.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the reporter to exit. Returns `false`, after logging why,
    /// if it panicked or was cancelled.
    pub async fn join(self) -> bool {
        match self.handle.await {
            Ok(()) => true,
            Err(e) => {
                error!("Rate reporter failed: {e}");
                false
            }
        }
    }
}
