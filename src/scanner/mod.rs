//! Core functionality for actual scanning behaviour.
//!
//! One dispatch task pulls identifiers from a source and pushes them onto a
//! bounded queue sized to the worker count, so generation never runs ahead
//! of probing. Each worker takes one candidate at a time, probes every
//! configured extension, and hands hits to the collaborators.
//!
//! Pausing and stopping are cooperative. A probe that has started always
//! finishes. Candidates still sitting in the queue are discarded (see
//! [`control::Status`]). [`Scanner::run`] only returns after every worker has
//! exited and the queue is closed and empty.
pub mod control;
pub mod prober;
pub mod retry;

use std::fmt;
use std::num::NonZeroU16;
use std::sync::Arc;

use colored::Colorize;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::sinks::{Downloader, Hit, HitStore, Notifier};
use crate::telemetry::RateCounters;
use control::{Control, ControlState};
use prober::{target_url, Prober};
use retry::RetryPolicy;

/// How hits are printed to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct HitOutput {
    /// Print the bare URL and nothing else.
    pub greppable: bool,
    /// No colours.
    pub accessible: bool,
}

/// Everything a worker needs besides the queue. Immutable once the scan
/// starts.
pub struct ScanContext {
    base_url: String,
    extensions: Vec<String>,
    retry: RetryPolicy,
    prober: Arc<dyn Prober>,
    store: Arc<dyn HitStore>,
    notifier: Option<Arc<dyn Notifier>>,
    downloader: Option<Arc<dyn Downloader>>,
    output: HitOutput,
}

impl ScanContext {
    /// Probes with `prober` and records hits in `store`. One attempt per
    /// request until [`with_retry`](Self::with_retry) says otherwise.
    pub fn new(
        base_url: impl Into<String>,
        extensions: Vec<String>,
        prober: Arc<dyn Prober>,
        store: Arc<dyn HitStore>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            extensions,
            retry: RetryPolicy::new(1),
            prober,
            store,
            notifier: None,
            downloader: None,
            output: HitOutput::default(),
        }
    }

    #[must_use]
    /// Budget and delay for probes and for each hit step.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    /// Announce every hit.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    /// Download every hit.
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    #[must_use]
    /// How hits are printed.
    pub const fn with_output(mut self, output: HitOutput) -> Self {
        self.output = output;
        self
    }
}

impl fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanContext")
            .field("base_url", &self.base_url)
            .field("extensions", &self.extensions)
            .field("retry", &self.retry)
            .field("notifier", &self.notifier.is_some())
            .field("downloader", &self.downloader.is_some())
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// An identifier on its way to a worker, tagged with the dispatch epoch it
/// was enqueued under.
#[derive(Debug)]
struct Candidate {
    id: String,
    epoch: u64,
}

/// Totals for one finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Identifiers taken from the source.
    pub generated: u64,
    /// Candidates a worker actually probed.
    pub candidates: u64,
    /// Candidates dropped by a pause or stop before a worker probed them,
    /// whether still queued or still waiting for a queue slot.
    pub discarded: u64,
    /// Requests sent, retries included.
    pub probes: u64,
    /// Files found.
    pub hits: u64,
}

impl ScanSummary {
    fn absorb(&mut self, stats: WorkerStats) {
        self.candidates += stats.candidates;
        self.discarded += stats.discarded;
        self.probes += stats.probes;
        self.hits += stats.hits;
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ids generated, {} checked, {} discarded, {} requests, {} found",
            self.generated, self.candidates, self.discarded, self.probes, self.hits
        )
    }
}

/// The scanning engine.
///
/// `source` is usually an endless [`IdGenerator`](crate::generator::IdGenerator);
/// a finite source ends the scan once it runs dry, exactly as if it had
/// been stopped after the last identifier.
#[derive(Debug)]
pub struct Scanner<I> {
    context: Arc<ScanContext>,
    workers: NonZeroU16,
    source: I,
    control: Control,
    counters: Arc<RateCounters>,
}

impl<I> Scanner<I>
where
    I: Iterator<Item = String> + Send + 'static,
{
    /// A worker count of 0 is corrected to 1.
    pub fn new(context: ScanContext, workers: u16, source: I) -> Self {
        Self {
            context: Arc::new(context),
            workers: NonZeroU16::new(workers).unwrap_or(NonZeroU16::MIN),
            source,
            control: Control::new(),
            counters: Arc::new(RateCounters::new()),
        }
    }

    /// Handle for pausing, resuming and stopping the scan.
    pub fn control(&self) -> Control {
        self.control.clone()
    }

    /// Live counters, for the rate reporter.
    pub fn counters(&self) -> Arc<RateCounters> {
        Arc::clone(&self.counters)
    }

    /// Runs until stopped or until the source is exhausted.
    pub async fn run(self) -> ScanSummary {
        let workers = usize::from(self.workers.get());
        let (sender, receiver) = mpsc::channel(workers);
        let queue = Arc::new(Mutex::new(receiver));

        debug!(
            "Start scanning.\nWorkers {}\nExtensions {:?}\nTries {}",
            workers,
            self.context.extensions,
            self.context.retry.attempts()
        );

        let handles: Vec<_> = (0..workers)
            .map(|index| {
                let worker = Worker {
                    index,
                    queue: Arc::clone(&queue),
                    context: Arc::clone(&self.context),
                    counters: Arc::clone(&self.counters),
                    control: self.control.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let dispatcher = tokio::spawn(dispatch(self.source, sender, self.control.clone()));
        let dispatched = dispatcher.await.unwrap_or_else(|e| {
            error!("Dispatch loop failed: {e}");
            DispatchStats::default()
        });
        let mut summary = ScanSummary {
            generated: dispatched.generated,
            discarded: dispatched.discarded,
            ..ScanSummary::default()
        };

        for handle in handles {
            match handle.await {
                Ok(stats) => summary.absorb(stats),
                Err(e) => error!("Worker failed: {e}"),
            }
        }

        let receiver = queue.lock().await;
        debug_assert!(receiver.is_closed() && receiver.is_empty());
        debug!("Queue closed and drained. {summary}");
        summary
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DispatchStats {
    generated: u64,
    /// Generated but never enqueued.
    discarded: u64,
}

/// Feeds the queue while running.
///
/// Dropping `queue` on the way out closes it, which is what lets the workers
/// finish.
async fn dispatch<I>(mut source: I, queue: mpsc::Sender<Candidate>, control: Control) -> DispatchStats
where
    I: Iterator<Item = String>,
{
    let mut status = control.subscribe();
    let mut stats = DispatchStats::default();

    loop {
        let current = *status.borrow_and_update();
        match current.state {
            ControlState::Stopped => break,
            ControlState::Paused => {
                debug!("Dispatch paused");
                if status
                    .wait_for(|status| status.state != ControlState::Paused)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            ControlState::Running => {
                let Some(id) = source.next() else {
                    info!("Identifier source exhausted");
                    break;
                };
                stats.generated += 1;
                let candidate = Candidate {
                    id,
                    epoch: current.epoch,
                };

                // Blocks while the queue is full. A state change wins over a
                // free slot and the pending candidate is dropped.
                tokio::select! {
                    biased;
                    changed = status.changed() => {
                        debug!("Dropping pending candidate {}", candidate.id);
                        stats.discarded += 1;
                        if changed.is_err() {
                            break;
                        }
                    }
                    permit = queue.reserve() => match permit {
                        Ok(permit) => permit.send(candidate),
                        Err(_) => {
                            stats.discarded += 1;
                            break;
                        }
                    },
                }
            }
        }
    }

    debug!("Dispatch loop finished after {} ids", stats.generated);
    stats
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    candidates: u64,
    discarded: u64,
    probes: u64,
    hits: u64,
}

struct Worker {
    index: usize,
    queue: Arc<Mutex<mpsc::Receiver<Candidate>>>,
    context: Arc<ScanContext>,
    counters: Arc<RateCounters>,
    control: Control,
}

impl Worker {
    /// Exits only once the queue is closed and empty, never on a state
    /// change alone.
    async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        loop {
            let next = self.queue.lock().await.recv().await;
            let Some(candidate) = next else { break };

            if !self.control.is_current(candidate.epoch) {
                debug!("Discarding queued candidate {}", candidate.id);
                stats.discarded += 1;
                continue;
            }

            stats.candidates += 1;
            self.check(&candidate.id, &mut stats).await;
        }

        debug!("Worker {} exiting", self.index);
        stats
    }

    /// Probes `id` with every extension, in configured order.
    async fn check(&self, id: &str, stats: &mut WorkerStats) {
        let context = &*self.context;
        let prober = &*context.prober;
        let counters = &*self.counters;

        for extension in &context.extensions {
            let mut attempts = 0;
            let found = context
                .retry
                .run(|_| {
                    attempts += 1;
                    counters.record_probe();
                    prober.probe(id, extension)
                })
                .await;
            stats.probes += attempts;

            if !found {
                continue;
            }

            stats.hits += 1;
            counters.record_hit();
            let hit = Hit {
                id: id.to_owned(),
                url: target_url(&context.base_url, id, extension),
                extension: extension.clone(),
            };
            self.announce(&hit.url);
            self.handle_hit(&hit).await;
        }
    }

    fn announce(&self, url: &str) {
        info!("Found: {url}");
        let output = self.context.output;
        if output.greppable {
            println!("{url}");
        } else if output.accessible {
            println!("Found {url}");
        } else {
            println!("Found {}", url.green());
        }
    }

    /// Record, notify, download. Each step has its own retry budget and
    /// none of them can stop the others.
    async fn handle_hit(&self, hit: &Hit) {
        let context = &*self.context;

        let store = &*context.store;
        let recorded = context
            .retry
            .run(|_| async move {
                let result = store.record_hit(hit).await;
                if let Err(e) = &result {
                    warn!("Failed to insert file record into database: {e}");
                }
                result
            })
            .await;
        if !recorded {
            error!("Giving up on recording {}", hit.url);
        }

        if let Some(notifier) = context.notifier.as_deref() {
            let sent = context
                .retry
                .run(|_| async move {
                    let result = notifier.notify(&hit.url).await;
                    if let Err(e) = &result {
                        warn!("Failed to send message to webhook: {e}");
                    }
                    result
                })
                .await;
            if !sent {
                error!("Giving up on notifying about {}", hit.url);
            }
        }

        if let Some(downloader) = context.downloader.as_deref() {
            let fetched = context
                .retry
                .run(|nr_try| async move {
                    let result = downloader.fetch_and_store(&hit.id, &hit.extension).await;
                    if let Err(e) = &result {
                        warn!("Download attempt {nr_try} for {} failed: {e}", hit.url);
                    }
                    result
                })
                .await;
            if !fetched {
                error!("Max retries reached for download. Skipping {}", hit.url);
            }
        }
    }
}
