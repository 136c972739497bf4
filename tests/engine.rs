use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use boxprobe::error::SinkError;
use boxprobe::scanner::control::ControlState;
use boxprobe::scanner::prober::{ProbeOutcome, Prober};
use boxprobe::scanner::retry::RetryPolicy;
use boxprobe::scanner::{ScanContext, Scanner};
use boxprobe::sinks::{Hit, HitStore, Notifier};
use tokio::sync::{watch, Notify};
use tokio::time::{sleep, timeout, Instant};

const BASE_URL: &str = "https://files.example/";

#[derive(Default)]
struct RecordingStore {
    hits: Mutex<Vec<Hit>>,
}

#[async_trait]
impl HitStore for RecordingStore {
    async fn record_hit(&self, hit: &Hit) -> Result<(), SinkError> {
        self.hits.lock().unwrap().push(hit.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, url: &str) -> Result<(), SinkError> {
        self.urls.lock().unwrap().push(url.to_owned());
        Ok(())
    }
}

/// Reports `Found` only for `abc123`.
struct SingleHit;

#[async_trait]
impl Prober for SingleHit {
    async fn probe(&self, id: &str, _extension: &str) -> ProbeOutcome {
        if id == "abc123" {
            ProbeOutcome::Found
        } else {
            ProbeOutcome::NotFound
        }
    }
}

#[derive(Default)]
struct Unreachable {
    calls: AtomicUsize,
}

#[async_trait]
impl Prober for Unreachable {
    async fn probe(&self, _id: &str, _extension: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ProbeOutcome::TransportError
    }
}

/// Blocks inside the very first probe until the gate opens.
struct Gated {
    probed: Mutex<Vec<String>>,
    started: Notify,
    gate: watch::Receiver<bool>,
}

impl Gated {
    fn new() -> (Arc<Self>, watch::Sender<bool>) {
        let (open, gate) = watch::channel(false);
        let prober = Arc::new(Self {
            probed: Mutex::new(Vec::new()),
            started: Notify::new(),
            gate,
        });
        (prober, open)
    }

    fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for Gated {
    async fn probe(&self, id: &str, _extension: &str) -> ProbeOutcome {
        let first = {
            let mut probed = self.probed.lock().unwrap();
            probed.push(id.to_owned());
            probed.len() == 1
        };
        if first {
            self.started.notify_one();
            let mut gate = self.gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
        ProbeOutcome::NotFound
    }
}

/// `id0000`, `id0001`, ... counting how many have been handed out.
fn numbered_ids(generated: Arc<AtomicUsize>) -> impl Iterator<Item = String> + Send + 'static {
    (0..).map(move |n: usize| {
        generated.fetch_add(1, Ordering::SeqCst);
        format!("id{n:04}")
    })
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn single_hit_is_recorded_once() {
    let store = Arc::new(RecordingStore::default());
    let context = ScanContext::new(BASE_URL, owned(&[".png"]), Arc::new(SingleHit), store.clone())
        .with_retry(RetryPolicy::new(1));
    let ids = owned(&["q9w8e7", "abc123", "zzzzzz"]).into_iter();
    let scanner = Scanner::new(context, 1, ids);
    let counters = scanner.counters();

    let summary = scanner.run().await;

    assert_eq!(counters.hits(), 1);
    assert_eq!(summary.hits, 1);
    assert_eq!(
        *store.hits.lock().unwrap(),
        vec![Hit {
            id: "abc123".to_owned(),
            url: "https://files.example/abc123.png".to_owned(),
            extension: ".png".to_owned(),
        }]
    );
}

#[tokio::test]
async fn hits_are_announced_when_a_notifier_is_set() {
    let notifier = Arc::new(RecordingNotifier::default());
    let context = ScanContext::new(
        BASE_URL,
        owned(&[".png", ".mp4"]),
        Arc::new(SingleHit),
        Arc::new(RecordingStore::default()),
    )
    .with_notifier(notifier.clone());

    Scanner::new(context, 2, owned(&["abc123", "nope00"]).into_iter())
        .run()
        .await;

    let mut urls = notifier.urls.lock().unwrap().clone();
    urls.sort();
    assert_eq!(
        urls,
        owned(&["https://files.example/abc123.mp4", "https://files.example/abc123.png"])
    );
}

#[tokio::test]
async fn transport_errors_use_the_whole_budget() {
    let prober = Arc::new(Unreachable::default());
    let store = Arc::new(RecordingStore::default());
    let context = ScanContext::new(BASE_URL, owned(&[".png"]), prober.clone(), store.clone())
        .with_retry(RetryPolicy::new(3));
    let scanner = Scanner::new(context, 1, owned(&["abc123"]).into_iter());
    let counters = scanner.counters();

    let summary = scanner.run().await;

    assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.probes, 3);
    assert_eq!(counters.probes(), 3);
    assert!(store.hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn pause_drains_the_queue_and_resume_does_not_replay_it() {
    let (prober, open) = Gated::new();
    let generated = Arc::new(AtomicUsize::new(0));
    let context = ScanContext::new(
        BASE_URL,
        owned(&[".png"]),
        prober.clone(),
        Arc::new(RecordingStore::default()),
    );
    let scanner = Scanner::new(context, 1, numbered_ids(Arc::clone(&generated)));
    let control = scanner.control();
    let scan = tokio::spawn(scanner.run());

    // id0000 is stuck in the worker, id0001 fills the queue, and id0002 is
    // waiting for a slot.
    timeout(Duration::from_secs(5), prober.started.notified())
        .await
        .expect("first probe never started");
    wait_until("queue to fill", || generated.load(Ordering::SeqCst) >= 3).await;

    assert!(control.pause());
    sleep(Duration::from_millis(50)).await;
    open.send(true).unwrap();
    sleep(Duration::from_millis(100)).await;

    // The in-flight probe finished; nothing queued before the pause ran.
    assert_eq!(prober.probed(), owned(&["id0000"]));
    assert_eq!(generated.load(Ordering::SeqCst), 3);

    assert!(control.resume());
    wait_until("probing to resume", || prober.probed().len() >= 2).await;
    assert!(control.stop());

    let summary = timeout(Duration::from_secs(5), scan)
        .await
        .expect("scan did not stop")
        .unwrap();

    let probed = prober.probed();
    assert_eq!(probed[1], "id0003");
    assert!(!probed.contains(&"id0001".to_owned()));
    assert!(!probed.contains(&"id0002".to_owned()));
    // id0001 was dropped from the queue and id0002 before it got a slot.
    assert!(summary.discarded >= 2);
    assert_eq!(summary.generated, summary.candidates + summary.discarded);
}

#[tokio::test]
async fn stop_waits_for_the_probe_in_flight() {
    let (prober, open) = Gated::new();
    let context = ScanContext::new(
        BASE_URL,
        owned(&[".png"]),
        prober.clone(),
        Arc::new(RecordingStore::default()),
    );
    let scanner = Scanner::new(context, 2, numbered_ids(Arc::new(AtomicUsize::new(0))));
    let control = scanner.control();
    let scan = tokio::spawn(scanner.run());

    timeout(Duration::from_secs(5), prober.started.notified())
        .await
        .expect("first probe never started");
    assert!(control.stop());
    assert_eq!(control.state(), ControlState::Stopped);

    sleep(Duration::from_millis(100)).await;
    assert!(!scan.is_finished(), "scan returned while a probe was in flight");

    open.send(true).unwrap();
    let summary = timeout(Duration::from_secs(5), scan)
        .await
        .expect("scan did not stop")
        .unwrap();

    assert!(summary.candidates >= 1);
    assert_eq!(summary.generated, summary.candidates + summary.discarded);
    assert!(!control.resume());
}
