//! Run/pause/stop state shared between the controller, the dispatch loop
//! and the workers.
use std::sync::Arc;

use tokio::sync::watch;

/// What the dispatch loop is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Generate and enqueue candidates.
    Running,
    /// Generate nothing; queued candidates are discarded.
    Paused,
    /// Terminal. Nothing new is generated and the queue is closed.
    Stopped,
}

/// Current state plus the dispatch epoch.
///
/// The epoch moves forward on every pause and on stop. Candidates carry the
/// epoch they were enqueued under, and a worker throws away any candidate
/// whose epoch is no longer current. That is how the queue is drained
/// without the controller having to reach into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// What the dispatch loop may do.
    pub state: ControlState,
    /// Bumped by every pause and by stop.
    pub epoch: u64,
}

/// Cloneable handle to the control state.
///
/// Writes go through a `watch` channel, so every reader sees the latest
/// value and anything parked in [`Control::subscribe`] is woken on change.
#[derive(Debug, Clone)]
pub struct Control {
    status: Arc<watch::Sender<Status>>,
}

impl Control {
    /// Starts out [`ControlState::Running`] at epoch 0.
    pub fn new() -> Self {
        let (status, _) = watch::channel(Status {
            state: ControlState::Running,
            epoch: 0,
        });
        Self {
            status: Arc::new(status),
        }
    }

    /// Snapshot of state and epoch.
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Current state.
    pub fn state(&self) -> ControlState {
        self.status().state
    }

    /// Current dispatch epoch.
    pub fn epoch(&self) -> u64 {
        self.status().epoch
    }

    /// Whether a candidate enqueued under `epoch` may still be probed.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Running -> Paused. Returns `false` if nothing changed.
    pub fn pause(&self) -> bool {
        self.transition(|state| (state == ControlState::Running).then_some(ControlState::Paused))
    }

    /// Paused -> Running. Returns `false` if nothing changed.
    pub fn resume(&self) -> bool {
        self.transition(|state| (state == ControlState::Paused).then_some(ControlState::Running))
    }

    /// Running or Paused -> Stopped. Stopping twice is a no-op.
    pub fn stop(&self) -> bool {
        self.transition(|state| (state != ControlState::Stopped).then_some(ControlState::Stopped))
    }

    fn transition(&self, next: impl FnOnce(ControlState) -> Option<ControlState>) -> bool {
        self.status.send_if_modified(|status| match next(status.state) {
            Some(state) => {
                if state != ControlState::Running {
                    status.epoch += 1;
                }
                status.state = state;
                true
            }
            None => false,
        })
    }

    /// A receiver that is woken on every transition.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Resolves once the state is [`ControlState::Stopped`].
    pub async fn stopped(&self) {
        let mut status = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = status
            .wait_for(|status| status.state == ControlState::Stopped)
            .await;
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}
