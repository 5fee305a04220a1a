//! Worker-to-presentation channel.
//!
//! Events are folded on the publishing side into a `PresentationState` that
//! only keeps the latest value of each stream (overlay and snapshot). The
//! subscriber is woken through a single-slot channel, so a subscriber that
//! never polls costs one state value, not a growing queue.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::detect::Detection;
use crate::mapper::PixelRect;
use crate::pipeline::snapshot::Snapshot;

/// Accepted detection ready to draw over the preview.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Overlay {
    pub detection: Detection,
    /// Box in view pixels, extent clamped to the view.
    pub rect: PixelRect,
    pub caption: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PresentationEvent {
    /// Show the overlay for an accepted detection.
    Overlay(Overlay),
    /// Hide any overlay.
    Cleared,
    /// Show the captured frame full-screen.
    Snapshot(Snapshot),
}

/// Latest value of each observable stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PresentationState {
    pub overlay: Option<Overlay>,
    pub snapshot: Option<Snapshot>,
}

impl PresentationState {
    fn apply(&mut self, event: PresentationEvent) {
        match event {
            PresentationEvent::Overlay(overlay) => self.overlay = Some(overlay),
            PresentationEvent::Cleared => self.overlay = None,
            PresentationEvent::Snapshot(snapshot) => self.snapshot = Some(snapshot),
        }
    }
}

#[derive(Default)]
struct Shared {
    state: PresentationState,
    /// Bumped on every publish.
    version: u64,
    last: Option<PresentationEvent>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // Holders only assign fields, so a poisoned state is still consistent.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn presentation_channel() -> (Publisher, Subscription) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
    (
        Publisher {
            shared: shared.clone(),
            wake: wake_tx,
        },
        Subscription {
            shared,
            wake: wake_rx,
            state: PresentationState::default(),
            seen: 0,
        },
    )
}

/// Worker side.
#[derive(Clone)]
pub struct Publisher {
    shared: Arc<Mutex<Shared>>,
    wake: Sender<()>,
}

impl Publisher {
    /// Publish an event. A missing subscriber is not an error.
    pub fn publish(&self, event: PresentationEvent) {
        {
            let mut shared = lock(&self.shared);
            shared.state.apply(event.clone());
            shared.version += 1;
            shared.last = Some(event);
        }
        match self.wake.try_send(()) {
            // Full: a wake-up is already pending.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::trace!("presentation subscriber gone; event folded without a reader");
            }
        }
    }
}

/// Presentation side.
pub struct Subscription {
    shared: Arc<Mutex<Shared>>,
    wake: Receiver<()>,
    state: PresentationState,
    seen: u64,
}

impl Subscription {
    /// Latest state, including everything published so far.
    pub fn poll(&mut self) -> &PresentationState {
        while self.wake.try_recv().is_ok() {}
        self.refresh();
        &self.state
    }

    /// Most recent event published since the last observation, waiting at
    /// most `timeout`. Events published in between are coalesced.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<PresentationEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.refresh() {
                return Some(event);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if self.wake.recv_timeout(remaining).is_err() {
                return self.refresh();
            }
        }
    }

    /// Block until a snapshot is available or `timeout` elapses.
    pub fn wait_for_snapshot(&mut self, timeout: Duration) -> Option<Snapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(snapshot) = &self.poll().snapshot {
                return Some(snapshot.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            self.recv_timeout(remaining)?;
        }
    }

    /// State as of the last `poll` or receive.
    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    /// Copy the shared state if it changed; returns the newest event.
    fn refresh(&mut self) -> Option<PresentationEvent> {
        let shared = lock(&self.shared);
        if shared.version == self.seen {
            return None;
        }
        self.seen = shared.version;
        self.state = shared.state.clone();
        shared.last.clone()
    }
}
