//! Keep-latest frame delivery.
//!
//! A single-slot channel between the camera and the pipeline worker. When the worker
//! is busy, a newly delivered frame evicts the undelivered one; stale frames are
//! released back to their source, never queued.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::RawFrame;

/// Create a connected keep-latest sender/receiver pair.
pub fn latest_channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let closed = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameSender {
            tx,
            evict: rx.clone(),
            closed: closed.clone(),
            dropped: dropped.clone(),
        },
        FrameReceiver { rx, closed, dropped },
    )
}

/// Camera side of the slot.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<RawFrame>,
    evict: Receiver<RawFrame>,
    closed: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Offer a frame. Returns false when the consumer is gone; the frame is
    /// released in that case.
    pub fn deliver(&self, frame: RawFrame) -> bool {
        let mut frame = frame;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                frame.release();
                return false;
            }
            match self.tx.try_send(frame) {
                Ok(()) => return !self.reclaim_if_closed(),
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(mut stale) = self.evict.try_recv() {
                        log::trace!("dropping stale frame #{}", stale.sequence);
                        stale.release();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(mut rejected)) => {
                    rejected.release();
                    return false;
                }
            }
        }
    }

    /// The consumer may have closed and drained the slot between the closed
    /// check and the send. Take back anything left so it is not stranded.
    fn reclaim_if_closed(&self) -> bool {
        if !self.closed.load(Ordering::SeqCst) {
            return false;
        }
        while let Ok(mut frame) = self.evict.try_recv() {
            frame.release();
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Frames evicted before the consumer picked them up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Worker side of the slot.
pub struct FrameReceiver {
    rx: Receiver<RawFrame>,
    closed: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Underlying channel, for use in `select!`.
    pub fn channel(&self) -> &Receiver<RawFrame> {
        &self.rx
    }

    pub fn try_recv(&self) -> Option<RawFrame> {
        self.rx.try_recv().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        // Pending frame goes back to the source.
        while let Ok(mut frame) = self.rx.try_recv() {
            frame.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameLeases, PixelFormat};

    fn leased(leases: &FrameLeases, sequence: u64) -> RawFrame {
        leases.lease(RawFrame::new(vec![0; 6], 2, 2, 0, PixelFormat::Nv21).with_sequence(sequence))
    }

    #[test]
    fn newest_frame_wins_while_consumer_is_busy() {
        let leases = FrameLeases::new();
        let (tx, rx) = latest_channel();

        for seq in 1..=3 {
            assert!(tx.deliver(leased(&leases, seq)));
        }

        let frame = rx.try_recv().expect("latest frame");
        assert_eq!(frame.sequence, 3);
        assert!(rx.try_recv().is_none());
        assert_eq!(tx.dropped(), 2);
        // Only the delivered frame is still outstanding.
        assert_eq!(leases.outstanding(), 1);
        drop(frame);
        assert_eq!(leases.outstanding(), 0);
    }

    #[test]
    fn delivery_after_consumer_drop_releases_frame() {
        let leases = FrameLeases::new();
        let (tx, rx) = latest_channel();
        assert!(tx.deliver(leased(&leases, 1)));
        drop(rx);

        assert!(tx.is_closed());
        assert!(!tx.deliver(leased(&leases, 2)));
        assert_eq!(leases.outstanding(), 0);
    }

    #[test]
    fn frame_sent_after_consumer_drained_is_reclaimed() {
        let leases = FrameLeases::new();
        let (tx, rx) = latest_channel();
        assert!(tx.deliver(leased(&leases, 1)));
        // Consumer marked closed after its drain, with the frame already sent.
        rx.closed.store(true, Ordering::SeqCst);

        assert!(tx.reclaim_if_closed());
        assert_eq!(leases.outstanding(), 0);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn concurrent_consumer_drop_strands_no_frames() {
        let leases = FrameLeases::new();
        for round in 0..200 {
            let (tx, rx) = latest_channel();
            let closer = std::thread::spawn(move || drop(rx));
            for seq in 0..20 {
                tx.deliver(leased(&leases, round * 20 + seq));
            }
            closer.join().expect("closer thread");
            assert!(!tx.deliver(leased(&leases, u64::MAX)));
            assert_eq!(leases.outstanding(), 0, "round {}", round);
        }
    }
}
