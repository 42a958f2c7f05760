//! Announcement transport seam.
//!
//! The overlay only ever hands a finished announcement to this trait;
//! delivery is best-effort and failures are logged by the caller, never
//! retried inside the call (the scheduler's next tick re-announces).
//! Local knowledge-map propagation is done by the engine itself, so an
//! implementation only has to move bytes.

use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use toroid_types::announcement::ParityAnnouncement;
use toroid_types::node::NodeId;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Broadcast from node {0} failed: {1}")]
    Broadcast(NodeId, String),
    #[error("Send to node {0} failed: {1}")]
    Send(NodeId, String),
}

pub trait Transport: Send + Sync {
    /// Best-effort fan-out of one announcement to every peer.
    fn broadcast(&self, announcement: &ParityAnnouncement) -> Result<(), TransportError>;

    /// Best-effort delivery of one announcement to a single peer.
    fn send(&self, to: NodeId, announcement: &ParityAnnouncement) -> Result<(), TransportError>;
}

/// Single-process bus. Every frame still goes through the wire codec so
/// the fixed-layout record is exercised end to end; the counters feed
/// diagnostics and tests.
#[derive(Debug, Default)]
pub struct LocalBus {
    broadcast_frames: AtomicUsize,
    unicast_frames: AtomicUsize,
    bytes_sent: AtomicUsize,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast_frames(&self) -> usize {
        self.broadcast_frames.load(Ordering::Relaxed)
    }

    pub fn unicast_frames(&self) -> usize {
        self.unicast_frames.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

impl Transport for LocalBus {
    fn broadcast(&self, announcement: &ParityAnnouncement) -> Result<(), TransportError> {
        let frame = announcement.to_wire();
        self.bytes_sent.fetch_add(frame.len(), Ordering::Relaxed);
        self.broadcast_frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn send(&self, _to: NodeId, announcement: &ParityAnnouncement) -> Result<(), TransportError> {
        let frame = announcement.to_wire();
        self.bytes_sent.fetch_add(frame.len(), Ordering::Relaxed);
        self.unicast_frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
