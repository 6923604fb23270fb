//! Point-to-point transport boundary.
//!
//! The core never moves bytes itself: it stamps frames and hands them to a
//! [`Transport`], and it cycles posted receive buffers through one. The
//! wire is assumed reliable and FIFO per (source, lane); no retry or
//! acknowledgement exists at this layer.

pub mod channel;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::header::HEADER_LEN;

/// Integer identity of a process within the fixed communication group.
pub type Rank = usize;

/// Which wire lane a frame travels on. Ordinary traffic shares the
/// active-message lane; oversize payload transfers get a lane of their own
/// so a pooled receive slot is never matched against a frame it cannot
/// hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lane {
    Am,
    Huge,
}

/// One outbound message: a stamped header plus a shared payload. Sharing
/// the payload (`Arc`) is what keeps the caller's buffer alive until the
/// wire no longer needs it; nothing is copied on the send side.
pub struct Frame {
    pub header: [u8; HEADER_LEN],
    pub payload: Arc<[u8]>,
    pub lane: Lane,
}

impl Frame {
    /// Total bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// Receive matching: pooled slots accept any ordinary frame; an oversize
/// slot is matched only against the huge lane of one announced source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecvMatch {
    Am,
    Huge { from: Rank },
}

/// A completed receive: the posted buffer, filled, with the source rank
/// and the total bytes written (header included).
pub struct RecvDone {
    pub buf: Box<[u8]>,
    pub src: Rank,
    pub len: usize,
}

/// Completion handle for an outstanding send. The payload buffer may be
/// reused once this reports complete.
pub struct SendRequest {
    complete: Arc<AtomicBool>,
}

impl SendRequest {
    pub fn pending(complete: Arc<AtomicBool>) -> Self {
        Self { complete }
    }

    /// A send the transport accepted eagerly.
    pub fn completed() -> Self {
        Self {
            complete: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }
}

/// An outstanding posted receive; poll with [`RecvRequest::test`].
pub struct RecvRequest(Box<dyn RecvOp>);

impl RecvRequest {
    pub fn new(op: impl RecvOp + 'static) -> Self {
        Self(Box::new(op))
    }

    /// Non-blocking completion test. Returns the filled buffer at most
    /// once; later calls return `None`.
    pub fn test(&mut self) -> Option<RecvDone> {
        self.0.test()
    }
}

pub trait RecvOp: Send {
    fn test(&mut self) -> Option<RecvDone>;
}

/// Non-blocking point-to-point substrate over a fixed rank group.
///
/// Failure convention: implementations surface unrecoverable wire errors
/// by panicking: this layer performs no retry and has no error channel
/// back to senders.
pub trait Transport: Send + Sync {
    fn rank(&self) -> Rank;
    fn nranks(&self) -> usize;
    /// Begins a non-blocking send; never blocks the caller.
    fn isend(&self, dest: Rank, frame: Frame) -> SendRequest;
    /// Posts `buf` for an incoming frame selected by `matcher`.
    fn irecv(&self, buf: Box<[u8]>, matcher: RecvMatch) -> RecvRequest;
}
