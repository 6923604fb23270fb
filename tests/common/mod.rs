//! Shared harness for integration tests: a transport wrapper that delays
//! delivery of ordinary frames so receive-side reordering actually happens.

use std::sync::Arc;

use parking_lot::Mutex;

use rmi_core::transport::{
    Frame, Rank, RecvDone, RecvMatch, RecvOp, RecvRequest, SendRequest,
};
use rmi_core::Transport;

struct Stash {
    rng: fastrand::Rng,
    held: Vec<RecvDone>,
}

/// Wraps another transport and randomly holds back completed
/// active-message receives, releasing them later in a shuffled order.
/// Huge-lane receives pass through untouched. Deterministic per seed.
pub struct ReorderTransport<T> {
    inner: T,
    stash: Arc<Mutex<Stash>>,
}

impl<T: Transport> ReorderTransport<T> {
    pub fn new(inner: T, seed: u64) -> Self {
        Self {
            inner,
            stash: Arc::new(Mutex::new(Stash {
                rng: fastrand::Rng::with_seed(seed),
                held: Vec::new(),
            })),
        }
    }
}

impl<T: Transport> Transport for ReorderTransport<T> {
    fn rank(&self) -> Rank {
        self.inner.rank()
    }

    fn nranks(&self) -> usize {
        self.inner.nranks()
    }

    fn isend(&self, dest: Rank, frame: Frame) -> SendRequest {
        self.inner.isend(dest, frame)
    }

    fn irecv(&self, buf: Box<[u8]>, matcher: RecvMatch) -> RecvRequest {
        match matcher {
            RecvMatch::Am => RecvRequest::new(ReorderRecv {
                inner: Some(self.inner.irecv(buf, matcher)),
                stash: self.stash.clone(),
            }),
            RecvMatch::Huge { .. } => self.inner.irecv(buf, matcher),
        }
    }
}

struct ReorderRecv {
    inner: Option<RecvRequest>,
    stash: Arc<Mutex<Stash>>,
}

impl RecvOp for ReorderRecv {
    fn test(&mut self) -> Option<RecvDone> {
        let mut stash = self.stash.lock();

        // A slot whose own completion was held back returns a random held
        // frame instead; the poller reposts it afterwards, so every stash
        // eventually revives the slot it spent.
        if self.inner.is_none() {
            if stash.held.is_empty() || stash.rng.u8(..) >= 96 {
                return None;
            }
            let held_len = stash.held.len();
            let idx = stash.rng.usize(..held_len);
            return Some(stash.held.swap_remove(idx));
        }

        let done = self.inner.as_mut()?.test()?;

        // Hold back roughly a quarter of completions, capped so at least
        // one live slot always keeps draining.
        if stash.held.len() < 4 && stash.rng.u8(..) < 64 {
            stash.held.push(done);
            self.inner = None;
            return None;
        }
        Some(done)
    }
}
