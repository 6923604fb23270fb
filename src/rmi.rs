//! Public endpoint handle: the send path plus dispatcher lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::thread::JoinHandle;

use anyhow::Context;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::RmiConfig;
use crate::dispatcher::Dispatcher;
use crate::handler::{HandlerId, HandlerTable};
use crate::header::{ATTR_HUGE_ANNOUNCE, ATTR_ORDERED, ATTR_UNORDERED, Header, Seq};
use crate::stats::{RmiStats, StatCounters};
use crate::transport::{Frame, Lane, Rank, SendRequest, Transport};

/// Delivery policy for one send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handler execution order at the destination matches counter
    /// assignment order across all ordered sends from this process to
    /// that destination.
    Ordered,
    /// No relative guarantee, not even against other unordered sends.
    Unordered,
}

/// State shared between the sender-facing handle and the dispatcher.
pub(crate) struct Shared {
    pub running: AtomicBool,
    pub debug: AtomicBool,
    pub stats: StatCounters,
    pub handlers: HandlerTable,
}

/// One active-message endpoint: any thread may send through it; a single
/// dedicated thread polls receives, reorders, and invokes handlers.
///
/// Endpoints are explicit values rather than a process-wide singleton, so
/// several can coexist, one per transport endpoint, which is how
/// multi-rank groups run inside a single test process.
pub struct Rmi {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    /// Ordering counters, one per destination, shared by every sending
    /// thread in the process.
    send_counters: Vec<CachePadded<AtomicU16>>,
    /// Serializes oversize sends per destination. The receiver sizes its
    /// oversize buffer from the oldest announcement and matches the next
    /// huge-lane frame from that source, so announcement order and
    /// huge-lane order must agree; the gate makes the two pushes one
    /// atomic step.
    huge_gate: Vec<Mutex<()>>,
    max_msg_len: usize,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Rmi {
    /// Posts the receive pool and spawns the dispatcher thread.
    pub fn start(transport: Arc<dyn Transport>, config: RmiConfig) -> anyhow::Result<Rmi> {
        let config = config.clamped();
        config.validate()?;
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            debug: AtomicBool::new(false),
            stats: StatCounters::default(),
            handlers: HandlerTable::new(),
        });
        let send_counters = (0..transport.nranks())
            .map(|_| CachePadded::new(AtomicU16::new(0)))
            .collect();
        let huge_gate = (0..transport.nranks()).map(|_| Mutex::new(())).collect();
        let max_msg_len = config.max_msg_len;
        let dispatcher = Dispatcher::new(shared.clone(), transport.clone(), config);
        let thread = std::thread::Builder::new()
            .name(format!("rmi-dispatch-{}", transport.rank()))
            .spawn(move || dispatcher.run())
            .context("failed to spawn dispatcher thread")?;
        info!(
            rank = transport.rank(),
            nranks = transport.nranks(),
            "endpoint started"
        );
        Ok(Rmi {
            shared,
            transport,
            send_counters,
            huge_gate,
            max_msg_len,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    pub fn nranks(&self) -> usize {
        self.transport.nranks()
    }

    /// Binds `f` to `id`. The same id must resolve to the same handler on
    /// every rank that exchanges messages through it.
    pub fn register<F>(&self, id: HandlerId, f: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.shared.handlers.register(id, f);
    }

    /// Sends an active message; never blocks. The returned request reports
    /// when the transport has released the payload buffer; until then the
    /// shared payload stays alive, no copy is made.
    ///
    /// Payloads above the configured maximum take the two-phase rendezvous
    /// transparently.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint has been stopped: a send with no
    /// receiver-side poller cannot be guaranteed delivered and there is no
    /// recovery path.
    pub fn isend(
        &self,
        payload: impl Into<Arc<[u8]>>,
        dest: Rank,
        handler: HandlerId,
        delivery: Delivery,
    ) -> SendRequest {
        let payload: Arc<[u8]> = payload.into();
        assert!(
            self.shared.running.load(Ordering::Acquire),
            "attempted to send an active message while the dispatcher is not running \
             (typically a send issued after stop)"
        );
        assert!(
            dest < self.transport.nranks(),
            "destination rank {dest} out of range"
        );
        if payload.len() > self.max_msg_len {
            return self.isend_huge(payload, dest, handler, delivery);
        }
        let (attr, seq) = self.stamp(dest, delivery);
        let header = Header {
            handler,
            attr,
            seq,
            payload_len: payload.len() as u64,
        };
        if self.shared.debug.load(Ordering::Relaxed) {
            debug!(dest, handler = handler.0, len = payload.len(), seq, "isend");
        }
        self.shared.stats.record_send(payload.len() as u64);
        self.transport.isend(
            dest,
            Frame {
                header: header.to_bytes(),
                payload,
                lane: Lane::Am,
            },
        )
    }

    /// Two-phase path for oversize payloads: a header-only announcement
    /// carrying the true size, then the payload itself on the huge lane,
    /// received once the destination posts a buffer of exactly that size.
    fn isend_huge(
        &self,
        payload: Arc<[u8]>,
        dest: Rank,
        handler: HandlerId,
        delivery: Delivery,
    ) -> SendRequest {
        let size = payload.len() as u64;
        if self.shared.debug.load(Ordering::Relaxed) {
            debug!(dest, handler = handler.0, size, "isend (huge)");
        }
        // Holds across both pushes: a concurrent oversize send to the same
        // destination must not slot its payload between this announcement
        // and this payload on the huge lane.
        let _gate = self.huge_gate[dest].lock();
        let announce = Header {
            handler,
            attr: ATTR_HUGE_ANNOUNCE,
            seq: 0,
            payload_len: size,
        };
        let empty: Arc<[u8]> = Vec::new().into();
        self.transport.isend(
            dest,
            Frame {
                header: announce.to_bytes(),
                payload: empty,
                lane: Lane::Am,
            },
        );
        // The payload frame carries the real header; the announcement is
        // bookkeeping and is excluded from statistics.
        let (attr, seq) = self.stamp(dest, delivery);
        let header = Header {
            handler,
            attr,
            seq,
            payload_len: size,
        };
        self.shared.stats.record_send(size);
        self.transport.isend(
            dest,
            Frame {
                header: header.to_bytes(),
                payload,
                lane: Lane::Huge,
            },
        )
    }

    fn stamp(&self, dest: Rank, delivery: Delivery) -> (u32, Seq) {
        match delivery {
            Delivery::Ordered => (
                ATTR_ORDERED,
                self.send_counters[dest].fetch_add(1, Ordering::Relaxed),
            ),
            Delivery::Unordered => (ATTR_UNORDERED, 0),
        }
    }

    pub fn stats(&self) -> RmiStats {
        self.shared.stats.snapshot()
    }

    pub fn set_debug(&self, on: bool) {
        self.shared.debug.store(on, Ordering::Relaxed);
    }

    pub fn debug(&self) -> bool {
        self.shared.debug.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Signals shutdown and blocks until the dispatcher thread has exited;
    /// no handler runs after this returns. Ordered messages still parked
    /// for reordering are dropped; callers quiesce outstanding work
    /// before stopping. Idempotent.
    pub fn stop(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            info!(rank = self.transport.rank(), "stopping endpoint");
            self.shared.running.store(false, Ordering::Release);
            if handle.join().is_err() {
                error!(rank = self.transport.rank(), "dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Rmi {
    fn drop(&mut self) {
        self.stop();
    }
}
