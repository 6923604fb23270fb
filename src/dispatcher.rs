//! The server loop: one thread per endpoint owning every receive buffer,
//! the ordering lanes and the huge-message rendezvous. No other thread
//! touches any of this state, which is what lets the whole receive path
//! run without a single lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RmiConfig;
use crate::handler::HandlerId;
use crate::header::{HEADER_LEN, Header};
use crate::ordering::{OrderingEngine, Pending};
use crate::pool::SlotPool;
use crate::rmi::Shared;
use crate::transport::{Rank, RecvDone, RecvMatch, RecvRequest, Transport};

/// An oversize transfer announced before the oversize slot was free.
struct HugeDescriptor {
    src: Rank,
    size: u64,
}

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    config: RmiConfig,
    /// Pre-posted ordinary receive slots; always `config.nrecv` outstanding.
    slots: Vec<RecvRequest>,
    pool: SlotPool,
    ordering: OrderingEngine,
    /// At most one oversize receive outstanding at a time.
    huge_slot: Option<RecvRequest>,
    /// Announcements waiting for the oversize slot, FIFO. Global order
    /// preserves per-source order.
    huge_pending: VecDeque<HugeDescriptor>,
}

impl Dispatcher {
    pub fn new(shared: Arc<Shared>, transport: Arc<dyn Transport>, config: RmiConfig) -> Self {
        let slot_len = HEADER_LEN + config.max_msg_len;
        let slots = (0..config.nrecv)
            .map(|_| transport.irecv(vec![0u8; slot_len].into_boxed_slice(), RecvMatch::Am))
            .collect();
        let ordering = OrderingEngine::new(transport.nranks());
        Self {
            shared,
            config,
            slots,
            pool: SlotPool::new(slot_len),
            ordering,
            huge_slot: None,
            huge_pending: VecDeque::new(),
            transport,
        }
    }

    pub fn run(mut self) {
        if let Some(core) = self.config.pin_core {
            self.pin_to(core);
        }
        info!(
            rank = self.transport.rank(),
            nrecv = self.config.nrecv,
            backoff_us = self.config.backoff_us,
            "dispatcher running"
        );
        let backoff = Duration::from_micros(self.config.backoff_us);
        while self.shared.running.load(Ordering::Acquire) {
            if !self.poll_once() {
                std::thread::sleep(backoff);
            }
        }
        let parked = self.ordering.total_pending();
        if parked > 0 {
            // Acceptable only because callers quiesce before stopping.
            warn!(parked, "stopping with undispatched ordered messages");
        }
        let pool = self.pool.stats();
        info!(
            rank = self.transport.rank(),
            spare_allocated = pool.allocated,
            spare_available = pool.available,
            "dispatcher stopped"
        );
    }

    /// One sweep over every posted slot. Returns true if anything completed.
    fn poll_once(&mut self) -> bool {
        let mut progress = false;
        for i in 0..self.slots.len() {
            if let Some(done) = self.slots[i].test() {
                progress = true;
                self.on_pooled_recv(i, done);
            }
        }
        if let Some(slot) = self.huge_slot.as_mut() {
            if let Some(done) = slot.test() {
                progress = true;
                self.huge_slot = None;
                self.on_huge_recv(done);
                if let Some(next) = self.huge_pending.pop_front() {
                    self.post_huge(next.src, next.size);
                }
            }
        }
        progress
    }

    fn on_pooled_recv(&mut self, slot: usize, done: RecvDone) {
        let header = parse_header(&done.buf, done.src);
        if header.is_huge_announce() {
            self.note_huge(done.src, header.payload_len);
            self.repost(slot, done.buf);
            return;
        }

        let payload_len = header.payload_len as usize;
        if HEADER_LEN + payload_len > done.len {
            error!(src = done.src, payload_len, wire_len = done.len, "truncated message");
            panic!("message from rank {} shorter than its header advertises", done.src);
        }
        self.shared.stats.record_recv(payload_len as u64);

        if !header.is_ordered() {
            self.invoke(
                header.handler,
                &done.buf[HEADER_LEN..HEADER_LEN + payload_len],
                done.src,
            );
            self.repost(slot, done.buf);
            return;
        }

        let ready = self.ordering.accept(Pending {
            seq: header.seq,
            handler: header.handler,
            src: done.src,
            payload_len,
            buf: done.buf,
            pooled: true,
        });
        if ready.is_empty() {
            // Parked: the arrival keeps its buffer, the slot gets a spare.
            self.repost(slot, self.pool.acquire());
            return;
        }
        let mut slot_refilled = false;
        for msg in ready {
            self.invoke(
                msg.handler,
                &msg.buf[HEADER_LEN..HEADER_LEN + msg.payload_len],
                msg.src,
            );
            if msg.pooled {
                if slot_refilled {
                    self.pool.release(msg.buf);
                } else {
                    self.repost(slot, msg.buf);
                    slot_refilled = true;
                }
            }
        }
        if !slot_refilled {
            self.repost(slot, self.pool.acquire());
        }
    }

    /// A completed oversize transfer. The frame carries a full normal
    /// header, so it flows through the same dispatch paths; its buffer is
    /// dropped afterwards, never pooled.
    fn on_huge_recv(&mut self, done: RecvDone) {
        let header = parse_header(&done.buf, done.src);
        let payload_len = header.payload_len as usize;
        if HEADER_LEN + payload_len > done.len {
            error!(src = done.src, payload_len, wire_len = done.len, "truncated huge message");
            panic!("huge message from rank {} shorter than announced", done.src);
        }
        self.shared.stats.record_recv(payload_len as u64);

        if !header.is_ordered() {
            self.invoke(
                header.handler,
                &done.buf[HEADER_LEN..HEADER_LEN + payload_len],
                done.src,
            );
            return;
        }
        let ready = self.ordering.accept(Pending {
            seq: header.seq,
            handler: header.handler,
            src: done.src,
            payload_len,
            buf: done.buf,
            pooled: false,
        });
        for msg in ready {
            self.invoke(
                msg.handler,
                &msg.buf[HEADER_LEN..HEADER_LEN + msg.payload_len],
                msg.src,
            );
            if msg.pooled {
                self.pool.release(msg.buf);
            }
        }
    }

    fn note_huge(&mut self, src: Rank, size: u64) {
        if self.shared.debug.load(Ordering::Relaxed) {
            debug!(src, size, "huge-message announcement");
        }
        if self.huge_slot.is_none() && self.huge_pending.is_empty() {
            self.post_huge(src, size);
            return;
        }
        let queued = self.huge_pending.iter().filter(|d| d.src == src).count();
        if queued >= self.config.huge_pending_cap {
            error!(src, queued, "huge-message admission queue overflow");
            panic!(
                "rank {src} exceeded the bound of {} queued huge transfers",
                self.config.huge_pending_cap
            );
        }
        self.huge_pending.push_back(HugeDescriptor { src, size });
    }

    fn post_huge(&mut self, src: Rank, size: u64) {
        let buf = vec![0u8; HEADER_LEN + size as usize].into_boxed_slice();
        self.huge_slot = Some(self.transport.irecv(buf, RecvMatch::Huge { from: src }));
    }

    fn invoke(&self, id: HandlerId, payload: &[u8], src: Rank) {
        if self.shared.debug.load(Ordering::Relaxed) {
            debug!(handler = id.0, src, len = payload.len(), "dispatching");
        }
        let Some(handler) = self.shared.handlers.lookup(id) else {
            error!(handler = id.0, src, "no handler registered for incoming message");
            panic!("unresolvable handler id {} in message from rank {src}", id.0);
        };
        handler(payload);
    }

    fn repost(&mut self, slot: usize, buf: Box<[u8]>) {
        debug_assert_eq!(buf.len(), self.pool.slot_len());
        self.slots[slot] = self.transport.irecv(buf, RecvMatch::Am);
    }

    fn pin_to(&self, index: usize) {
        match core_affinity::get_core_ids() {
            Some(cores) if index < cores.len() => {
                if core_affinity::set_for_current(cores[index]) {
                    info!(core = cores[index].id, "dispatcher pinned");
                }
            }
            _ => info!(index, "core pinning unavailable, dispatcher unpinned"),
        }
    }
}

fn parse_header(buf: &[u8], src: Rank) -> Header {
    match Header::from_bytes(buf) {
        Some(header) => header,
        None => {
            error!(src, "malformed message header");
            panic!("malformed header in message from rank {src}");
        }
    }
}
