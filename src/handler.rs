//! Handler registry: typed callables resolved by a stable id.

use std::sync::Arc;

use dashmap::DashMap;

/// Identifies a message handler. The same id must be bound to the same
/// callable on every rank that exchanges messages through it; ids travel in
/// the wire header and are resolved in the destination's table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u32);

/// A message handler: invoked synchronously on the dispatcher thread with
/// the payload bytes. Handlers must not block or run long computations;
/// doing so stalls all message processing for the process.
pub type AmHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Registry shared between the send path and the dispatcher. Registration
/// is allowed from any thread at any time; a message whose id has no entry
/// at dispatch time is a fatal condition.
#[derive(Default)]
pub struct HandlerTable {
    entries: DashMap<u32, AmHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn register<F>(&self, id: HandlerId, f: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.entries.insert(id.0, Arc::new(f));
    }

    pub fn lookup(&self, id: HandlerId) -> Option<AmHandler> {
        self.entries.get(&id.0).map(|entry| entry.value().clone())
    }
}
