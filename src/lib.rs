//! Low-level active-message core for a process-parallel runtime.
//!
//! Any thread may send a handler-plus-payload message to a remote rank;
//! one dedicated dispatcher thread per endpoint owns every receive buffer
//! and invokes handlers, preserving per-(source, destination) order for
//! sends marked ordered. Payloads beyond the pooled slot size travel
//! through a two-phase rendezvous. There is no retry or acknowledgement
//! layer: the transport is assumed reliable, and unrecoverable conditions
//! abort the process.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rmi_core::{ChannelGroup, Delivery, HandlerId, Rmi, RmiConfig};
//!
//! const ECHO: HandlerId = HandlerId(1);
//!
//! let group = ChannelGroup::new(2);
//! let a = Rmi::start(Arc::new(group.endpoint(0)), RmiConfig::default())?;
//! let b = Rmi::start(Arc::new(group.endpoint(1)), RmiConfig::default())?;
//! b.register(ECHO, |payload| println!("got {} bytes", payload.len()));
//!
//! a.isend(b"hello".to_vec(), 1, ECHO, Delivery::Ordered);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod handler;
pub mod header;
pub mod stats;
pub mod transport;

mod dispatcher;
mod ordering;
mod pool;
mod rmi;

pub use config::RmiConfig;
pub use handler::{AmHandler, HandlerId};
pub use header::{ALIGNMENT, HEADER_LEN, Seq};
pub use rmi::{Delivery, Rmi};
pub use stats::RmiStats;
pub use transport::channel::ChannelGroup;
pub use transport::{Rank, Transport};
