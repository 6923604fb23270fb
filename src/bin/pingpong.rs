use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use rmi_core::{ChannelGroup, Delivery, HandlerId, Rmi, RmiConfig};

#[derive(Parser, Debug)]
#[command(name = "pingpong")]
#[command(about = "In-process active-message ring throughput driver")]
struct Args {
    /// Number of ranks in the in-process group
    #[arg(short, long, default_value = "2")]
    ranks: usize,

    /// Messages each rank sends to its right neighbor
    #[arg(short, long, default_value = "100000")]
    count: u64,

    /// Payload size in bytes
    #[arg(short, long, default_value = "256")]
    payload: usize,

    /// Maximum ordinary message length
    #[arg(long, default_value = "65536")]
    max_msg_len: usize,

    /// Receive pool depth per endpoint
    #[arg(long, default_value = "64")]
    nrecv: usize,

    /// Per-message debug tracing (default: false)
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

const PING: HandlerId = HandlerId(1);

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();
    anyhow::ensure!(args.ranks >= 2, "need at least two ranks");

    info!(
        ranks = args.ranks,
        count = args.count,
        payload = args.payload,
        cores = num_cpus::get(),
        "starting in-process ring"
    );

    let config = RmiConfig {
        max_msg_len: args.max_msg_len,
        nrecv: args.nrecv,
        ..RmiConfig::from_env()
    };

    let group = ChannelGroup::new(args.ranks);
    let received: Vec<Arc<AtomicU64>> = (0..args.ranks)
        .map(|_| Arc::new(AtomicU64::new(0)))
        .collect();

    let mut endpoints = Vec::with_capacity(args.ranks);
    for rank in 0..args.ranks {
        let rmi = Rmi::start(Arc::new(group.endpoint(rank)), config.clone())?;
        rmi.set_debug(args.verbose);
        let bytes_in = received[rank].clone();
        rmi.register(PING, move |payload| {
            bytes_in.fetch_add(payload.len() as u64, Ordering::Relaxed);
        });
        endpoints.push(rmi);
    }

    let body: Arc<[u8]> = vec![0xA5u8; args.payload].into();
    let start = Instant::now();
    for rank in 0..args.ranks {
        let dest = (rank + 1) % args.ranks;
        for _ in 0..args.count {
            endpoints[rank].isend(body.clone(), dest, PING, Delivery::Ordered);
        }
    }

    let expected = args.count * args.payload as u64;
    for bytes_in in &received {
        while bytes_in.load(Ordering::Relaxed) < expected {
            std::thread::yield_now();
        }
    }
    let elapsed = start.elapsed();

    let total = args.count * args.ranks as u64;
    info!(
        msgs = total,
        secs = format!("{:.3}", elapsed.as_secs_f64()),
        rate_per_sec = format!("{:.0}", total as f64 / elapsed.as_secs_f64()),
        "all payloads delivered"
    );
    for rmi in &endpoints {
        let stats = rmi.stats();
        info!(
            rank = rmi.rank(),
            sent = stats.msg_sent,
            recv = stats.msg_recv,
            bytes_recv = stats.bytes_recv,
            "endpoint stats"
        );
    }
    for rmi in &endpoints {
        rmi.stop();
    }
    Ok(())
}
