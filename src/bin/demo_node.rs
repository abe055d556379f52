//! Standalone node that joins a cluster through one or more seeds and
//! periodically rumors a data message to whoever it has met so far.

use std::net::SocketAddr;
use std::thread::sleep;
use std::time::{Duration, Instant};

use clap::Parser;
use rumormesh::ports::{OsRng, SystemClock, UdpTransport};
use rumormesh::{EngineConfig, GossipEngine};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "demo_node", version, about = "rumormesh node demo")]
struct Args {
    /// Listen port (0 picks a random free port).
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Seed node addresses, comma-separated (e.g. 127.0.0.1:65000).
    #[arg(short, long, default_value = "127.0.0.1:65000")]
    seeds: String,

    /// Message to rumor periodically.
    #[arg(short, long, default_value = "Hello World")]
    data: String,

    /// Seconds between rumored data messages.
    #[arg(long, default_value = "5")]
    send_interval_secs: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rumormesh=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let self_addr: SocketAddr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let seeds: Vec<SocketAddr> = args
        .seeds
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| match s.trim().parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("skipping invalid seed {:?}: {}", s, e);
                None
            }
        })
        .collect();

    let transport = match UdpTransport::bind(self_addr) {
        Ok(t) => t,
        Err(e) => {
            error!("failed to bind {}: {}", self_addr, e);
            return;
        }
    };

    let mut engine = match GossipEngine::create(
        transport,
        SystemClock::new(),
        OsRng,
        EngineConfig::default(),
        |data: &[u8]| {
            info!("data arrived: {}", String::from_utf8_lossy(data));
        },
    ) {
        Ok(e) => e,
        Err(e) => {
            error!("gossip initialization failed: {}", e);
            return;
        }
    };

    if let Err(e) = engine.join(&seeds) {
        error!("gossip join failed: {}", e);
        return;
    }

    // Force an immediate send so the HELLO(s) go out before the first poll.
    if let Err(e) = engine.process_send() {
        error!("failed to send initial hello: {}", e);
        return;
    }

    info!(
        "node listening on {}, joining {} seed(s)",
        engine.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        seeds.len()
    );

    let send_interval = Duration::from_secs(args.send_interval_secs);
    let mut last_sent = Instant::now();

    loop {
        if let Err(e) = engine.process_receive() {
            warn!("gossip receive failed: {}", e);
        }

        if last_sent.elapsed() >= send_interval {
            last_sent = Instant::now();
            if let Err(e) = engine.send_data(args.data.as_bytes()) {
                warn!("gossip send_data failed: {}", e);
            }
        }

        if let Err(e) = engine.process_send() {
            warn!("gossip send failed: {}", e);
        }

        let interval = engine.tick();
        sleep(interval.min(Duration::from_millis(200)));
    }
}
