//! Standalone seed node: binds a fixed port and accepts joins, never
//! initiating one itself.

use std::net::SocketAddr;
use std::thread::sleep;
use std::time::Duration;

use clap::Parser;
use rumormesh::ports::{OsRng, SystemClock, UdpTransport};
use rumormesh::{EngineConfig, GossipEngine};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "demo_seed_node", version, about = "rumormesh seed node demo")]
struct Args {
    /// Listen port.
    #[arg(short, long, default_value = "65000")]
    port: u16,
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

    if let Err(e) = engine.join(&[]) {
        error!("gossip join failed: {}", e);
        return;
    }

    info!("seed node listening on {}", self_addr);

    loop {
        if let Err(e) = engine.process_receive() {
            warn!("gossip receive failed: {}", e);
        }
        if let Err(e) = engine.process_send() {
            warn!("gossip send failed: {}", e);
        }
        let interval = engine.tick();
        sleep(interval.min(Duration::from_millis(200)));
    }
}
