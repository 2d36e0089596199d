//! Network bandwidth monitor process.
//!
//! Samples the wired interface's byte counters once per second and publishes
//! `NetworkBandwidth` messages to connected bus clients.

use std::path::Path;

use clap::{App, Arg};
use roverbus::config::RoverConfig;
use roverbus::netmon::{pick_interface, BandwidthSampler, SAMPLE_INTERVAL};
use roverbus::protocol::{BusMessage, LineCodec};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const BUS_BROADCAST_BUFFER_SIZE: usize = 64;
const SYSFS_NET_BASE: &str = "/sys/class/net";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("netmon")
        .version("0.1.0")
        .about("Rover network bandwidth monitor")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Rover configuration file")
                .takes_value(true),
        )
        .get_matches();

    let config = RoverConfig::load_or_default(matches.value_of("config").map(Path::new))?;

    let Some(iface) = pick_interface(Path::new(SYSFS_NET_BASE), &config.network.default_iface)
    else {
        error!("cannot locate a wired network interface");
        std::process::exit(1);
    };
    let sampler = BandwidthSampler::new(&iface);
    info!("monitoring interface {}", sampler.iface());

    let (bus_tx, _) = broadcast::channel(BUS_BROADCAST_BUFFER_SIZE);
    let addr = config.bus.netmon_addr();
    let server_tx = bus_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_publish(&addr, server_tx).await {
            error!("bus server error: {}", e);
        }
    });

    loop {
        match sampler.sample().await {
            Ok(bandwidth) => {
                info!(
                    "tx {:.2} Mbps / rx {:.2} Mbps",
                    bandwidth.tx_mbps, bandwidth.rx_mbps
                );
                let _ = bus_tx.send(BusMessage::NetworkBandwidth(bandwidth));
            }
            Err(e) => {
                warn!("bandwidth sample failed: {}", e);
                tokio::time::sleep(SAMPLE_INTERVAL).await;
            }
        }
    }
}

/// Publish-only bus endpoint: every client receives the message stream.
async fn serve_publish(
    addr: &str,
    bus_tx: broadcast::Sender<BusMessage>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("bus listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((mut stream, peer)) => {
                info!("client connected: {}", peer);
                let mut bus_rx = bus_tx.subscribe();
                tokio::spawn(async move {
                    let mut codec = LineCodec::new();
                    while let Ok(message) = bus_rx.recv().await {
                        let Ok(line) = codec.encode(&message) else { continue };
                        if stream.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                        if stream.write_all(b"\n").await.is_err() {
                            break;
                        }
                    }
                    info!("client {} disconnected", peer);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}
