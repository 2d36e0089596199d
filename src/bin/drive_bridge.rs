//! Drive bridge process: one instance per physical controller.
//!
//! Hosts the instance's bus endpoint (inbound velocity command lines,
//! outbound telemetry and state messages), and runs the control and
//! telemetry loops until terminated.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};
use roverbus::config::RoverConfig;
use roverbus::drive::bridge::DriveBridge;
use roverbus::drive::command::CommandIngress;
use roverbus::drive::sim::SimDiscovery;
use roverbus::drive::watchdog::LivenessWatchdog;
use roverbus::drive::WheelPair;
use roverbus::protocol::{self, BusMessage, DriveVelCmd, LineCodec};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

const BUS_BROADCAST_BUFFER_SIZE: usize = 256;

/// Hardware round-trip latency modeled by the simulated transport; both
/// bridge loops pace themselves on it.
const SIM_CHANNEL_DELAY: Duration = Duration::from_micros(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("drive-bridge")
        .version("0.1.0")
        .about("Motor-controller bridge for one wheel pair")
        .arg(
            Arg::with_name("pair")
                .help("Wheel pair this instance controls")
                .required(true)
                .possible_values(&["front", "middle", "back"]),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Rover configuration file")
                .takes_value(true),
        )
        .get_matches();

    let pair: WheelPair = matches.value_of("pair").unwrap().parse()?;
    let config = RoverConfig::load_or_default(matches.value_of("config").map(Path::new))?;

    // The axis map is handed to the transport layer; a controller only has
    // axes 0 and 1, so reject nonsense before touching hardware
    let axes = config.drive.axes;
    if axes.left == axes.right || axes.left > 1 || axes.right > 1 {
        return Err(format!("invalid axis mapping: left={}, right={}", axes.left, axes.right).into());
    }

    let device_config = config.drive.device_config(pair);

    // Simulated transport; a hardware build supplies its own discovery here
    let (discovery, sim) = SimDiscovery::new(&device_config.controller_id);
    sim.set_op_delay(SIM_CHANNEL_DELAY);

    let (bus_tx, _) = broadcast::channel(BUS_BROADCAST_BUFFER_SIZE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bridge = DriveBridge::new(
        pair,
        device_config,
        Arc::new(discovery),
        LivenessWatchdog::new(),
        bus_tx.clone(),
        shutdown_rx,
    );
    let ingress = bridge.ingress();
    let telemetry = bridge.telemetry_worker();

    // ctrl-c raises the shutdown flag; both loops check it once per iteration
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let addr = config.bus.drive_addr(pair);
    tokio::spawn(async move {
        if let Err(e) = serve_bus(&addr, bus_tx, ingress).await {
            error!("bus server error: {}", e);
        }
    });

    let telemetry_task = tokio::spawn(telemetry.run());
    bridge.run().await;
    let _ = telemetry_task.await;

    Ok(())
}

async fn serve_bus(
    addr: &str,
    bus_tx: broadcast::Sender<BusMessage>,
    ingress: CommandIngress,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("bus listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("client connected: {}", peer);
                let bus_rx = bus_tx.subscribe();
                let client_ingress = ingress.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, bus_rx, client_ingress).await {
                        warn!("client {} error: {}", peer, e);
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

async fn handle_client(
    stream: TcpStream,
    mut bus_rx: broadcast::Receiver<BusMessage>,
    ingress: CommandIngress,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    // Outbound: forward every bus message as one JSON line
    let writer_task = tokio::spawn(async move {
        let mut codec = LineCodec::new();
        while let Ok(message) = bus_rx.recv().await {
            let Ok(line) = codec.encode(&message) else { continue };
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    // Inbound: velocity command lines into the ingress gate
    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break, // client disconnected
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match protocol::decode_line::<DriveVelCmd>(trimmed) {
                    Ok(cmd) => ingress.deliver(cmd.left, cmd.right),
                    Err(e) => warn!("ignoring malformed command line: {}", e),
                }
            }
            Err(e) => {
                warn!("error reading from client: {}", e);
                break;
            }
        }
    }

    writer_task.abort();
    Ok(())
}
