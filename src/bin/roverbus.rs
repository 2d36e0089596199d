//! Rover bus operator CLI.
//!
//! Sends drive commands and camera assignments to the rover processes and
//! monitors their telemetry streams.

use std::path::Path;
use std::time::Duration;

use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use roverbus::config::RoverConfig;
use roverbus::drive::state::BridgeState;
use roverbus::drive::WheelPair;
use roverbus::protocol::{self, BusMessage, CameraRequest, CameraResponse, DriveVelCmd, EchoResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("roverbus")
        .version("0.1.0")
        .author("Rover Embedded Software Team")
        .about("🛞 Rover bus CLI - drive commands, telemetry, and stream management")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Rover configuration file")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("drive")
                .about("🎮 Send a velocity command to one wheel pair")
                .arg(
                    Arg::with_name("pair")
                        .help("Target wheel pair")
                        .required(true)
                        .possible_values(&["front", "middle", "back"]),
                )
                .arg(
                    Arg::with_name("left")
                        .help("Left wheel velocity in [-1.0, 1.0]")
                        .required(true)
                        .allow_hyphen_values(true),
                )
                .arg(
                    Arg::with_name("right")
                        .help("Right wheel velocity in [-1.0, 1.0]")
                        .required(true)
                        .allow_hyphen_values(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Monitor telemetry and state from one wheel pair")
                .arg(
                    Arg::with_name("pair")
                        .help("Wheel pair to monitor")
                        .required(true)
                        .possible_values(&["front", "middle", "back"]),
                )
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds (default: infinite)")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("net").about("🌐 Monitor network bandwidth"))
        .subcommand(
            SubCommand::with_name("cameras")
                .about("🎥 Assign camera devices to stream pipelines")
                .arg(
                    Arg::with_name("devices")
                        .help("Camera device per pipeline, -1 to stop a pipeline")
                        .required(true)
                        .multiple(true)
                        .allow_hyphen_values(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("echo")
                .about("🔁 Send a raw JSON request to the debug echo service")
                .arg(Arg::with_name("request").help("JSON request body").required(true)),
        )
        .get_matches();

    let config = RoverConfig::load_or_default(matches.value_of("config").map(Path::new))?;

    match matches.subcommand() {
        ("drive", Some(sub)) => handle_drive(sub, &config).await?,
        ("monitor", Some(sub)) => handle_monitor(sub, &config).await?,
        ("net", _) => handle_net(&config).await?,
        ("cameras", Some(sub)) => handle_cameras(sub, &config).await?,
        ("echo", Some(sub)) => handle_echo(sub, &config).await?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start a bridge instance", "drive-bridge front".bright_cyan());
            println!("  {} Command it", "roverbus drive front 0.5 0.5".bright_cyan());
            println!("  {} Watch its telemetry", "roverbus monitor front".bright_cyan());
        }
    }

    Ok(())
}

async fn handle_drive(
    sub: &ArgMatches<'_>,
    config: &RoverConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let pair: WheelPair = sub.value_of("pair").unwrap().parse()?;
    let left: f32 = sub.value_of("left").unwrap().parse()?;
    let right: f32 = sub.value_of("right").unwrap().parse()?;

    let mut stream = connect(&config.bus.drive_addr(pair)).await?;
    let line = serde_json::to_string(&DriveVelCmd { left, right })?;
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    println!(
        "{} {} commanded: left {:.2}, right {:.2}",
        "✅".green(),
        pair.to_string().bright_white(),
        left,
        right
    );
    println!(
        "{}",
        "Commands only take effect while the bridge is Armed".dimmed()
    );
    Ok(())
}

async fn handle_monitor(
    sub: &ArgMatches<'_>,
    config: &RoverConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let pair: WheelPair = sub.value_of("pair").unwrap().parse()?;
    let duration = sub
        .value_of("duration")
        .map(|d| d.parse::<u64>())
        .transpose()?
        .map(Duration::from_secs);

    let stream = connect(&config.bus.drive_addr(pair)).await?;
    println!(
        "{}",
        format!("📡 Monitoring {pair} (Press Ctrl+C to stop)...")
            .bright_blue()
            .bold()
    );

    let monitor = monitor_bus(stream);
    match duration {
        Some(limit) => {
            let _ = tokio::time::timeout(limit, monitor).await;
        }
        None => monitor.await?,
    }
    Ok(())
}

async fn monitor_bus(stream: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        let Ok(message) = protocol::decode_line::<BusMessage>(&line) else {
            continue;
        };
        match message {
            BusMessage::DriveVelData(data) => {
                println!(
                    "{:<13} {:>7.2} A {:>8.2} m/s",
                    data.wheel.bright_white(),
                    data.current_amps,
                    data.velocity_m_s
                );
            }
            BusMessage::DriveStateData(data) => {
                let state = match data.state {
                    BridgeState::Armed => data.state.to_string().bright_green(),
                    BridgeState::Error => data.state.to_string().bright_red(),
                    BridgeState::Disconnected => data.state.to_string().yellow(),
                };
                println!("{} {} state → {}", "⚙".bright_blue(), data.pair.bright_white(), state);
            }
            BusMessage::NetworkBandwidth(data) => {
                println!("tx {:>7.2} Mbps  rx {:>7.2} Mbps", data.tx_mbps, data.rx_mbps);
            }
        }
    }
    Ok(())
}

async fn handle_net(config: &RoverConfig) -> Result<(), Box<dyn std::error::Error>> {
    let stream = connect(&config.bus.netmon_addr()).await?;
    println!(
        "{}",
        "🌐 Monitoring network bandwidth (Press Ctrl+C to stop)..."
            .bright_blue()
            .bold()
    );
    monitor_bus(stream).await
}

async fn handle_cameras(
    sub: &ArgMatches<'_>,
    config: &RoverConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let devices: Vec<i32> = sub
        .values_of("devices")
        .unwrap()
        .map(str::parse)
        .collect::<Result<_, _>>()?;

    let mut stream = connect(&config.bus.cameras_addr()).await?;
    let line = serde_json::to_string(&CameraRequest { cameras: devices })?;
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    let mut lines = BufReader::new(stream).lines();
    if let Some(reply) = lines.next_line().await? {
        let response: CameraResponse = protocol::decode_line(&reply)?;
        println!("{} active pipelines: {:?}", "🎥".bright_blue(), response.active);
    }
    Ok(())
}

async fn handle_echo(
    sub: &ArgMatches<'_>,
    config: &RoverConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = sub.value_of("request").unwrap();
    // Validate locally so the service never sees garbage
    let body: serde_json::Value = serde_json::from_str(request)?;

    let mut stream = connect(&config.bus.echo_addr()).await?;
    stream.write_all(body.to_string().as_bytes()).await?;
    stream.write_all(b"\n").await?;

    let mut lines = BufReader::new(stream).lines();
    if let Some(reply) = lines.next_line().await? {
        let response: EchoResponse = protocol::decode_line(&reply)?;
        if response.success {
            println!("{} echoed: {}", "✅".green(), response.echoed);
        } else {
            println!("{} request rejected", "❌".red());
        }
    }
    Ok(())
}

async fn connect(addr: &str) -> Result<TcpStream, Box<dyn std::error::Error>> {
    match TcpStream::connect(addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} failed to connect to {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} The process is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin drive-bridge -- front".bright_cyan());
            }
            Err(e.into())
        }
    }
}
