//! Camera stream allocator process.
//!
//! Accepts `CameraRequest` lines assigning camera devices to stream
//! pipelines and answers each with the resulting assignment; a background
//! task pumps every streaming pipeline.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{App, Arg};
use roverbus::camera::{PipelineManager, SimVideoBackend};
use roverbus::config::RoverConfig;
use roverbus::protocol::{self, CameraRequest, CameraResponse, LineCodec};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// The simulated backend renders instantly; pace the pump at roughly the
/// frame rate real capture latency would impose.
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

type SharedManager = Arc<Mutex<PipelineManager<SimVideoBackend>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("cameras")
        .version("0.1.0")
        .about("Rover camera stream allocator")
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

    let endpoints: Vec<String> = config
        .cameras
        .endpoints
        .iter()
        .take(config.cameras.pipelines)
        .cloned()
        .collect();
    let backend = SimVideoBackend::with_devices(config.cameras.max_device_id);
    let manager: SharedManager = Arc::new(Mutex::new(PipelineManager::new(
        backend,
        &endpoints,
        config.cameras.max_device_id,
    )));
    info!("managing {} stream pipelines", endpoints.len());

    // Stream pump: captures and renders every assigned pipeline
    let pump_manager = Arc::clone(&manager);
    tokio::spawn(async move {
        loop {
            pump_manager.lock().unwrap().update_streams();
            tokio::time::sleep(FRAME_INTERVAL).await;
        }
    });

    let addr = config.bus.cameras_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("bus listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("client connected: {}", peer);
                let client_manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_manager).await {
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
    manager: SharedManager,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut codec = LineCodec::new();

    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match protocol::decode_line::<CameraRequest>(trimmed) {
                    Ok(request) => {
                        info!("camera assignment request: {:?}", request.cameras);
                        let active = manager.lock().unwrap().change_cameras(&request.cameras);
                        let response = CameraResponse { active };
                        let encoded = codec.encode(&response)?;
                        writer.write_all(encoded.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                    }
                    Err(e) => warn!("ignoring malformed camera request: {}", e),
                }
            }
            Err(e) => {
                warn!("error reading from client: {}", e);
                break;
            }
        }
    }

    Ok(())
}
