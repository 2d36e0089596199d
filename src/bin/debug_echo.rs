//! Debug echo service.
//!
//! Stand-in endpoint for services still in development: logs every received
//! JSON request line and answers it with a success envelope echoing the
//! request back.

use std::path::Path;

use clap::{App, Arg};
use roverbus::config::RoverConfig;
use roverbus::protocol::{EchoResponse, LineCodec};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("debug-echo")
        .version("0.1.0")
        .about("Rover debug echo service for request logging")
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

    let addr = config.bus.echo_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("bus listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("client connected: {}", peer);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream).await {
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

async fn handle_client(stream: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
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
                match serde_json::from_str::<serde_json::Value>(trimmed) {
                    Ok(request) => {
                        info!("service request: {}", request);
                        let response = EchoResponse { success: true, echoed: request };
                        let encoded = codec.encode(&response)?;
                        writer.write_all(encoded.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                    }
                    Err(e) => warn!("ignoring malformed request line: {}", e),
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
