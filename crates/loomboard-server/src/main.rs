//! Loomboard server binary
//!
//! HTTP + SSE server for collaborative whiteboard sessions.
//!
//! ## Usage
//!
//! ```bash
//! loomboard-server [--port PORT] [--data-dir DIR] [--backend-url URL]
//! ```

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use loomboard_room::{BlobStore, MemoryBlobStore, RoomRegistry, SqliteBlobStore};
use loomboard_server::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_HTTP_PORT};
use loomboard_server::{HttpGenerativeBackend, ServerState, routes};
use loomboard_stream::TurnCoordinator;

fn print_usage() {
    eprintln!(
        r#"loomboard-server - HTTP + SSE server for collaborative whiteboards

USAGE:
    loomboard-server [OPTIONS]

OPTIONS:
    --port <PORT>          HTTP port (default: {port})
    --bind <ADDR>          Bind address (default: {bind})
    --data-dir <DIR>       Durable blob storage directory (default: in-memory)
    --backend-url <URL>    Upstream generative backend endpoint
    --help, -h             Show this help

EXAMPLES:
    loomboard-server                                  # In-memory, port {port}
    loomboard-server --port 9000 --data-dir ./data
    loomboard-server --backend-url http://127.0.0.1:8788/generate
"#,
        port = DEFAULT_HTTP_PORT,
        bind = DEFAULT_BIND_ADDRESS,
    );
}

struct Args {
    port: u16,
    bind: String,
    data_dir: Option<PathBuf>,
    backend_url: String,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        port: DEFAULT_HTTP_PORT,
        bind: DEFAULT_BIND_ADDRESS.to_string(),
        data_dir: None,
        backend_url: "http://127.0.0.1:8788/generate".to_string(),
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--port" => {
                let value = iter.next().ok_or("--port requires a value")?;
                args.port = value.parse().map_err(|_| format!("invalid port: {value}"))?;
            }
            "--bind" => {
                args.bind = iter.next().ok_or("--bind requires a value")?;
            }
            "--data-dir" => {
                args.data_dir = Some(PathBuf::from(iter.next().ok_or("--data-dir requires a value")?));
            }
            "--backend-url" => {
                args.backend_url = iter.next().ok_or("--backend-url requires a value")?;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}\n");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let blob: Arc<dyn BlobStore> = match &args.data_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("error: cannot create data dir {}: {e}", dir.display());
                return ExitCode::FAILURE;
            }
            match SqliteBlobStore::open(dir.join("blobs.db")) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    eprintln!("error: cannot open blob database: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => {
            tracing::warn!("no --data-dir given; sessions will not survive a restart");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let backend = match HttpGenerativeBackend::new(&args.backend_url) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("error: cannot construct backend client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(ServerState {
        registry: Arc::new(RoomRegistry::new(blob)),
        coordinator: Arc::new(TurnCoordinator::new(Arc::new(backend))),
    });

    let addr: IpAddr = match args.bind.parse() {
        Ok(addr) => addr,
        Err(_) => {
            eprintln!("error: invalid bind address: {}", args.bind);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(port = args.port, bind = %args.bind, backend = %args.backend_url,
        "loomboard server listening");
    warp::serve(routes(state)).run((addr, args.port)).await;

    ExitCode::SUCCESS
}
