//! CLI for boardhub
//!
//! Subcommands:
//! - `server`: run the WebSocket server
//! - `client`: connect to a board, optionally publish, print what arrives

use std::process::ExitCode;
use std::sync::Arc;

use boardhub::client::BoardClient;
use boardhub::config::{DEFAULT_CONFIG_PATH, Settings, load_config_from};
use boardhub::hub::{Hub, MemoryHub, SnapshotHub};
use boardhub::persistence::open_store;
use boardhub::transport::start_websocket_server;
use boardhub::utils::{Error, logging};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "boardhub")]
enum Command {
    /// Start the WebSocket server
    Server {
        /// Configuration file, extension optional
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
        /// Overrides `log.level` from the configuration
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Connect to a board, optionally publish a message, and print incoming messages
    Client {
        /// Board URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws/demo")]
        url: String,
        /// Message to broadcast once connected
        #[arg(long)]
        publish: Option<String>,
        /// Stop after this many incoming messages
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let result = match cmd {
        Command::Server { config, log_level } => run_server(&config, log_level).await,
        Command::Client {
            url,
            publish,
            count,
        } => {
            logging::init("info");
            run_client(&url, publish, count).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("boardhub failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config_path: &str, log_level: Option<String>) -> Result<(), Error> {
    let settings = load_config_from(config_path);
    let level = match (&log_level, &settings) {
        (Some(level), _) => level.clone(),
        (None, Ok(settings)) => settings.log.level.clone(),
        (None, Err(_)) => "info".to_string(),
    };
    logging::init(&level);
    let settings = settings?;

    let hub = build_hub(&settings).await?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let (stop, shutdown) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received. Exiting gracefully."),
            Err(e) => error!("cannot listen for shutdown signal: {e}"),
        }
        let _ = stop.send(true);
    });

    start_websocket_server(&addr, hub, settings, shutdown).await
}

async fn build_hub(settings: &Settings) -> Result<Arc<dyn Hub>, Error> {
    let memory = MemoryHub::new();
    let hub: Arc<dyn Hub> = match open_store(&settings.snapshot).await? {
        Some(store) => Arc::new(
            SnapshotHub::with_key_prefix(memory, store, &settings.snapshot.key_prefix)
                .with_store_timeout(settings.snapshot.timeout()),
        ),
        None => Arc::new(memory),
    };
    Ok(hub)
}

async fn run_client(url: &str, publish: Option<String>, count: usize) -> Result<(), Error> {
    let mut client = BoardClient::connect(url).await?;
    info!("connected to {url}");

    if let Some(message) = publish {
        client.publish(message).await?;
        info!("published");
    }

    for _ in 0..count {
        match client.next_message().await? {
            Some(payload) => println!("{}", String::from_utf8_lossy(&payload)),
            None => {
                info!("server closed the connection");
                break;
            }
        }
    }

    client.close().await?;
    Ok(())
}
