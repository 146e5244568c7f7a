// secure_chat/secure_server/src/main.rs

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use clearscreen::clear;
use rand::rngs::OsRng;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shared_crypto::config::DEFAULT_PORT;
use shared_crypto::{run_server_session, KeyGenConfig, RecordTransport, ServerKeys, TcpConnection};

/// Secure TCP server: hands out a CA-signed public key, then decrypts the
/// chained character stream of one client at a time.
#[derive(Parser, Debug)]
#[command(name = "secure_server", author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Listen on IPv4 instead of IPv6
    #[arg(long)]
    ipv4: bool,

    /// JSON key store: loaded if it exists, otherwise written with fresh keys
    #[arg(short, long)]
    key_file: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()
        .ok();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    clear().unwrap_or_else(|e| warn!("Could not clear the screen: {}", e));
    println!("\n==================== <<< SECURE TCP SERVER >>> ====================\n");

    let keys = load_or_generate_keys(cli.key_file.as_deref()).await?;
    info!(
        "Certificate Authority keys: e = {}, n = {}, d = {}",
        keys.ca.e,
        keys.ca.n,
        keys.ca.d.unwrap_or_default()
    );
    info!("Server public key: e = {}, n = {}", keys.server.e, keys.server.n);
    debug!("Server private exponent: d = {}", keys.server.d.unwrap_or_default());

    let addr = if cli.ipv4 {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.port))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, cli.port))
    };
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind to {} failed", addr))?;

    loop {
        info!("<<<SERVER>>> is listening at port {}", cli.port);
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        info!("Connected to <<<CLIENT>>> at {}", peer);

        let mut conn = TcpConnection::from_stream(stream);
        match run_server_session(&mut conn, &keys).await {
            Ok(transcript) => info!("Session with {} ended after {} message(s)", peer, transcript.len()),
            Err(e) => warn!("Session with {} aborted: {}", peer, e),
        }
        if let Err(e) = conn.close().await {
            debug!("Shutdown of {} failed: {}", peer, e);
        }
        info!("Disconnected from <<<CLIENT>>> at {}", peer);
    }
}

/// Keys live for the whole process. With a key file they also survive restarts.
async fn load_or_generate_keys(path: Option<&Path>) -> anyhow::Result<ServerKeys> {
    if let Some(path) = path.filter(|p| p.exists()) {
        info!("Loading keys from {}", path.display());
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        return ServerKeys::from_json(&json).with_context(|| format!("invalid key file {}", path.display()));
    }

    info!("Generating CA and server keys...");
    let keys = ServerKeys::generate(&mut OsRng, &KeyGenConfig::default()).context("key generation failed")?;

    if let Some(path) = path {
        tokio::fs::write(path, keys.to_json()?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Saved keys to {}", path.display());
    }
    Ok(keys)
}
