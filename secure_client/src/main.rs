// secure_chat/secure_client/src/main.rs

use anyhow::Context;
use clap::Parser;
use clearscreen::clear;
use inquire::Text;
use rand::rngs::OsRng;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shared_crypto::config::DEFAULT_PORT;
use shared_crypto::{is_end_of_session, ClientSession, KeyGenConfig, TcpConnection};

/// Secure TCP client: verifies the server key through the CA certificate and
/// sends chained-RSA encrypted messages typed at the prompt.
#[derive(Parser, Debug)]
#[command(name = "secure_client", author, version, about, long_about = None)]
struct Cli {
    /// Server host name or address
    #[arg(default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

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
    println!("\n==================== <<< SECURE TCP CLIENT >>> ====================\n");

    let conn = TcpConnection::connect((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("could not connect to {}:{}", cli.host, cli.port))?;
    info!("Connected to <<<SERVER>>> at {}:{}", cli.host, cli.port);

    let mut rng = OsRng;
    let mut session = ClientSession::establish(conn, &mut rng, &KeyGenConfig::default())
        .await
        .context("handshake with the server failed")?;

    println!("You may now send encrypted messages to the <<<SERVER>>>. Type '.' to quit.\n");

    loop {
        // inquire blocks on the terminal, keep it off the runtime workers
        let input = tokio::task::spawn_blocking(|| Text::new("Type here:").prompt())
            .await
            .context("prompt task failed")?;
        let input = match input {
            Ok(line) => line,
            Err(e) => {
                warn!("Input closed: {}", e);
                break;
            }
        };
        if is_end_of_session(&input) {
            break;
        }
        session.send(&input).await.context("sending the message failed")?;
    }

    println!("<<<CLIENT>>> is shutting down...");
    session.close().await.context("closing the connection failed")?;
    Ok(())
}
