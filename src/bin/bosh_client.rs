//! bosh-client - minimal interactive BOSH session driver
//!
//! Connects, sends whatever is piped in on stdin as message stanzas, and
//! logs connection/response events to tracing. Useful for exercising a
//! connection manager by hand; not a full XMPP client.

use anyhow::Result;
use bosh_core::session::Session;
use bosh_core::transport::{ReqwestHttpSender, SharedHttpSender};
use bosh_core::{Body, Config, ConnectionEvent};
use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bosh-client", about = "Minimal BOSH session driver")]
struct Cli {
    /// Path to a YAML config file; falls back to BOSH_* env vars if absent.
    #[arg(long, default_value = "config/config.yaml")]
    config: String,

    /// Override the connection manager endpoint.
    #[arg(long)]
    uri: Option<String>,

    /// Override the target domain.
    #[arg(long)]
    to: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(uri) = cli.uri {
        config.uri = uri;
    }
    if let Some(to) = cli.to {
        config.to = to;
    }
    config.validate()?;

    tracing::info!(uri = %config.uri, to = %config.to, "starting BOSH session");

    let sender: SharedHttpSender = Arc::new(ReqwestHttpSender::new(
        config.endpoint()?,
        Duration::from_secs(config.wait_seconds + 10),
    )?);
    let session = Session::new(&config, sender)?;

    session.add_connection_listener(|event| match event {
        ConnectionEvent::Established => tracing::info!("session established"),
        ConnectionEvent::Closed { cause, pending_request_acks } => {
            match cause {
                Some(cause) => tracing::warn!(%cause, pending = pending_request_acks.len(), "session closed"),
                None => tracing::info!("session closed"),
            }
        }
    });
    session.add_response_received_listener(|body| {
        tracing::debug!(payload = body.payload(), "response received");
    });

    session.send(Body::builder().build()).await?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = session.send(Body::builder().payload(line).build()).await {
            tracing::error!(%err, "send failed");
            break;
        }
    }

    session.disconnect(None).await.ok();
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bosh_core=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
