mod repl;

use anyhow::Context;
use clap::Parser;
use scribe_engine::config::{ConfigLoader, ScribeConfig};
use scribe_engine::delivery::Delivery;
use scribe_engine::recovery::FileStateStore;
use scribe_engine::session::Recorder;
use scribe_r::backend::RemoteBackend;
use scribe_r::server::{RemoteServer, resync_on_connect, serve_commands};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scribe", version, about = "Record browser interactions into step-by-step manuals")]
struct Args {
    /// Config file (default: ./scribe.yaml, then ~/.scribe/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// WebSocket port the browser extension connects to
    #[arg(long)]
    port: Option<u16>,

    /// Default delivery destination for finished sessions
    #[arg(long)]
    webhook: Option<String>,

    /// Session state file used for restart recovery
    #[arg(long)]
    state: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut ScribeConfig) {
        if let Some(port) = self.port {
            config.remote.port = port;
        }
        if let Some(webhook) = &self.webhook {
            config.delivery.default_destination = webhook.clone();
        }
        if let Some(state) = &self.state {
            config.state.path = Some(state.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout belongs to the REPL.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };
    args.apply(&mut config);

    let (handle, commands) = RemoteServer::new(config.remote.port)
        .start()
        .await
        .context("starting remote server")?;
    println!(
        "Please connect the browser extension to ws://{}",
        handle.local_addr
    );

    let connections = handle.subscribe_connections();
    let backend = Arc::new(RemoteBackend::new(
        handle,
        Duration::from_millis(config.remote.call_timeout_ms),
    ));
    let store = Arc::new(FileStateStore::new(config.state.resolved_path()));
    let delivery = Delivery::new(config.delivery.default_destination.clone());
    info!(destination = %delivery.default_destination(), "Delivery configured");

    let recorder = Recorder::restore(config.recorder.clone(), backend, store, delivery).await;
    tokio::spawn(serve_commands(recorder.clone(), commands));
    tokio::spawn(resync_on_connect(recorder.clone(), connections));

    repl::run(&recorder).await?;
    Ok(())
}
