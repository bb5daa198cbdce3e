//! configure: local web UI for claude-speak voice and pause settings.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use claude_speak::config::Config;
use claude_speak::scope::SettingsStore;
use claude_speak::server::{serve, ServerState};

#[derive(Parser, Debug)]
#[command(name = "configure", about = "Settings server for claude-speak")]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info")
    } else {
        EnvFilter::new("info,hyper=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(args.config.as_deref());
    let store = SettingsStore::default_location().ok_or("could not determine home directory")?;
    let state = ServerState::new(store)?;

    serve(state, args.port.unwrap_or(config.server.port)).await
}
