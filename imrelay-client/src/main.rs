use anyhow::Result;
use clap::Parser;
use imrelay_client::{MemoryStore, SqliteStore};
use imrelay_protocol::RELAY_PORT;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod app;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay host to connect to
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Relay port
    #[arg(short, long, default_value_t = RELAY_PORT)]
    port: u16,

    /// Log in with this name as soon as the connection is up
    #[arg(short, long)]
    name: Option<String>,

    /// Directory for the per-user chat history databases
    #[arg(long, default_value = ".")]
    history_dir: PathBuf,

    /// Keep chat history in memory only
    #[arg(long)]
    no_history: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logs go to stderr so they stay out of the chat transcript
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.no_history {
        app::run(MemoryStore::new(), args.host, args.port, args.name).await
    } else {
        let store = SqliteStore::new(args.history_dir);
        app::run(store, args.host, args.port, args.name).await
    }
}
