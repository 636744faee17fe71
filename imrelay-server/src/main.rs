/// imrelay chat relay
use anyhow::Result;
use clap::Parser;
use imrelay_server::Relay;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind to this addr
    #[arg(short, long, default_value = "0.0.0.0:9876")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let relay = Relay::bind(&args.addr).await?;
    relay
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "unable to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
