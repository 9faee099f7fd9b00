use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod api;
mod config;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "stepwise")]
#[command(about = "Sequential LLM workflow engine with validated steps and retries", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "stepwise.toml")]
    config: PathBuf,

    /// Data directory for storage
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// API key for the LLM service; overrides the config file
    #[arg(long, env = "STEPWISE_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepwise=info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting Stepwise workflow engine");
    tracing::info!("Data directory: {}", args.data_dir.display());

    let mut config = ServerConfig::load(&args.config, args.data_dir)?;
    if let Some(api_key) = args.llm_api_key {
        config.llm.api_key = Some(api_key);
    }
    tracing::debug!(llm = ?config.llm, engine = ?config.engine, "Loaded configuration");

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr, config).await?;

    Ok(())
}
