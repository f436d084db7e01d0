mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nimbus_cloud::{CloudClient, FileStore, ReqwestTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Authenticated sessions and task polling for cloud APIs", long_about = None)]
struct Cli {
    /// Profile from the config file
    #[arg(short, long, env = "NIMBUS_PROFILE", default_value = "default", global = true)]
    profile: String,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Share tokens between processes through the on-disk cache
    #[arg(long, global = true)]
    shared_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a valid token, authenticating if needed
    Token {
        /// Authenticate even if a cached token is still valid
        #[arg(short, long)]
        force: bool,
    },
    /// List the service catalog
    Catalog,
    /// Resolve one endpoint URL
    Endpoint {
        /// Service type (e.g. compute, object-store)
        #[arg(short = 't', long = "type", default_value = "compute")]
        service_type: String,
        /// Service name
        #[arg(short, long)]
        name: Option<String>,
        /// Preferred region
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Send an authenticated request
    Call {
        /// Action path or absolute URL
        path: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request body
        #[arg(short, long)]
        data: Option<String>,
        /// Extra header as `Name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Wait for a provider task to finish
    Wait {
        /// Task href
        task_ref: String,
        /// Give up after this many seconds
        #[arg(long, default_value_t = nimbus_cloud::DEFAULT_TASK_TIMEOUT.as_secs())]
        timeout: u64,
        /// Seconds between polls
        #[arg(long, default_value_t = nimbus_cloud::DEFAULT_POLL_INTERVAL.as_secs())]
        interval: u64,
        /// Status document format (vcloud, json)
        #[arg(long, default_value = "vcloud")]
        format: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "nimbus=debug,nimbus_cloud=debug"
    } else {
        "nimbus=info,nimbus_cloud=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_client(cli: &Cli) -> anyhow::Result<CloudClient> {
    let config_path = nimbus_config::find_config_file()?;
    tracing::debug!("Using config file {}", config_path.display());

    let profiles = nimbus_config::load_profiles(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let mut config = profiles
        .get(&cli.profile)?
        .clone()
        .into_client_config(&cli.profile)?;

    if cli.shared_cache {
        let dir = nimbus_config::cache_dir()?;
        tracing::debug!("Token cache: {}", dir.display());
        config = config.with_store(Arc::new(FileStore::new(dir)));
    }

    let transport = ReqwestTransport::new(Some(Duration::from_secs(60)))
        .context("Failed to initialise the HTTP client")?;
    let client = CloudClient::new(config, Arc::new(transport))?;
    Ok(client)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let client = build_client(&cli)?;

    match cli.command {
        Commands::Token { force } => commands::token::handle(&client, force).await,
        Commands::Catalog => commands::catalog::handle(&client).await,
        Commands::Endpoint {
            service_type,
            name,
            region,
        } => commands::endpoint::handle(&client, &service_type, name, region).await,
        Commands::Call {
            path,
            method,
            data,
            headers,
        } => commands::call::handle(&client, &path, &method, data, &headers).await,
        Commands::Wait {
            task_ref,
            timeout,
            interval,
            format,
        } => {
            commands::wait::handle(
                &client,
                &task_ref,
                Duration::from_secs(timeout),
                Duration::from_secs(interval),
                &format,
            )
            .await
        }
    }
}
