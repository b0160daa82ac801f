//! instagpu CLI - find the best spot GPU instances for the money.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use instagpu::database::{Database, Filter};
use instagpu::providers::aws::{Aws, Credentials};
use instagpu::providers::Provider;

/// instagpu CLI - Rank spot GPU instances by throughput per dollar.
#[derive(Parser)]
#[command(name = "instagpu")]
#[command(about = "Find spot GPU instances with the best price/performance")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a ranked list of candidate instances.
    Show(ShowArgs),

    /// Print the version.
    Version,
}

#[derive(Args)]
struct ShowArgs {
    /// Reuse the database snapshot instead of gathering fresh data.
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    cache: bool,

    /// Path to the database snapshot.
    #[arg(long, default_value = "database.json")]
    database_path: PathBuf,

    /// Maximum number of results.
    #[arg(long, default_value = "10")]
    filter_max_results: u16,

    /// Timeout in seconds for gathering.
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(flatten)]
    aws: AwsArgs,

    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Args)]
struct AwsArgs {
    /// Enable AWS.
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    provider_aws: bool,

    /// AWS access key ID (or set `AWS_ACCESS_KEY_ID` env var).
    #[arg(long, env = "AWS_ACCESS_KEY_ID", default_value = "", hide_env_values = true)]
    aws_access_key_id: String,

    /// AWS secret access key (or set `AWS_SECRET_ACCESS_KEY` env var).
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", default_value = "", hide_env_values = true)]
    aws_secret_access_key: String,

    /// AWS session token for temporary credentials.
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    aws_session_token: Option<String>,

    /// Region used to list all other regions.
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    aws_region: String,
}

#[derive(Args)]
struct FilterArgs {
    /// Filters by GPU vendor name.
    #[arg(long)]
    filter_gpu_vendor: Option<String>,

    /// Filters by minimum GPU TFLOPS.
    #[arg(long)]
    filter_gpu_min_tflops: Option<f64>,

    /// Filters by minimum GPU memory in GiB.
    #[arg(long)]
    filter_instance_min_vram: Option<u64>,

    /// Filters by minimum instance memory in GiB.
    #[arg(long)]
    filter_instance_min_ram: Option<u64>,

    /// Filters by maximum average instance price in USD/h.
    #[arg(long)]
    filter_instance_max_price: Option<f64>,

    /// Filters by maximum average region latency in milliseconds.
    #[arg(long)]
    filter_region_max_latency: Option<u64>,
}

impl FilterArgs {
    fn filters(&self) -> Vec<Filter> {
        let filters: Vec<(&str, Option<Filter>)> = vec![
            (
                "filter-gpu-vendor",
                self.filter_gpu_vendor.clone().map(Filter::GpuVendor),
            ),
            (
                "filter-gpu-min-tflops",
                self.filter_gpu_min_tflops.map(Filter::MinGpuTflops),
            ),
            (
                "filter-instance-min-vram",
                self.filter_instance_min_vram.map(Filter::MinGpuMemory),
            ),
            (
                "filter-instance-min-ram",
                self.filter_instance_min_ram.map(Filter::MinInstanceMemory),
            ),
            (
                "filter-instance-max-price",
                self.filter_instance_max_price.map(Filter::MaxPrice),
            ),
            (
                "filter-region-max-latency",
                self.filter_region_max_latency.map(Filter::MaxRegionLatency),
            ),
        ];

        filters
            .into_iter()
            .filter_map(|(name, filter)| {
                let filter = filter?;
                debug!(name = %name, filter = ?filter, "Filter active");
                Some(filter)
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Show(args) => show(args).await,
        Commands::Version => {
            println!("{} ({})", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn show(args: ShowArgs) -> Result<()> {
    let filters = args.filters.filters();

    let cached = if args.cache {
        match Database::load(&args.database_path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(error = %e, "Cache miss, gathering fresh data");
                None
            }
        }
    } else {
        None
    };

    let db = match cached {
        Some(db) => db,
        None => {
            let db = gather(&args).await?;
            db.save(&args.database_path)
                .context("Failed to save database snapshot")?;
            db
        }
    };

    let results = db.filter(usize::from(args.filter_max_results), &filters);
    info!(results = results.len(), records = db.len(), "Ranked instances");

    for result in results {
        println!("{result}");
    }

    Ok(())
}

async fn gather(args: &ShowArgs) -> Result<Database> {
    let providers = providers(&args.aws)?;

    let cancel = CancellationToken::new();
    let timeout = Duration::from_secs(args.timeout);

    match tokio::time::timeout(timeout, Database::gather(&providers, &cancel)).await {
        Ok(db) => db.context("Failed to initialize database"),
        Err(_) => {
            cancel.cancel();
            anyhow::bail!("Gathering timed out after {} seconds", args.timeout)
        }
    }
}

fn providers(aws: &AwsArgs) -> Result<Vec<Arc<dyn Provider>>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    if aws.provider_aws {
        let access_key_id = aws.aws_access_key_id.trim();
        let secret_access_key = aws.aws_secret_access_key.trim();
        if access_key_id.is_empty() || secret_access_key.is_empty() {
            anyhow::bail!(
                "AWS credentials are missing. Provide --aws-access-key-id/--aws-secret-access-key \
                 or set AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY."
            );
        }

        let mut credentials = Credentials::new(access_key_id, secret_access_key);
        if let Some(token) = aws.aws_session_token.as_deref().filter(|t| !t.is_empty()) {
            credentials = credentials.with_session_token(token);
        }

        info!(region = %aws.aws_region, "Configuring AWS provider");
        let provider =
            Aws::new(credentials, &aws.aws_region).context("Failed to create AWS provider")?;
        providers.push(Arc::new(provider));
    }

    if providers.is_empty() {
        anyhow::bail!("No providers selected");
    }

    Ok(providers)
}
