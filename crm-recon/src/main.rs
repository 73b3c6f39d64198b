//! crm-recon - legacy CRM reconciliation CLI
//!
//! Each subcommand runs one batch operation and prints its run summary as
//! JSON. A failed operation still prints the summary, then exits nonzero.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_common::config::{Settings, ENV_DATABASE, ENV_LEGACY_DATABASE};
use crm_recon::decode::{DecodedVehicle, NhtsaVpicClient, VinDecodeCache};
use crm_recon::migration::{self, verify::run_verify};
use crm_recon::{import, ReconContext, RunSummary};

/// Command-line arguments for crm-recon
#[derive(Parser, Debug)]
#[command(name = "crm-recon")]
#[command(about = "Reconcile legacy CRM data into the normalized schema")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target database
    #[arg(long, env = ENV_DATABASE, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Legacy database, attached read-only as `legacy`
    #[arg(long, env = ENV_LEGACY_DATABASE, value_name = "FILE")]
    legacy_database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations, or one version
    Migrate {
        /// Apply only this version
        #[arg(long = "version", value_name = "N")]
        target: Option<i32>,
    },
    /// Compare legacy and migrated row counts
    Verify,
    /// Import a customer spreadsheet export (CSV)
    ImportCustomers { path: PathBuf },
    /// Import a calendar export (CSV)
    ImportEvents { path: PathBuf },
    /// Decode a VIN through the cache and update its vehicle
    Decode {
        vin: String,
        #[arg(long)]
        year: Option<i64>,
        #[arg(long)]
        make: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        trim: Option<String>,
    },
    /// Re-normalize stored customer phones
    FixPhones,
}

impl Command {
    fn operation(&self) -> &'static str {
        match self {
            Command::Migrate { .. } => "migrate",
            Command::Verify => "verify",
            Command::ImportCustomers { .. } => "import-customers",
            Command::ImportEvents { .. } => "import-events",
            Command::Decode { .. } => "decode",
            Command::FixPhones => "fix-phones",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = args.database {
        settings.database = path;
    }
    if let Some(path) = args.legacy_database {
        settings.legacy_database = Some(path);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("crm-recon {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", settings.database.display());
    if let Some(legacy) = &settings.legacy_database {
        info!("Legacy database: {}", legacy.display());
    }

    let mut summary = RunSummary::new(args.command.operation());
    let outcome = match ReconContext::open(settings).await {
        Ok(mut ctx) => run(&mut ctx, args.command, &mut summary).await,
        Err(e) => Err(e),
    };

    match &outcome {
        Ok(()) => summary.finish_ok(),
        Err(e) => {
            error!("{} failed: {}", summary.operation, e);
            summary.finish_err(e);
        }
    }
    println!("{}", summary.display_string());

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(ctx: &mut ReconContext, command: Command, summary: &mut RunSummary) -> crm_common::Result<()> {
    match command {
        Command::Migrate { target: Some(v) } => migration::run_migration(ctx, v, summary).await,
        Command::Migrate { target: None } => migration::run_pending(ctx, summary).await,
        Command::Verify => run_verify(ctx, summary).await.map(|_| ()),
        Command::ImportCustomers { path } => import::import_customers(ctx, &path, summary).await,
        Command::ImportEvents { path } => import::import_events(ctx, &path, summary).await,
        Command::FixPhones => import::repair_phones(ctx, summary).await,
        Command::Decode {
            vin,
            year,
            make,
            model,
            trim,
        } => {
            migration::require_version(ctx, 2).await?;
            let client = NhtsaVpicClient::new(&ctx.settings.decode)
                .map_err(|e| crm_common::Error::UpstreamDecode(e.to_string()))?;
            let cache = VinDecodeCache::new(ctx.pool.clone(), Arc::new(client), &ctx.settings.decode);

            let entered = DecodedVehicle { year, make, model, trim };
            let outcome = cache.decode_and_apply(&vin, &entered).await?;

            summary.processed += 1;
            summary.incr(if outcome.cached { "cache_hits" } else { "provider_calls" });
            if let Some(warning) = &outcome.warning {
                summary.warn(warning.clone());
            }
            summary.sample(serde_json::to_value(&outcome)?);
            Ok(())
        }
    }
}
