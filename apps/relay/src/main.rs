//! # ShopLink Relay CLI
//!
//! Operator entry point. Runs one relay operation against the configured
//! store and prints the JSON response on stdout. Logs go to stderr.
//!
//! ```text
//! shoplink-relay --shop S1 push-sale sale.json
//! shoplink-relay --shop S1 pull products --since 1710000000000
//! shoplink-relay --shop S1 pay --phone 0803 --amount 5000
//! shoplink-relay merge --from OLD --into S1
//! ```
//!
//! A failed operation prints the error body and exits non-zero.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Map, Value};
use shoplink_core::{PullKind, Role};
use shoplink_relay::dto::{MergeRequest, PullRequest};
use shoplink_relay::{
    AppState, AuthContext, DebtorService, RelayConfig, RelayError, RelayResult, ShopService,
    SyncService,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// ShopLink relay operations.
#[derive(Parser)]
#[command(name = "shoplink-relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ./shoplink.toml when present)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Shop id the caller authenticated as
    #[arg(global = true, short, long, default_value = "")]
    shop: String,

    #[arg(global = true, long, value_enum, default_value = "owner")]
    role: CliRole,

    /// Recorded as the actor of debtor payments
    #[arg(global = true, long)]
    device_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliRole {
    Owner,
    Device,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Owner => Role::Owner,
            CliRole::Device => Role::Device,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show where the shop id resolves to
    Resolve,

    /// Rows changed since a server time
    Pull {
        /// products, staffs, sales, debtors or debtor-payments
        collection: String,

        #[arg(long, default_value = "0")]
        since: i64,
    },

    /// Push `{items: [...]}` products from a file, `-` for stdin
    PushProducts { file: PathBuf },

    /// Push `{items: [...]}` staffs from a file, `-` for stdin
    PushStaffs { file: PathBuf },

    /// Push one sale from a file, `-` for stdin
    PushSale { file: PathBuf },

    /// Record a debtor payment
    Pay {
        #[arg(long)]
        receipt: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        amount: f64,

        #[arg(long)]
        method: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Fill debtor details from a device's debtor list
    BackfillDebtors { file: PathBuf },

    /// Show the shop profile, or patch it from a file
    Profile {
        #[arg(long)]
        set: Option<PathBuf>,
    },

    /// Merge one shop into another
    Merge {
        #[arg(long)]
        from: String,

        #[arg(long)]
        into: String,
    },

    /// Store health and collection sizes
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = RelayConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        backend = %config.store.backend,
        path = %config.store.path.display(),
        "Configuration loaded"
    );

    let state = Arc::new(AppState::from_config(config).await.context("Failed to open store")?);

    let auth = AuthContext {
        shop_id: cli.shop.clone(),
        role: cli.role.into(),
        device_id: cli.device_id.clone(),
    };

    match run(state, &auth, cli.command).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.to_body())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(state: Arc<AppState>, auth: &AuthContext, command: Commands) -> RelayResult<Value> {
    let sync = SyncService::new(state.clone());
    let debtors = DebtorService::new(state.clone());
    let shops = ShopService::new(state);

    match command {
        Commands::Resolve => to_json(shops.resolve(auth).await?),
        Commands::Pull { collection, since } => {
            let kind: PullKind = collection.parse()?;
            to_json(sync.pull(auth, kind, PullRequest { since }).await?)
        }
        Commands::PushProducts { file } => to_json(sync.push_products(auth, &read_body(&file)?).await?),
        Commands::PushStaffs { file } => to_json(sync.push_staffs(auth, &read_body(&file)?).await?),
        Commands::PushSale { file } => to_json(sync.push_sale(auth, &read_body(&file)?).await?),
        Commands::Pay {
            receipt,
            phone,
            amount,
            method,
            note,
        } => {
            let body = json!({
                "receiptNo": receipt.unwrap_or_default(),
                "phone": phone.unwrap_or_default(),
                "amount": amount,
                "method": method.unwrap_or_default(),
                "note": note.unwrap_or_default(),
            });
            to_json(debtors.pay(auth, &body).await?)
        }
        Commands::BackfillDebtors { file } => to_json(debtors.backfill(auth, &read_body(&file)?).await?),
        Commands::Profile { set: None } => to_json(shops.get_profile(auth).await?),
        Commands::Profile { set: Some(file) } => {
            to_json(shops.update_profile(auth, &read_body(&file)?).await?)
        }
        Commands::Merge { from, into } => to_json(shops.merge(&MergeRequest { from, into }).await?),
        Commands::Check => to_json(shops.check().await?),
    }
}

fn to_json<T: Serialize>(response: T) -> RelayResult<Value> {
    Ok(serde_json::to_value(response)?)
}

/// JSON request body from a file, or stdin for `-`.
fn read_body(path: &Path) -> RelayResult<Value> {
    let mut raw = String::new();
    let read = if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut raw).map(|_| ())
    } else {
        std::fs::read_to_string(path).map(|text| raw = text)
    };
    read.map_err(|e| RelayError::invalid(format!("Cannot read {}: {e}", path.display())))?;

    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(&raw).map_err(|e| RelayError::invalid(format!("Invalid JSON in {}: {e}", path.display())))
}
