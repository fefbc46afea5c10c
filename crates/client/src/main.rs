//! # ctrack CLI
//!
//! Runs the tracker client against the in-memory ledger and engine.
//!
//! ## Commands
//! - `demo`: connect a session, initialize, sync three seeded assets, create
//!   one, reveal its value and print the resulting snapshot
//! - `config`: print the effective configuration
//!
//! Both commands accept `--config <file>` (TOML). Without it, `CTRACK_*`
//! environment variables and defaults apply.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use ctrack_client::{AssetDraft, TrackerClient};
use ctrack_common::{
    Address, BusinessData, ClientConfig, Handle, MockEngine, MockLedger, SessionState,
};

#[derive(Parser)]
#[command(version, about = "Confidential asset tracker client")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the end-to-end scenario against in-memory backends
    Demo {
        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(p) => ClientConfig::load_from_file(p)
            .with_context(|| format!("loading config from {}", p.display())),
        None => ClientConfig::from_env().context("reading CTRACK_* environment"),
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One in-transit, one delivered and one alert asset.
fn seed(ledger: &MockLedger, engine: &MockEngine, owner: Address, alert_after_secs: u64) {
    let now = now_secs();
    let seeds: [(&str, &str, u64, bool, u64); 3] = [
        ("seed-transit", "Pallet of sensors", now, false, 120),
        ("seed-delivered", "Medical supplies", now, true, 75),
        (
            "seed-alert",
            "Container 7",
            now.saturating_sub(alert_after_secs + 3600),
            false,
            310,
        ),
    ];

    for (i, (id, name, timestamp, is_verified, value)) in seeds.into_iter().enumerate() {
        let handle = Handle::from_bytes([0xA0 + i as u8; 32]);
        engine.inject_value(handle, value);
        ledger.insert_record(
            id,
            BusinessData {
                name: name.to_string(),
                description: format!("seeded asset {}", i + 1),
                encrypted_value: handle,
                public_value1: 48_856_600 + i as i64,
                public_value2: 2_352_200 + i as i64,
                creator: owner,
                timestamp,
                is_verified,
                decrypted_value: if is_verified { value } else { 0 },
            },
        );
    }
}

async fn run_demo(config: ClientConfig, json: bool) -> Result<()> {
    let contract = config
        .contract()?
        .unwrap_or_else(|| Address::from_bytes([0xC7; 20]));
    let owner = Address::from_bytes([0x5E; 20]);

    let ledger = Arc::new(MockLedger::new(contract));
    let engine = Arc::new(MockEngine::new());
    let session = Arc::new(SessionState::new());
    seed(&ledger, &engine, owner, config.alert_after_secs);

    let client = TrackerClient::new(config, ledger.clone(), engine.clone(), session.clone())?;

    session.connect(owner);
    client.on_session_change().await?;
    info!(counters = ?client.counters(), "initial sync");

    client.check_availability().await?;

    let mut draft = AssetDraft {
        name: "Crate-1".to_string(),
        value: "500".to_string(),
        description: "test".to_string(),
        latitude: "12.34".to_string(),
        longitude: "56.78".to_string(),
    };
    let created = client.create_asset(&mut draft).await?;
    info!(business_id = %created.business_id, block = created.block_number, "created");

    let revealed = client.reveal_value(&created.business_id).await?;
    info!(value = revealed.value, source = ?revealed.source, "revealed");

    let snapshot = client.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot.records)?);
    } else {
        println!("contract: {}", client.contract_address());
        for r in &snapshot.records {
            let value = r
                .decrypted_value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "<encrypted>".to_string());
            println!(
                "{:<32} {:<20} {:>10.6} {:>11.6} {:<10} {}",
                r.id,
                r.name,
                r.latitude,
                r.longitude,
                r.status.as_str(),
                value
            );
        }
        let c = client.counters();
        println!(
            "total={} in_transit={} delivered={} alerts={}",
            c.total, c.in_transit, c.delivered, c.alerts
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.cmd {
        Commands::Demo { json } => run_demo(config, json).await?,
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}
