//! # Position CLI
//!
//! Operator tool over the position cache and the pure distribution/price models.
//! None of the subcommands need a chain client.
//!
//! ```bash
//! cargo run --bin position_cli -- init-db
//! cargo run --bin position_cli -- positions <WALLET>
//! cargo run --bin position_cli -- distribution --strategy curve --lower 990 --upper 1010 --active 1000 --total 100
//! cargo run --bin position_cli -- prices --wallet <WALLET> --pool <POOL> --position <POSITION> --active-bin 1000 --bin-step-bps 25
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dlmm_position_sdk::{
    bin_price::{spot_price_from_reserves, PositionPriceProfile},
    database,
    distribution::{compute_distribution, BinRange, Strategy},
    settings::Settings,
    store::{PgPositionStore, PositionStore},
    types::{conversions::{amount_str_to_f64, string_to_pubkey}, PositionSummary, Pubkey},
};

#[derive(Parser)]
#[command(name = "position_cli")]
#[command(about = "DLMM position cache and distribution tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a settings file (defaults to ./Config.toml)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and tables if missing
    InitDb,

    /// Show cached positions of a wallet
    Positions {
        wallet: String,
        /// Restrict to one pool
        #[arg(long)]
        pool: Option<String>,
    },

    /// Print a per-bin allocation for a strategy
    Distribution {
        #[arg(long, default_value = "spot")]
        strategy: String,
        #[arg(long, allow_hyphen_values = true)]
        lower: i32,
        #[arg(long, allow_hyphen_values = true)]
        upper: i32,
        #[arg(long, allow_hyphen_values = true)]
        active: i32,
        #[arg(long)]
        total: f64,
    },

    /// Price and liquidity per bin of a cached position
    Prices {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        pool: String,
        #[arg(long)]
        position: String,
        #[arg(long, allow_hyphen_values = true)]
        active_bin: i32,
        #[arg(long)]
        bin_step_bps: u16,
        /// Defaults to the spot price from the pool's stored reserves
        #[arg(long)]
        base_price: Option<f64>,
    },
}

fn parse_address(raw: &str) -> Result<Pubkey> {
    string_to_pubkey(raw)
        .with_context(|| format!("invalid address {}", raw))
}

fn print_positions(positions: &[PositionSummary]) {
    for p in positions {
        let status = if p.is_active {
            "active".green()
        } else {
            "inactive".yellow()
        };
        println!(
            "  {} [{}..{}] pool {} base {:.6} quote {:.6} ({})",
            p.position_address.to_string().bold(),
            p.lower_bin_id,
            p.upper_bin_id,
            p.pool_address,
            p.token_base_amount,
            p.token_quote_amount,
            status
        );
    }
}

fn init_logging(settings: &Settings) -> Result<()> {
    #[cfg(feature = "observability")]
    if settings.log.format == dlmm_position_sdk::settings::LogFormat::Json {
        return dlmm_position_sdk::metrics::init_tracing(&settings.log);
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&settings.log.level)).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };
    init_logging(&settings)?;

    match cli.command {
        Commands::InitDb => {
            // connect() applies the schema
            database::connect().await?;
            println!("{}", "✅ Database schema ready".green());
        }

        Commands::Positions { wallet, pool } => {
            let owner = parse_address(&wallet)?;
            let store = PgPositionStore::connect().await?;
            let record = store.get_or_create_wallet(&owner).await?;

            let positions: Vec<PositionSummary> = match pool {
                Some(pool) => {
                    let pool = parse_address(&pool)?;
                    store
                        .positions_by_pool(&owner, &pool)
                        .await?
                        .iter()
                        .map(PositionSummary::from)
                        .collect()
                }
                None => store
                    .find_wallet_positions(record.id)
                    .await?
                    .iter()
                    .map(PositionSummary::from)
                    .collect(),
            };

            match store.last_synced_at(record.id).await? {
                Some(at) => println!("Last synced: {}", at.to_rfc3339()),
                None => println!("{}", "Wallet has never been synchronized".yellow()),
            }
            println!("{} cached positions for {}", positions.len(), owner);
            print_positions(&positions);
        }

        Commands::Distribution {
            strategy,
            lower,
            upper,
            active,
            total,
        } => {
            let strategy: Strategy = strategy.parse()?;
            let range = BinRange::new(lower, upper)?;
            let allocations = compute_distribution(strategy, range, active, total)?;

            println!(
                "{} over [{}, {}], active {}, total {}",
                strategy.to_string().bold(),
                lower,
                upper,
                active,
                total
            );
            for a in &allocations {
                let marker = if a.relative_bin_id == 0 { "*".cyan() } else { " ".normal() };
                println!(
                    "{} bin {:>8} ({:>+4})  x {:>12.6}  y {:>12.6}",
                    marker, a.bin_id, a.relative_bin_id, a.x_amount, a.y_amount
                );
            }
        }

        Commands::Prices {
            wallet,
            pool,
            position,
            active_bin,
            bin_step_bps,
            base_price,
        } => {
            let owner = parse_address(&wallet)?;
            let pool = parse_address(&pool)?;
            let position = parse_address(&position)?;
            let store = PgPositionStore::connect().await?;

            let stored = store
                .positions_by_pool(&owner, &pool)
                .await?
                .into_iter()
                .find(|p| p.row.position_address == position)
                .ok_or_else(|| anyhow!("position {} not cached for wallet {}", position, owner))?;

            let base_price = match base_price {
                Some(price) => price,
                None => {
                    let row = store
                        .find_pool(&pool)
                        .await?
                        .ok_or_else(|| anyhow!("pool {} not found", pool))?;
                    let base = amount_str_to_f64(&row.base_reserve)? / 10f64.powi(i32::from(row.token_base_decimal));
                    let quote = amount_str_to_f64(&row.quote_reserve)? / 10f64.powi(i32::from(row.token_quote_decimal));
                    spot_price_from_reserves(base, quote)
                        .ok_or_else(|| anyhow!("pool {} has no base reserve; pass --base-price", pool))?
                }
            };

            let profile = PositionPriceProfile::build(
                base_price,
                active_bin,
                f64::from(bin_step_bps) / 10_000.0,
                stored.row.lower_bin_id,
                &stored.row.liquidity_shares,
            );

            println!(
                "Position {} [{}..{}]: {} of {} bins hold liquidity (total {:.6})",
                position.to_string().bold(),
                profile.lower_bin_id,
                profile.upper_bin_id,
                profile.non_zero_bins,
                stored.row.liquidity_shares.len(),
                profile.total_liquidity
            );
            for bin in &profile.bins {
                println!("  bin {:>8}  price {:>16.8}  liquidity {:>16.6}", bin.bin_id, bin.price, bin.liquidity);
            }
        }
    }

    Ok(())
}
