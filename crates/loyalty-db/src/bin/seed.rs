//! # Seed Data Generator
//!
//! Populates the database with demo loyalty accounts, one per tier.
//!
//! ## Usage
//! ```bash
//! cargo run -p loyalty-db --bin seed
//!
//! # Specify database path
//! cargo run -p loyalty-db --bin seed -- --db ./data/loyalty.db
//! ```
//!
//! Each account gets the spend of its tier's threshold, the tier's
//! percentage and, above tier 0, a generated discount code.

use chrono::Utc;
use loyalty_core::discount_code::DiscountCodeGenerator;
use loyalty_core::{tier_for, Money};
use loyalty_db::{Database, DbConfig, LoyaltyRepository};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (user id, total spent)
const DEMO_ACCOUNTS: &[(&str, i64)] = &[
    ("demo-tier0", 50_000),
    ("demo-tier1", 100_000),
    ("demo-tier2", 600_000),
    ("demo-tier3", 1_200_000),
    ("demo-tier4", 3_600_000),
    ("demo-tier5", 5_000_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = "./loyalty_dev.db".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Loyalty Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./loyalty_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %db_path, "Seeding loyalty database");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let mut conn = db.acquire().await?;

    let existing = LoyaltyRepository::count(&mut conn).await?;
    if existing > 0 {
        warn!(existing, "Database already has loyalty accounts, skipping seed");
        return Ok(());
    }

    let mut generator = DiscountCodeGenerator::new();

    for (user_id, spent) in DEMO_ACCOUNTS {
        let mut account = LoyaltyRepository::get_or_create(&mut conn, user_id, Utc::now()).await?;
        let tier = tier_for(Money::from_units(*spent));

        account.total_spent = *spent;
        account.tier = tier.level() as i64;
        account.discount_percent = tier.discount_percent() as i64;
        account.updated_at = Utc::now();

        if tier.level() > 0 {
            for candidate in generator.candidates() {
                if !LoyaltyRepository::code_exists(&mut conn, &candidate).await? {
                    account.active_code = Some(candidate);
                    break;
                }
            }
        }

        LoyaltyRepository::update(&mut conn, &account).await?;

        info!(
            user_id = %user_id,
            tier = account.tier,
            discount_percent = account.discount_percent,
            code = ?account.active_code,
            "Seeded account"
        );
    }

    info!(count = DEMO_ACCOUNTS.len(), "Seed complete");
    Ok(())
}
