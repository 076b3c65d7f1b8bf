//! Persistence Layer
//!
//! SQLite storage for challenges and trades through async sqlx, plus an
//! in-memory test double with the same semantics.
//!
//! # Database Schema
//!
//! ## Challenges Table
//! - id: UUID string
//! - owner_id: owning user id
//! - display_name: optional leaderboard name
//! - plan_type: "starter", "pro" or "elite"
//! - starting_balance, current_balance, equity, daily_start_balance: REAL
//! - daily_pnl, total_pnl, daily_pnl_pct, total_pnl_pct: REAL
//! - max_daily_loss_pct, max_total_loss_pct, profit_target_pct: REAL
//! - status: "active", "passed" or "failed"
//! - failure_reason: set iff failed
//! - total_trades, winning_trades: INTEGER
//! - last_trade_date, daily_reset_at, created_at, updated_at: timestamps
//!
//! ## Trades Table
//! - id: UUID string
//! - challenge_id: foreign key to challenges, cascading on delete
//! - symbol, side ("buy"/"sell"), quantity, entry_price
//! - exit_price, pnl, pnl_pct: set at close
//! - status: "open" or "closed"
//! - open_time, close_time

pub mod memory;
pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Initialize the database connection pool and run migrations.
///
/// # Arguments
/// - `database_url`: SQLite URL (e.g., "sqlite://data/tradesense.db" or "sqlite::memory:")
/// - `max_connections`: pool size; forced to 1 for in-memory databases, where
///   every connection would otherwise see its own empty database
pub async fn init_database(database_url: &str, max_connections: u32) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if is_memory_url(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?
    };

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS challenges (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            display_name TEXT,
            plan_type TEXT NOT NULL CHECK(plan_type IN ('starter', 'pro', 'elite')),
            starting_balance REAL NOT NULL,
            current_balance REAL NOT NULL,
            equity REAL NOT NULL,
            daily_start_balance REAL NOT NULL,
            daily_pnl REAL NOT NULL DEFAULT 0,
            total_pnl REAL NOT NULL DEFAULT 0,
            daily_pnl_pct REAL NOT NULL DEFAULT 0,
            total_pnl_pct REAL NOT NULL DEFAULT 0,
            max_daily_loss_pct REAL NOT NULL DEFAULT 5,
            max_total_loss_pct REAL NOT NULL DEFAULT 10,
            profit_target_pct REAL NOT NULL DEFAULT 10,
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'passed', 'failed')),
            failure_reason TEXT,
            total_trades INTEGER NOT NULL DEFAULT 0,
            winning_trades INTEGER NOT NULL DEFAULT 0,
            last_trade_date DATETIME,
            daily_reset_at DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create challenges table: {}", e))
    })?;

    // Databases created before daily resets were tracked
    let (reset_columns,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM pragma_table_info('challenges') WHERE name = 'daily_reset_at'",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to inspect challenges table: {}", e)))?;

    if reset_columns == 0 {
        sqlx::query("ALTER TABLE challenges ADD COLUMN daily_reset_at DATETIME")
            .execute(pool)
            .await
            .map_err(|e| {
                DatabaseError::MigrationError(format!("Failed to add daily_reset_at: {}", e))
            })?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id TEXT PRIMARY KEY,
            challenge_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('buy', 'sell')),
            quantity REAL NOT NULL,
            entry_price REAL NOT NULL,
            exit_price REAL,
            pnl REAL,
            pnl_pct REAL,
            status TEXT NOT NULL DEFAULT 'open' CHECK(status IN ('open', 'closed')),
            open_time DATETIME NOT NULL,
            close_time DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (challenge_id) REFERENCES challenges(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_challenges_owner ON challenges(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_challenges_status ON challenges(status)",
        "CREATE INDEX IF NOT EXISTS idx_trades_challenge ON trades(challenge_id)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/tradesense.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/tradesense.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/tradesense.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n: &u32| n > 0)
            .unwrap_or(5);

        Self {
            url,
            max_connections,
        }
    }
}
