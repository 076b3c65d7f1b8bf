//! Database Models
//!
//! Row structs for the challenges and trades tables and their conversion to
//! domain entities. Enum columns are stored as lowercase strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::entities::challenge::Challenge;
use crate::domain::entities::trade::Trade;
use crate::domain::errors::StoreError;

/// Challenge record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChallengeRecord {
    pub id: String,
    pub owner_id: String,
    pub display_name: Option<String>,
    pub plan_type: String, // "starter", "pro" or "elite"
    pub starting_balance: f64,
    pub current_balance: f64,
    pub equity: f64,
    pub daily_start_balance: f64,
    pub daily_pnl: f64,
    pub total_pnl: f64,
    pub daily_pnl_pct: f64,
    pub total_pnl_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_total_loss_pct: f64,
    pub profit_target_pct: f64,
    pub status: String, // "active", "passed" or "failed"
    pub failure_reason: Option<String>,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub last_trade_date: Option<DateTime<Utc>>,
    pub daily_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trade record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: String,
    pub challenge_id: String,
    pub symbol: String,
    pub side: String, // "buy" or "sell"
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub status: String, // "open" or "closed"
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}

fn corrupt(table: &str, id: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("Corrupt {} row {}: {}", table, id, detail))
}

impl TryFrom<ChallengeRecord> for Challenge {
    type Error = StoreError;

    fn try_from(record: ChallengeRecord) -> Result<Self, Self::Error> {
        let plan_type = record
            .plan_type
            .parse()
            .map_err(|e| corrupt("challenges", &record.id, e))?;
        let status = record
            .status
            .parse()
            .map_err(|e| corrupt("challenges", &record.id, e))?;

        Ok(Challenge {
            id: record.id,
            owner_id: record.owner_id,
            display_name: record.display_name,
            plan_type,
            starting_balance: record.starting_balance,
            current_balance: record.current_balance,
            equity: record.equity,
            daily_start_balance: record.daily_start_balance,
            daily_pnl: record.daily_pnl,
            total_pnl: record.total_pnl,
            daily_pnl_pct: record.daily_pnl_pct,
            total_pnl_pct: record.total_pnl_pct,
            max_daily_loss_pct: record.max_daily_loss_pct,
            max_total_loss_pct: record.max_total_loss_pct,
            profit_target_pct: record.profit_target_pct,
            status,
            failure_reason: record.failure_reason,
            total_trades: record.total_trades,
            winning_trades: record.winning_trades,
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_trade_date: record.last_trade_date,
            daily_reset_at: record.daily_reset_at,
        })
    }
}

impl TryFrom<TradeRecord> for Trade {
    type Error = StoreError;

    fn try_from(record: TradeRecord) -> Result<Self, Self::Error> {
        let side = record
            .side
            .parse()
            .map_err(|e| corrupt("trades", &record.id, e))?;
        let status = record
            .status
            .parse()
            .map_err(|e| corrupt("trades", &record.id, e))?;

        Ok(Trade {
            id: record.id,
            challenge_id: record.challenge_id,
            symbol: record.symbol,
            side,
            quantity: record.quantity,
            entry_price: record.entry_price,
            exit_price: record.exit_price,
            pnl: record.pnl,
            pnl_pct: record.pnl_pct,
            status,
            open_time: record.open_time,
            close_time: record.close_time,
        })
    }
}
