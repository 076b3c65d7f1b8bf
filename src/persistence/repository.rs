//! Database Repository
//!
//! SQLite implementation of the [`LedgerStore`] port.

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::{debug, error};

use super::models::{ChallengeRecord, TradeRecord};
use super::DbPool;
use crate::domain::entities::challenge::{Challenge, ChallengeStatus};
use crate::domain::entities::trade::Trade;
use crate::domain::errors::StoreError;
use crate::domain::repositories::ledger_store::{LedgerStore, StoreResult};

const CHALLENGE_COLUMNS: &str = "id, owner_id, display_name, plan_type, starting_balance, \
    current_balance, equity, daily_start_balance, daily_pnl, total_pnl, daily_pnl_pct, \
    total_pnl_pct, max_daily_loss_pct, max_total_loss_pct, profit_target_pct, status, \
    failure_reason, total_trades, winning_trades, last_trade_date, daily_reset_at, created_at, updated_at";

const TRADE_COLUMNS: &str = "id, challenge_id, symbol, side, quantity, entry_price, exit_price, \
    pnl, pnl_pct, status, open_time, close_time";

const UPDATE_CHALLENGE: &str = r#"
    UPDATE challenges
    SET display_name = ?1, current_balance = ?2, equity = ?3, daily_start_balance = ?4,
        daily_pnl = ?5, total_pnl = ?6, daily_pnl_pct = ?7, total_pnl_pct = ?8,
        status = ?9, failure_reason = ?10, total_trades = ?11, winning_trades = ?12,
        last_trade_date = ?13, daily_reset_at = ?14, updated_at = ?15
    WHERE id = ?16
"#;

fn backend(context: &str, e: sqlx::Error) -> StoreError {
    error!("{}: {}", context, e);
    StoreError::Backend(format!("{}: {}", context, e))
}

/// Write the mutable challenge columns; with `require_active` the row must
/// still be active for the update to apply. Returns the affected row count.
async fn write_challenge(
    conn: &mut SqliteConnection,
    challenge: &Challenge,
    require_active: bool,
) -> Result<u64, sqlx::Error> {
    let sql = if require_active {
        format!("{} AND status = 'active'", UPDATE_CHALLENGE)
    } else {
        UPDATE_CHALLENGE.to_string()
    };

    let result = sqlx::query(&sql)
        .bind(&challenge.display_name)
        .bind(challenge.current_balance)
        .bind(challenge.equity)
        .bind(challenge.daily_start_balance)
        .bind(challenge.daily_pnl)
        .bind(challenge.total_pnl)
        .bind(challenge.daily_pnl_pct)
        .bind(challenge.total_pnl_pct)
        .bind(challenge.status.as_str())
        .bind(&challenge.failure_reason)
        .bind(challenge.total_trades)
        .bind(challenge.winning_trades)
        .bind(challenge.last_trade_date)
        .bind(challenge.daily_reset_at)
        .bind(challenge.updated_at)
        .bind(&challenge.id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Challenge and trade storage backed by SQLite
pub struct SqliteLedgerStore {
    pool: DbPool,
}

impl SqliteLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_challenges(
        &self,
        filter: &str,
        value: Option<&str>,
    ) -> StoreResult<Vec<Challenge>> {
        let sql = format!(
            "SELECT {} FROM challenges {} ORDER BY created_at DESC, id",
            CHALLENGE_COLUMNS, filter
        );
        let mut query = sqlx::query_as::<_, ChallengeRecord>(&sql);
        if let Some(value) = value {
            query = query.bind(value);
        }

        let records = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("Failed to list challenges", e))?;

        records.into_iter().map(Challenge::try_from).collect()
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn insert_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO challenges ({}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            CHALLENGE_COLUMNS
        );

        sqlx::query(&sql)
            .bind(&challenge.id)
            .bind(&challenge.owner_id)
            .bind(&challenge.display_name)
            .bind(challenge.plan_type.as_str())
            .bind(challenge.starting_balance)
            .bind(challenge.current_balance)
            .bind(challenge.equity)
            .bind(challenge.daily_start_balance)
            .bind(challenge.daily_pnl)
            .bind(challenge.total_pnl)
            .bind(challenge.daily_pnl_pct)
            .bind(challenge.total_pnl_pct)
            .bind(challenge.max_daily_loss_pct)
            .bind(challenge.max_total_loss_pct)
            .bind(challenge.profit_target_pct)
            .bind(challenge.status.as_str())
            .bind(&challenge.failure_reason)
            .bind(challenge.total_trades)
            .bind(challenge.winning_trades)
            .bind(challenge.last_trade_date)
            .bind(challenge.daily_reset_at)
            .bind(challenge.created_at)
            .bind(challenge.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("Failed to create challenge", e))?;

        debug!("Created challenge: {} ({})", challenge.id, challenge.plan_type);
        Ok(())
    }

    async fn get_challenge(&self, id: &str) -> StoreResult<Option<Challenge>> {
        let sql = format!("SELECT {} FROM challenges WHERE id = ?1", CHALLENGE_COLUMNS);
        let record = sqlx::query_as::<_, ChallengeRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend("Failed to get challenge", e))?;

        record.map(Challenge::try_from).transpose()
    }

    async fn list_challenges_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Challenge>> {
        self.fetch_challenges("WHERE owner_id = ?1", Some(owner_id))
            .await
    }

    async fn list_challenges(&self, status: Option<ChallengeStatus>) -> StoreResult<Vec<Challenge>> {
        match status {
            Some(status) => {
                self.fetch_challenges("WHERE status = ?1", Some(status.as_str()))
                    .await
            }
            None => self.fetch_challenges("", None).await,
        }
    }

    async fn update_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| backend("Failed to acquire connection", e))?;

        let rows_affected = write_challenge(&mut conn, challenge, false)
            .await
            .map_err(|e| backend("Failed to update challenge", e))?;

        if rows_affected == 0 {
            return Err(StoreError::Conflict(format!(
                "Challenge not found: {}",
                challenge.id
            )));
        }

        debug!("Updated challenge: {}", challenge.id);
        Ok(())
    }

    async fn delete_challenge(&self, id: &str) -> StoreResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM challenges WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("Failed to delete challenge", e))?
            .rows_affected();

        debug!("Deleted challenge {} ({} row)", id, rows_affected);
        Ok(rows_affected > 0)
    }

    async fn get_trade(&self, id: &str) -> StoreResult<Option<Trade>> {
        let sql = format!("SELECT {} FROM trades WHERE id = ?1", TRADE_COLUMNS);
        let record = sqlx::query_as::<_, TradeRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend("Failed to get trade", e))?;

        record.map(Trade::try_from).transpose()
    }

    async fn list_trades(&self, challenge_id: &str) -> StoreResult<Vec<Trade>> {
        let sql = format!(
            "SELECT {} FROM trades WHERE challenge_id = ?1 ORDER BY open_time DESC, id",
            TRADE_COLUMNS
        );
        let records = sqlx::query_as::<_, TradeRecord>(&sql)
            .bind(challenge_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("Failed to list trades", e))?;

        records.into_iter().map(Trade::try_from).collect()
    }

    async fn record_opened(&self, challenge: &Challenge, trade: &Trade) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;

        let rows = write_challenge(&mut tx, challenge, true)
            .await
            .map_err(|e| backend("Failed to update challenge", e))?;
        if rows == 0 {
            return Err(StoreError::Conflict(format!(
                "Challenge {} is no longer active",
                challenge.id
            )));
        }

        let sql = format!(
            "INSERT INTO trades ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            TRADE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&trade.id)
            .bind(&trade.challenge_id)
            .bind(&trade.symbol)
            .bind(trade.side.as_str())
            .bind(trade.quantity)
            .bind(trade.entry_price)
            .bind(trade.exit_price)
            .bind(trade.pnl)
            .bind(trade.pnl_pct)
            .bind(trade.status.as_str())
            .bind(trade.open_time)
            .bind(trade.close_time)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("Failed to create trade", e))?;

        tx.commit()
            .await
            .map_err(|e| backend("Failed to commit trade open", e))?;

        debug!("Created trade: {} for {}", trade.id, trade.symbol);
        Ok(())
    }

    async fn record_settlement(&self, challenge: &Challenge, trade: &Trade) -> StoreResult<()> {
        // Dropping `tx` without commit rolls back both writes.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;

        let trade_rows = sqlx::query(
            r#"
            UPDATE trades
            SET exit_price = ?1, pnl = ?2, pnl_pct = ?3, status = ?4, close_time = ?5
            WHERE id = ?6 AND status = 'open'
            "#,
        )
        .bind(trade.exit_price)
        .bind(trade.pnl)
        .bind(trade.pnl_pct)
        .bind(trade.status.as_str())
        .bind(trade.close_time)
        .bind(&trade.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| backend("Failed to close trade", e))?
        .rows_affected();

        if trade_rows == 0 {
            return Err(StoreError::Conflict(format!(
                "Trade {} is not open",
                trade.id
            )));
        }

        let challenge_rows = write_challenge(&mut tx, challenge, true)
            .await
            .map_err(|e| backend("Failed to settle challenge", e))?;

        if challenge_rows == 0 {
            return Err(StoreError::Conflict(format!(
                "Challenge {} is no longer active",
                challenge.id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| backend("Failed to commit settlement", e))?;

        debug!("Settled trade {} on challenge {}", trade.id, challenge.id);
        Ok(())
    }
}
