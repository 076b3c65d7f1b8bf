//! In-memory ledger store
//!
//! Test double for the SQLite store with the same conflict semantics. The
//! server itself always runs on SQLite; use `sqlite::memory:` for a
//! throwaway database.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::entities::challenge::{Challenge, ChallengeStatus};
use crate::domain::entities::trade::Trade;
use crate::domain::errors::StoreError;
use crate::domain::repositories::ledger_store::{LedgerStore, StoreResult};

#[derive(Default)]
struct Tables {
    challenges: HashMap<String, Challenge>,
    trades: HashMap<String, Trade>,
}

impl Tables {
    fn require_active(&self, challenge_id: &str) -> StoreResult<()> {
        match self.challenges.get(challenge_id) {
            Some(stored) if stored.is_active() => Ok(()),
            _ => Err(StoreError::Conflict(format!(
                "Challenge {} is no longer active",
                challenge_id
            ))),
        }
    }
}

/// Ledger store that keeps everything behind a single lock
#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut challenges: Vec<Challenge>) -> Vec<Challenge> {
    challenges.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    challenges
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.challenges.contains_key(&challenge.id) {
            return Err(StoreError::Backend(format!(
                "Duplicate challenge id: {}",
                challenge.id
            )));
        }
        tables
            .challenges
            .insert(challenge.id.clone(), challenge.clone());
        Ok(())
    }

    async fn get_challenge(&self, id: &str) -> StoreResult<Option<Challenge>> {
        Ok(self.tables.read().await.challenges.get(id).cloned())
    }

    async fn list_challenges_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Challenge>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .challenges
                .values()
                .filter(|c| c.owner_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_challenges(&self, status: Option<ChallengeStatus>) -> StoreResult<Vec<Challenge>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .challenges
                .values()
                .filter(|c| status.map_or(true, |s| c.status == s))
                .cloned()
                .collect(),
        ))
    }

    async fn update_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.challenges.get_mut(&challenge.id) {
            Some(stored) => {
                *stored = challenge.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "Challenge not found: {}",
                challenge.id
            ))),
        }
    }

    async fn delete_challenge(&self, id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.challenges.remove(id).is_none() {
            return Ok(false);
        }
        tables.trades.retain(|_, t| t.challenge_id != id);
        Ok(true)
    }

    async fn get_trade(&self, id: &str) -> StoreResult<Option<Trade>> {
        Ok(self.tables.read().await.trades.get(id).cloned())
    }

    async fn list_trades(&self, challenge_id: &str) -> StoreResult<Vec<Trade>> {
        let tables = self.tables.read().await;
        let mut trades: Vec<Trade> = tables
            .trades
            .values()
            .filter(|t| t.challenge_id == challenge_id)
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.open_time.cmp(&a.open_time).then_with(|| a.id.cmp(&b.id)));
        Ok(trades)
    }

    async fn record_opened(&self, challenge: &Challenge, trade: &Trade) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.require_active(&challenge.id)?;
        if tables.trades.contains_key(&trade.id) {
            return Err(StoreError::Backend(format!("Duplicate trade id: {}", trade.id)));
        }

        tables
            .challenges
            .insert(challenge.id.clone(), challenge.clone());
        tables.trades.insert(trade.id.clone(), trade.clone());
        Ok(())
    }

    async fn record_settlement(&self, challenge: &Challenge, trade: &Trade) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.trades.get(&trade.id) {
            Some(stored) if stored.is_open() => {}
            _ => {
                return Err(StoreError::Conflict(format!(
                    "Trade {} is not open",
                    trade.id
                )))
            }
        }
        tables.require_active(&challenge.id)?;

        tables
            .challenges
            .insert(challenge.id.clone(), challenge.clone());
        tables.trades.insert(trade.id.clone(), trade.clone());
        Ok(())
    }
}
