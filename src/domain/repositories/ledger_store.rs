//! Ledger Store Trait
//!
//! Persistence port for challenges and their trades. The ledger service only
//! talks to storage through this trait, so the SQLite store and the
//! in-memory store used in tests are interchangeable.
//!
//! Implementations must apply [`LedgerStore::record_opened`] and
//! [`LedgerStore::record_settlement`] atomically: either the challenge and
//! the trade are both written or neither is.

use async_trait::async_trait;

use crate::domain::entities::challenge::{Challenge, ChallengeStatus};
use crate::domain::entities::trade::Trade;
use crate::domain::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_challenge(&self, challenge: &Challenge) -> StoreResult<()>;

    async fn get_challenge(&self, id: &str) -> StoreResult<Option<Challenge>>;

    /// Challenges owned by `owner_id`, newest first.
    async fn list_challenges_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Challenge>>;

    /// All challenges, optionally filtered by status, newest first.
    async fn list_challenges(&self, status: Option<ChallengeStatus>) -> StoreResult<Vec<Challenge>>;

    /// Overwrite the mutable columns of an existing challenge.
    async fn update_challenge(&self, challenge: &Challenge) -> StoreResult<()>;

    /// Delete a challenge and every trade it owns. Returns false if absent.
    async fn delete_challenge(&self, id: &str) -> StoreResult<bool>;

    async fn get_trade(&self, id: &str) -> StoreResult<Option<Trade>>;

    /// Trades of a challenge, most recently opened first.
    async fn list_trades(&self, challenge_id: &str) -> StoreResult<Vec<Trade>>;

    /// Insert a newly opened trade together with its challenge update.
    ///
    /// Fails with [`StoreError::Conflict`] if the challenge is no longer active.
    async fn record_opened(&self, challenge: &Challenge, trade: &Trade) -> StoreResult<()>;

    /// Persist a settled trade together with its challenge update.
    ///
    /// Fails with [`StoreError::Conflict`] if the stored trade is no longer
    /// open or the stored challenge is no longer active.
    async fn record_settlement(&self, challenge: &Challenge, trade: &Trade) -> StoreResult<()>;
}
