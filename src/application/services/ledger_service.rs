//! Ledger service
//!
//! Orchestrates the pure ledger rules against a [`LedgerStore`]: loads the
//! current records, applies the rule, and persists the result atomically.
//!
//! ## Concurrency
//! Every mutation of a challenge (and of its trades) runs under that
//! challenge's async lock, so two closes of the same trade cannot both
//! settle. The store's conditional writes back this up across processes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::config::LedgerConfig;
use crate::domain::entities::challenge::{
    Challenge, ChallengePatch, ChallengeStatus, PlanType, RiskThresholds, StatusOverride,
};
use crate::domain::entities::trade::Trade;
use crate::domain::errors::{LedgerError, StoreError};
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::repositories::market_data::MarketDataProvider;
use crate::domain::services::leaderboard::{rank_leaderboard, LeaderboardEntry};
use crate::domain::services::ledger::{
    self, EvaluationOutcome, LedgerRules, OpenTradeRequest, OpenedTrade, Settlement,
};
use crate::task_runner::{
    run_with_circuit_breaker, until_next_utc_midnight, CircuitBreakerConfig, CircuitOpen,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChallengeRequest {
    pub plan_type: PlanType,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Body of `POST /trades`
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTradeCommand {
    pub challenge_id: String,
    #[serde(flatten)]
    pub order: OpenTradeRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChallengeStats {
    pub total: usize,
    pub active: usize,
    pub passed: usize,
    pub failed: usize,
}

impl ChallengeStats {
    fn tally(challenges: &[Challenge]) -> Self {
        let mut stats = ChallengeStats {
            total: challenges.len(),
            ..Default::default()
        };
        for challenge in challenges {
            match challenge.status {
                ChallengeStatus::Active => stats.active += 1,
                ChallengeStatus::Passed => stats.passed += 1,
                ChallengeStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub stats: ChallengeStats,
    pub challenges: Vec<Challenge>,
}

fn store_failure(operation: &str, e: StoreError) -> LedgerError {
    error!("Ledger store failure during {}: {}", operation, e);
    e.into()
}

type LockMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Holds one challenge's lock. On release the map entry is dropped unless
/// another task is waiting on it, so the map only holds contended ids.
struct ChallengeGuard<'a> {
    locks: &'a LockMap,
    challenge_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChallengeGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.challenge_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.challenge_id);
        }
    }
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    rules: LedgerRules,
    default_thresholds: RiskThresholds,
    market_data: Option<Arc<dyn MarketDataProvider>>,
    challenge_locks: LockMap,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            rules: config.ledger_rules(),
            default_thresholds: config.default_thresholds,
            market_data: None,
            challenge_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_market_data(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.market_data = Some(provider);
        self
    }

    async fn lock_challenge(&self, challenge_id: &str) -> ChallengeGuard<'_> {
        let lock = {
            let mut locks = self
                .challenge_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(challenge_id.to_string()).or_default().clone()
        };
        ChallengeGuard {
            locks: &self.challenge_locks,
            challenge_id: challenge_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn load_challenge(&self, id: &str) -> Result<Challenge, LedgerError> {
        self.store
            .get_challenge(id)
            .await
            .map_err(|e| store_failure("challenge lookup", e))?
            .ok_or_else(|| LedgerError::challenge_not_found(id))
    }

    async fn load_trade(&self, id: &str) -> Result<Trade, LedgerError> {
        self.store
            .get_trade(id)
            .await
            .map_err(|e| store_failure("trade lookup", e))?
            .ok_or_else(|| LedgerError::trade_not_found(id))
    }

    /// Load a challenge the caller is allowed to see.
    async fn load_owned_challenge(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<Challenge, LedgerError> {
        let challenge = self.load_challenge(id).await?;
        if !ctx.can_access(&challenge.owner_id) {
            warn!(
                "User {} denied access to challenge {}",
                ctx.user_id, challenge.id
            );
            return Err(LedgerError::Forbidden(format!(
                "challenge {} belongs to another user",
                id
            )));
        }
        Ok(challenge)
    }

    pub async fn create_challenge(
        &self,
        ctx: &RequestContext,
        request: CreateChallengeRequest,
    ) -> Result<Challenge, LedgerError> {
        let challenge = Challenge::new(
            Uuid::new_v4().to_string(),
            ctx.user_id.clone(),
            request.display_name,
            request.plan_type,
            self.default_thresholds,
            Utc::now(),
        )?;

        self.store
            .insert_challenge(&challenge)
            .await
            .map_err(|e| store_failure("challenge creation", e))?;

        info!(
            "Challenge {} created for {} ({} plan, balance {:.2})",
            challenge.id, challenge.owner_id, challenge.plan_type, challenge.starting_balance
        );
        Ok(challenge)
    }

    pub async fn get_challenge(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<Challenge, LedgerError> {
        self.load_owned_challenge(ctx, id).await
    }

    pub async fn list_challenges(&self, ctx: &RequestContext) -> Result<Vec<Challenge>, LedgerError> {
        self.store
            .list_challenges_by_owner(&ctx.user_id)
            .await
            .map_err(|e| store_failure("challenge listing", e))
    }

    pub async fn patch_challenge(
        &self,
        ctx: &RequestContext,
        id: &str,
        patch: ChallengePatch,
    ) -> Result<Challenge, LedgerError> {
        let _guard = self.lock_challenge(id).await;
        let mut challenge = self.load_owned_challenge(ctx, id).await?;

        patch.apply(&mut challenge, Utc::now());
        self.store
            .update_challenge(&challenge)
            .await
            .map_err(|e| store_failure("challenge update", e))?;

        debug!("Challenge {} patched", challenge.id);
        Ok(challenge)
    }

    pub async fn delete_challenge(&self, ctx: &RequestContext, id: &str) -> Result<(), LedgerError> {
        let guard = self.lock_challenge(id).await;
        self.load_owned_challenge(ctx, id).await?;

        let deleted = self
            .store
            .delete_challenge(id)
            .await
            .map_err(|e| store_failure("challenge deletion", e))?;
        drop(guard);

        if !deleted {
            return Err(LedgerError::challenge_not_found(id));
        }

        info!("Challenge {} deleted by {}", id, ctx.user_id);
        Ok(())
    }

    pub async fn list_trades(
        &self,
        ctx: &RequestContext,
        challenge_id: &str,
    ) -> Result<Vec<Trade>, LedgerError> {
        self.load_owned_challenge(ctx, challenge_id).await?;
        self.store
            .list_trades(challenge_id)
            .await
            .map_err(|e| store_failure("trade listing", e))
    }

    pub async fn open_trade(
        &self,
        ctx: &RequestContext,
        command: OpenTradeCommand,
    ) -> Result<OpenedTrade, LedgerError> {
        let _guard = self.lock_challenge(&command.challenge_id).await;
        let challenge = self
            .load_owned_challenge(ctx, &command.challenge_id)
            .await?;

        let opened = ledger::open_trade(
            &challenge,
            Uuid::new_v4().to_string(),
            &command.order,
            Utc::now(),
            self.rules,
        )?;

        match self
            .store
            .record_opened(&opened.challenge, &opened.trade)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Conflict(detail)) => {
                warn!("Trade open lost a race on {}: {}", challenge.id, detail);
                let current = self.load_challenge(&challenge.id).await?;
                return Err(LedgerError::ChallengeNotActive {
                    challenge_id: current.id,
                    status: current.status.to_string(),
                });
            }
            Err(e) => return Err(store_failure("trade open", e)),
        }

        info!(
            "Trade {} opened on {}: {} {} x{} @ {}",
            opened.trade.id,
            challenge.id,
            opened.trade.side,
            opened.trade.symbol,
            opened.trade.quantity,
            opened.trade.entry_price
        );
        Ok(opened)
    }

    async fn resolve_exit_price(&self, trade: &Trade, exit_price: Option<f64>) -> Result<f64, LedgerError> {
        if let Some(price) = exit_price {
            return Ok(price);
        }

        let provider = self.market_data.as_ref().ok_or_else(|| {
            LedgerError::MarketDataUnavailable(
                "no exit price given and no market data source configured".to_string(),
            )
        })?;

        provider.last_price(&trade.symbol).await.map_err(|e| {
            warn!("Could not price close of trade {}: {}", trade.id, e);
            LedgerError::MarketDataUnavailable(e.to_string())
        })
    }

    /// Settle a trade at `exit_price`, or at the market price when omitted.
    pub async fn close_trade(
        &self,
        ctx: &RequestContext,
        trade_id: &str,
        exit_price: Option<f64>,
    ) -> Result<Settlement, LedgerError> {
        let challenge_id = self.load_trade(trade_id).await?.challenge_id;
        let _guard = self.lock_challenge(&challenge_id).await;

        // Re-read under the lock: a concurrent close may have settled it.
        let trade = self.load_trade(trade_id).await?;
        let challenge = self.load_owned_challenge(ctx, &trade.challenge_id).await?;
        if !trade.is_open() {
            return Err(LedgerError::TradeAlreadyClosed {
                trade_id: trade.id,
            });
        }

        let price = self.resolve_exit_price(&trade, exit_price).await?;
        let settlement = ledger::close_trade(&challenge, &trade, price, Utc::now(), self.rules)?;

        match self
            .store
            .record_settlement(&settlement.challenge, &settlement.trade)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Conflict(detail)) => {
                warn!("Settlement of {} rejected: {}", trade.id, detail);
                let current = self.load_trade(trade_id).await?;
                if !current.is_open() {
                    return Err(LedgerError::TradeAlreadyClosed {
                        trade_id: current.id,
                    });
                }
                let challenge = self.load_challenge(&challenge_id).await?;
                return Err(LedgerError::ChallengeNotActive {
                    challenge_id: challenge.id,
                    status: challenge.status.to_string(),
                });
            }
            Err(e) => return Err(store_failure("trade settlement", e)),
        }

        info!(
            "Trade {} closed @ {}: pnl {:.2}, challenge {} balance {:.2} ({})",
            settlement.trade.id,
            price,
            settlement.trade.pnl.unwrap_or_default(),
            settlement.challenge.id,
            settlement.challenge.current_balance,
            settlement.challenge.status
        );
        Ok(settlement)
    }

    /// Re-apply the risk rules on demand and persist a resulting transition.
    pub async fn evaluate_challenge(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<EvaluationOutcome, LedgerError> {
        let _guard = self.lock_challenge(id).await;
        let challenge = self.load_owned_challenge(ctx, id).await?;

        let (updated, outcome) = ledger::evaluate(&challenge, Utc::now());
        if outcome.newly_terminal {
            self.store
                .update_challenge(&updated)
                .await
                .map_err(|e| store_failure("challenge evaluation", e))?;
        }
        Ok(outcome)
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let passed = self
            .store
            .list_challenges(Some(ChallengeStatus::Passed))
            .await
            .map_err(|e| store_failure("leaderboard", e))?;
        Ok(rank_leaderboard(&passed))
    }

    pub async fn admin_overview(&self, ctx: &RequestContext) -> Result<AdminOverview, LedgerError> {
        ctx.require_admin()?;
        let challenges = self
            .store
            .list_challenges(None)
            .await
            .map_err(|e| store_failure("admin listing", e))?;

        Ok(AdminOverview {
            stats: ChallengeStats::tally(&challenges),
            challenges,
        })
    }

    /// Manually end an active challenge.
    pub async fn admin_set_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        verdict: StatusOverride,
    ) -> Result<Challenge, LedgerError> {
        ctx.require_admin()?;
        let _guard = self.lock_challenge(id).await;
        let mut challenge = self.load_challenge(id).await?;

        if !challenge.is_active() {
            return Err(LedgerError::ChallengeNotActive {
                challenge_id: challenge.id,
                status: challenge.status.to_string(),
            });
        }

        challenge.status = verdict.status();
        challenge.failure_reason = match verdict {
            StatusOverride::Failed => Some(StatusOverride::MANUAL_FAILURE_REASON.to_string()),
            StatusOverride::Passed => None,
        };
        challenge.updated_at = Utc::now();

        self.store
            .update_challenge(&challenge)
            .await
            .map_err(|e| store_failure("status override", e))?;

        info!(
            "Challenge {} manually marked {} by {}",
            challenge.id, challenge.status, ctx.user_id
        );
        Ok(challenge)
    }

    /// Start a new trading day for every active challenge, regardless of
    /// when it last rolled. Returns how many challenges were rolled.
    pub async fn roll_daily_all(&self) -> Result<usize, LedgerError> {
        self.roll_active(true).await
    }

    /// Roll only the active challenges whose trading day is still on an
    /// earlier UTC date. A challenge already rolled today, lazily by a close
    /// or by an earlier pass, keeps its daily figures.
    pub async fn roll_stale_days(&self) -> Result<usize, LedgerError> {
        self.roll_active(false).await
    }

    async fn roll_active(&self, force: bool) -> Result<usize, LedgerError> {
        let active = self
            .store
            .list_challenges(Some(ChallengeStatus::Active))
            .await
            .map_err(|e| store_failure("rollover listing", e))?;

        let mut rolled = 0;
        for candidate in active {
            let _guard = self.lock_challenge(&candidate.id).await;
            // Skip challenges deleted or ended since the listing.
            let Some(mut challenge) = self
                .store
                .get_challenge(&candidate.id)
                .await
                .map_err(|e| store_failure("rollover lookup", e))?
            else {
                continue;
            };

            let now = Utc::now();
            if !force && !ledger::starts_new_day(&challenge, now) {
                continue;
            }
            if ledger::roll_daily(&mut challenge, now) {
                self.store
                    .update_challenge(&challenge)
                    .await
                    .map_err(|e| store_failure("daily rollover", e))?;
                rolled += 1;
            }
        }

        info!("Daily rollover reset {} active challenge(s)", rolled);
        Ok(rolled)
    }
}

/// At each UTC midnight, roll every active challenge still on the previous
/// trading day.
///
/// A failed rollover is retried with backoff before waiting for the next
/// midnight again; the job stops once the circuit opens.
pub async fn run_daily_rollover(
    service: Arc<LedgerService>,
    config: CircuitBreakerConfig,
) -> Result<(), CircuitOpen> {
    let pending = Arc::new(AtomicBool::new(false));

    run_with_circuit_breaker("daily_rollover", config, || {
        let service = service.clone();
        let pending = pending.clone();
        async move {
            if !pending.load(Ordering::SeqCst) {
                tokio::time::sleep(until_next_utc_midnight(Utc::now())).await;
                pending.store(true, Ordering::SeqCst);
            }
            match service.roll_stale_days().await {
                Ok(_) => {
                    pending.store(false, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
                Err(e) => Err(e.to_string()),
            }
        }
    })
    .await
}
