//! Challenge ledger
//!
//! Pure settlement and risk rules over a [`Challenge`] and its [`Trade`]s.
//! Nothing here performs I/O: every operation takes the current records and
//! returns updated copies, leaving the inputs untouched when it fails. The
//! caller persists the returned records atomically.
//!
//! # Risk evaluation
//! Applied after every settlement, first match wins:
//! 1. `daily_pnl_pct <= -max_daily_loss_pct` → failed ("Daily loss limit exceeded")
//! 2. `total_pnl_pct <= -max_total_loss_pct` → failed ("Total loss limit exceeded")
//! 3. `total_pnl_pct >= profit_target_pct` → passed
//! 4. otherwise the challenge stays active

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::entities::challenge::{Challenge, ChallengeStatus};
use crate::domain::entities::trade::{normalize_symbol, Trade, TradeSide, TradeStatus};
use crate::domain::errors::{LedgerError, ValidationError};
use crate::domain::value_objects::{pnl::percent_of, price::Price, quantity::Quantity};

pub const DAILY_LOSS_REASON: &str = "Daily loss limit exceeded";
pub const TOTAL_LOSS_REASON: &str = "Total loss limit exceeded";

/// When a trade is counted in `total_trades`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeCountTiming {
    /// Count the trade as soon as it is opened.
    #[default]
    Open,
    /// Count the trade when it is settled.
    Close,
}

impl std::str::FromStr for TradeCountTiming {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(TradeCountTiming::Open),
            "close" => Ok(TradeCountTiming::Close),
            other => Err(ValidationError::UnknownVariant {
                field: "trade count timing",
                value: other.to_string(),
            }),
        }
    }
}

/// Tunable ledger behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerRules {
    pub trade_count_timing: TradeCountTiming,
}

/// Client request to open a position.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedTrade {
    pub challenge: Challenge,
    pub trade: Trade,
}

/// Result of applying the risk rules, surfaced once to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub status: ChallengeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// True only for the evaluation that moved the challenge out of `active`.
    pub newly_terminal: bool,
}

/// Updated records produced by closing a trade.
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub challenge: Challenge,
    pub trade: Trade,
    pub outcome: EvaluationOutcome,
}

/// Verdict of the risk rules on a challenge's current figures.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskVerdict {
    Active,
    Passed,
    Failed(&'static str),
}

fn ensure_active(challenge: &Challenge) -> Result<(), LedgerError> {
    if challenge.is_active() {
        Ok(())
    } else {
        Err(LedgerError::ChallengeNotActive {
            challenge_id: challenge.id.clone(),
            status: challenge.status.to_string(),
        })
    }
}

/// Open a new position against an active challenge.
pub fn open_trade(
    challenge: &Challenge,
    trade_id: String,
    request: &OpenTradeRequest,
    open_time: DateTime<Utc>,
    rules: LedgerRules,
) -> Result<OpenedTrade, LedgerError> {
    ensure_active(challenge)?;

    let symbol = normalize_symbol(&request.symbol)?;
    let quantity = Quantity::new(request.quantity)?;
    let entry_price = Price::new(request.entry_price)?;

    let required = entry_price.notional(quantity);
    if required > challenge.current_balance {
        return Err(LedgerError::InsufficientBalance {
            required,
            available: challenge.current_balance,
        });
    }

    let trade = Trade::open(
        trade_id,
        challenge.id.clone(),
        symbol,
        request.side,
        quantity,
        entry_price,
        open_time,
    );

    let mut updated = challenge.clone();
    if rules.trade_count_timing == TradeCountTiming::Open {
        updated.total_trades += 1;
    }
    updated.updated_at = open_time;

    debug!(
        "Opened {} {} x{} @ {} on challenge {}",
        trade.side, trade.symbol, trade.quantity, trade.entry_price, challenge.id
    );

    Ok(OpenedTrade {
        challenge: updated,
        trade,
    })
}

/// Settle an open trade and re-evaluate the owning challenge.
pub fn close_trade(
    challenge: &Challenge,
    trade: &Trade,
    exit_price: f64,
    close_time: DateTime<Utc>,
    rules: LedgerRules,
) -> Result<Settlement, LedgerError> {
    if trade.challenge_id != challenge.id {
        return Err(ValidationError::ForeignTrade {
            trade_id: trade.id.clone(),
            challenge_id: challenge.id.clone(),
        }
        .into());
    }
    if !trade.is_open() {
        return Err(LedgerError::TradeAlreadyClosed {
            trade_id: trade.id.clone(),
        });
    }
    ensure_active(challenge)?;
    let exit = Price::new(exit_price)?;

    let pnl = trade.realized_pnl(exit)?;

    let mut closed = trade.clone();
    closed.exit_price = Some(exit.value());
    closed.close_time = Some(close_time);
    closed.status = TradeStatus::Closed;
    closed.pnl = Some(pnl.value());
    closed.pnl_pct = Some(pnl.percent_of(trade.notional()));

    let mut updated = challenge.clone();
    if starts_new_day(&updated, close_time) {
        roll_daily(&mut updated, close_time);
    }

    updated.current_balance += pnl.value();
    updated.equity = updated.current_balance;
    updated.total_pnl += pnl.value();
    updated.total_pnl_pct = percent_of(
        updated.current_balance - updated.starting_balance,
        updated.starting_balance,
    );
    updated.daily_pnl += pnl.value();
    updated.daily_pnl_pct = percent_of(updated.daily_pnl, updated.daily_start_balance);

    if rules.trade_count_timing == TradeCountTiming::Close {
        updated.total_trades += 1;
    }
    if pnl.is_profit() {
        updated.winning_trades += 1;
    }
    updated.last_trade_date = Some(close_time);
    updated.updated_at = close_time;

    let verdict = assess(&updated);
    let outcome = apply_verdict(&mut updated, verdict);

    debug!(
        "Closed trade {} on {}: pnl {} ({:.2}%), balance {:.2}",
        closed.id,
        challenge.id,
        pnl,
        closed.pnl_pct.unwrap_or_default(),
        updated.current_balance
    );

    Ok(Settlement {
        challenge: updated,
        trade: closed,
        outcome,
    })
}

/// Apply the risk rules to the challenge's stored figures.
pub fn assess(challenge: &Challenge) -> RiskVerdict {
    if challenge.daily_pnl_pct <= -challenge.max_daily_loss_pct {
        RiskVerdict::Failed(DAILY_LOSS_REASON)
    } else if challenge.total_pnl_pct <= -challenge.max_total_loss_pct {
        RiskVerdict::Failed(TOTAL_LOSS_REASON)
    } else if challenge.total_pnl_pct >= challenge.profit_target_pct {
        RiskVerdict::Passed
    } else {
        RiskVerdict::Active
    }
}

fn apply_verdict(challenge: &mut Challenge, verdict: RiskVerdict) -> EvaluationOutcome {
    match verdict {
        RiskVerdict::Active => {}
        RiskVerdict::Passed => {
            challenge.status = ChallengeStatus::Passed;
            challenge.failure_reason = None;
            info!(
                "Challenge {} passed at {:.2}% total P&L",
                challenge.id, challenge.total_pnl_pct
            );
        }
        RiskVerdict::Failed(reason) => {
            challenge.status = ChallengeStatus::Failed;
            challenge.failure_reason = Some(reason.to_string());
            info!(
                "Challenge {} failed: {} (daily {:.2}%, total {:.2}%)",
                challenge.id, reason, challenge.daily_pnl_pct, challenge.total_pnl_pct
            );
        }
    }

    EvaluationOutcome {
        status: challenge.status,
        failure_reason: challenge.failure_reason.clone(),
        newly_terminal: challenge.status.is_terminal(),
    }
}

/// Re-run the risk rules without a trade, as the on-demand evaluation does.
///
/// Terminal challenges are returned unchanged with `newly_terminal = false`.
pub fn evaluate(challenge: &Challenge, at: DateTime<Utc>) -> (Challenge, EvaluationOutcome) {
    let mut updated = challenge.clone();
    if !challenge.is_active() {
        let outcome = EvaluationOutcome {
            status: challenge.status,
            failure_reason: challenge.failure_reason.clone(),
            newly_terminal: false,
        };
        return (updated, outcome);
    }

    let outcome = apply_verdict(&mut updated, assess(challenge));
    if outcome.newly_terminal {
        updated.updated_at = at;
    }
    (updated, outcome)
}

/// Whether `at` falls on a later UTC calendar day than the challenge's
/// current trading day.
pub fn starts_new_day(challenge: &Challenge, at: DateTime<Utc>) -> bool {
    at.date_naive() > challenge.day_anchor().date_naive()
}

/// Begin a new trading day: the current balance becomes the daily baseline.
///
/// Returns false (and changes nothing) for terminal challenges.
pub fn roll_daily(challenge: &mut Challenge, at: DateTime<Utc>) -> bool {
    if !challenge.is_active() {
        return false;
    }
    challenge.daily_start_balance = challenge.current_balance;
    challenge.daily_pnl = 0.0;
    challenge.daily_pnl_pct = 0.0;
    challenge.daily_reset_at = Some(at);
    challenge.updated_at = at;
    true
}
