use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Challenge tier purchased by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Starter,
    Pro,
    Elite,
}

impl PlanType {
    /// Virtual balance a new challenge on this plan starts with.
    pub fn starting_balance(&self) -> f64 {
        match self {
            PlanType::Starter => 5_000.0,
            PlanType::Pro => 10_000.0,
            PlanType::Elite => 20_000.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Starter => "starter",
            PlanType::Pro => "pro",
            PlanType::Elite => "elite",
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(PlanType::Starter),
            "pro" => Ok(PlanType::Pro),
            "elite" => Ok(PlanType::Elite),
            other => Err(ValidationError::UnknownVariant {
                field: "plan_type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Active,
    Passed,
    Failed,
}

impl ChallengeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChallengeStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Active => "active",
            ChallengeStatus::Passed => "passed",
            ChallengeStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChallengeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ChallengeStatus::Active),
            "passed" => Ok(ChallengeStatus::Passed),
            "failed" => Ok(ChallengeStatus::Failed),
            other => Err(ValidationError::UnknownVariant {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Risk limits fixed when the challenge is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub max_daily_loss_pct: f64,
    pub max_total_loss_pct: f64,
    pub profit_target_pct: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 5.0,
            max_total_loss_pct: 10.0,
            profit_target_pct: 10.0,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("max_daily_loss_pct", self.max_daily_loss_pct),
            ("max_total_loss_pct", self.max_total_loss_pct),
            ("profit_target_pct", self.profit_target_pct),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::MustBeFinite(name));
            }
            if value <= 0.0 {
                return Err(ValidationError::MustBePositive(name));
            }
        }
        Ok(())
    }
}

/// A user's single attempt at the trading evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub owner_id: String,
    pub display_name: Option<String>,
    pub plan_type: PlanType,

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

    pub status: ChallengeStatus,
    pub failure_reason: Option<String>,

    pub total_trades: i64,
    pub winning_trades: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_trade_date: Option<DateTime<Utc>>,
    /// When the daily baseline was last reset.
    #[serde(default)]
    pub daily_reset_at: Option<DateTime<Utc>>,
}

impl Challenge {
    /// Start a fresh, active challenge funded according to `plan_type`.
    pub fn new(
        id: String,
        owner_id: String,
        display_name: Option<String>,
        plan_type: PlanType,
        thresholds: RiskThresholds,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        thresholds.validate()?;
        let balance = plan_type.starting_balance();

        Ok(Challenge {
            id,
            owner_id,
            display_name: display_name.filter(|name| !name.trim().is_empty()),
            plan_type,
            starting_balance: balance,
            current_balance: balance,
            equity: balance,
            daily_start_balance: balance,
            daily_pnl: 0.0,
            total_pnl: 0.0,
            daily_pnl_pct: 0.0,
            total_pnl_pct: 0.0,
            max_daily_loss_pct: thresholds.max_daily_loss_pct,
            max_total_loss_pct: thresholds.max_total_loss_pct,
            profit_target_pct: thresholds.profit_target_pct,
            status: ChallengeStatus::Active,
            failure_reason: None,
            total_trades: 0,
            winning_trades: 0,
            created_at: now,
            updated_at: now,
            last_trade_date: None,
            daily_reset_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == ChallengeStatus::Active
    }

    pub fn thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            max_daily_loss_pct: self.max_daily_loss_pct,
            max_total_loss_pct: self.max_total_loss_pct,
            profit_target_pct: self.profit_target_pct,
        }
    }

    /// Name shown on the leaderboard: display name if set, else the owner id.
    pub fn display_identity(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.owner_id,
        }
    }

    /// Winning trades as a percentage of `total_trades`. With trades counted
    /// on open, positions still open are part of the denominator.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        }
    }

    /// Latest point known to belong to the current trading day: the last
    /// daily reset, the last settlement, or creation.
    pub fn day_anchor(&self) -> DateTime<Utc> {
        [self.last_trade_date, self.daily_reset_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, DateTime::max)
    }
}

/// Fields a challenge owner may change after creation.
///
/// Anything not listed here (balances, thresholds, status, counters) is
/// owned by the ledger and cannot be written through a patch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChallengePatch {
    pub display_name: Option<String>,
}

impl ChallengePatch {
    pub fn apply(self, challenge: &mut Challenge, now: DateTime<Utc>) {
        if let Some(name) = self.display_name {
            let trimmed = name.trim();
            challenge.display_name = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
            challenge.updated_at = now;
        }
    }
}

/// Admin verdict on an active challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusOverride {
    Passed,
    Failed,
}

impl StatusOverride {
    pub const MANUAL_FAILURE_REASON: &'static str = "Manually marked as failed by admin";

    pub fn status(&self) -> ChallengeStatus {
        match self {
            StatusOverride::Passed => ChallengeStatus::Passed,
            StatusOverride::Failed => ChallengeStatus::Failed,
        }
    }
}
