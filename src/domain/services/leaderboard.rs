//! Leaderboard ranking over passed challenges.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::entities::challenge::{Challenge, ChallengeStatus, PlanType};

pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub challenge_id: String,
    pub display_name: String,
    pub plan_type: PlanType,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub current_balance: f64,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub win_rate: f64,
}

/// Rank passed challenges by total P&L percentage.
///
/// Each display identity appears once, with its best challenge. Ties are
/// broken by challenge id so the output is deterministic. At most
/// [`LEADERBOARD_SIZE`] entries are returned.
pub fn rank_leaderboard(challenges: &[Challenge]) -> Vec<LeaderboardEntry> {
    let mut best: HashMap<&str, &Challenge> = HashMap::new();

    for challenge in challenges
        .iter()
        .filter(|c| c.status == ChallengeStatus::Passed)
    {
        best.entry(challenge.display_identity())
            .and_modify(|current| {
                if outranks(challenge, current) {
                    *current = challenge;
                }
            })
            .or_insert(challenge);
    }

    let mut ranked: Vec<&Challenge> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.total_pnl_pct
            .total_cmp(&a.total_pnl_pct)
            .then_with(|| a.id.cmp(&b.id))
    });

    ranked
        .into_iter()
        .take(LEADERBOARD_SIZE)
        .enumerate()
        .map(|(i, c)| LeaderboardEntry {
            rank: i + 1,
            challenge_id: c.id.clone(),
            display_name: c.display_identity().to_string(),
            plan_type: c.plan_type,
            total_pnl: c.total_pnl,
            total_pnl_pct: c.total_pnl_pct,
            current_balance: c.current_balance,
            total_trades: c.total_trades,
            winning_trades: c.winning_trades,
            win_rate: c.win_rate(),
        })
        .collect()
}

fn outranks(candidate: &Challenge, current: &Challenge) -> bool {
    match candidate.total_pnl_pct.total_cmp(&current.total_pnl_pct) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Equal => candidate.id < current.id,
        std::cmp::Ordering::Less => false,
    }
}
