//! Settlement data models: room state, standings, rake, payout models.

use crate::budget::BullPenId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Room lifecycle state, owned by the room service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BullPenState {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl BullPenState {
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => BullPenState::Active,
            "completed" => BullPenState::Completed,
            "cancelled" => BullPenState::Cancelled,
            _ => BullPenState::Scheduled,
        }
    }
}

impl std::fmt::Display for BullPenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BullPenState::Scheduled => "scheduled",
            BullPenState::Active => "active",
            BullPenState::Completed => "completed",
            BullPenState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Settlement progress, owned by the settlement engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SettlementStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => SettlementStatus::InProgress,
            "completed" => SettlementStatus::Completed,
            "failed" => SettlementStatus::Failed,
            _ => SettlementStatus::Pending,
        }
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::InProgress => "in_progress",
            SettlementStatus::Completed => "completed",
            SettlementStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Room row as the settlement engine sees it
#[derive(Debug, Clone)]
pub struct BullPen {
    pub id: BullPenId,
    pub state: BullPenState,
    pub settlement_status: SettlementStatus,
    pub settlement_correlation_id: Option<String>,
    pub season_id: Option<i64>,
}

/// Member row: buy-in plus the trading results to be marked to market
#[derive(Debug, Clone)]
pub struct BullPenMember {
    pub bull_pen_id: BullPenId,
    pub user_id: i64,
    pub buy_in: i64,
    pub final_cash: i64,
    /// Open positions as a symbol -> signed quantity map
    pub positions: serde_json::Value,
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// A ranked member: standings are ordered best to worst before payout
/// distribution runs.
#[derive(Debug, Clone)]
pub struct MemberStanding {
    pub user_id: i64,
    pub buy_in: i64,
    pub portfolio_value: i64,
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// Outcome classification per member, relative to their buy-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberResult {
    Win,
    Breakeven,
    Loss,
    Refunded,
}

impl MemberResult {
    /// Classify a payout against the member's buy-in.
    pub fn classify(payout: i64, buy_in: i64) -> Self {
        match payout.cmp(&buy_in) {
            std::cmp::Ordering::Greater => MemberResult::Win,
            std::cmp::Ordering::Equal => MemberResult::Breakeven,
            std::cmp::Ordering::Less => MemberResult::Loss,
        }
    }
}

impl std::fmt::Display for MemberResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberResult::Win => "WIN",
            MemberResult::Breakeven => "BREAKEVEN",
            MemberResult::Loss => "LOSS",
            MemberResult::Refunded => "REFUNDED",
        };
        write!(f, "{s}")
    }
}

/// Active rake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RakeConfig {
    pub percentage_bps: i64,
    pub min_amount: i64,
    pub max_amount: i64,
}

impl RakeConfig {
    /// Rake taken from a prize pool: pool * bps / 10000, clamped to the
    /// configured [min, max] band, and never more than the pool itself.
    pub fn rake_for(&self, pool: i64) -> i64 {
        if pool <= 0 {
            return 0;
        }
        let raw = (pool as i128 * self.percentage_bps as i128 / 10_000) as i64;
        raw.clamp(self.min_amount, self.max_amount).min(pool)
    }
}

/// How the post-rake pool is split across ranked members.
///
/// All models use integer basis-point arithmetic with floor rounding; any
/// rounding remainder goes to rank 1, so the distribution is deterministic
/// and sums exactly to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "model")]
pub enum PayoutModel {
    /// Rank 1 receives the entire pool
    WinnerTakeAll,
    /// Each member receives a share proportional to their portfolio value
    ProportionalToValue,
    /// Fixed basis-point shares for the top three ranks
    TieredTopThree { bps: [i64; 3] },
}

impl PayoutModel {
    /// Standard tiered split: 50/30/20.
    pub fn standard_tiered() -> Self {
        PayoutModel::TieredTopThree {
            bps: [5_000, 3_000, 2_000],
        }
    }

    /// Distribute `pool` across members in standings order (best first).
    ///
    /// Returns one payout per standing; payouts are non-negative and sum to
    /// `pool` exactly (or to 0 when the pool is empty).
    pub fn distribute(&self, pool: i64, standings: &[MemberStanding]) -> Vec<i64> {
        if standings.is_empty() {
            return Vec::new();
        }
        if pool <= 0 {
            return vec![0; standings.len()];
        }

        let mut payouts = vec![0i64; standings.len()];
        match self {
            PayoutModel::WinnerTakeAll => {
                payouts[0] = pool;
            }
            PayoutModel::ProportionalToValue => {
                // Negative portfolio values carry zero weight.
                let weights: Vec<i128> = standings
                    .iter()
                    .map(|s| s.portfolio_value.max(0) as i128)
                    .collect();
                let total: i128 = weights.iter().sum();
                if total == 0 {
                    payouts[0] = pool;
                } else {
                    let mut distributed = 0i64;
                    for (payout, weight) in payouts.iter_mut().zip(&weights) {
                        *payout = (pool as i128 * weight / total) as i64;
                        distributed += *payout;
                    }
                    payouts[0] += pool - distributed;
                }
            }
            PayoutModel::TieredTopThree { bps } => {
                let mut distributed = 0i64;
                for (payout, share_bps) in payouts.iter_mut().zip(bps) {
                    *payout = (pool as i128 * *share_bps as i128 / 10_000) as i64;
                    distributed += *payout;
                }
                payouts[0] += pool - distributed;
            }
        }
        payouts
    }
}

/// Per-member settlement line in the final report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSettlement {
    pub user_id: i64,
    /// 1-indexed standing
    pub rank: usize,
    pub portfolio_value: i64,
    pub buy_in: i64,
    pub payout: i64,
    pub result: MemberResult,
}

/// Result of one settlement run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub bull_pen_id: BullPenId,
    pub correlation_id: String,
    pub pool: i64,
    pub rake: i64,
    pub members: Vec<MemberSettlement>,
    /// True when the room was already settled and this run changed nothing
    pub already_complete: bool,
}

impl SettlementReport {
    pub fn already_complete(bull_pen_id: BullPenId, correlation_id: Option<String>) -> Self {
        Self {
            bull_pen_id,
            correlation_id: correlation_id.unwrap_or_default(),
            pool: 0,
            rake: 0,
            members: Vec::new(),
            already_complete: true,
        }
    }
}

/// Result of a room or member cancellation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationReport {
    pub bull_pen_id: BullPenId,
    pub correlation_id: String,
    pub refunded_user_ids: Vec<i64>,
}

/// Summary of one settlement sweep pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub settled: Vec<BullPenId>,
    pub failed: Vec<BullPenId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(user_id: i64, value: i64) -> MemberStanding {
        MemberStanding {
            user_id,
            buy_in: 100,
            portfolio_value: value,
            last_trade_at: None,
        }
    }

    #[test]
    fn test_winner_take_all() {
        let standings = vec![standing(1, 300), standing(2, 200), standing(3, 100)];
        let payouts = PayoutModel::WinnerTakeAll.distribute(270, &standings);
        assert_eq!(payouts, vec![270, 0, 0]);
    }

    #[test]
    fn test_tiered_top_three() {
        let standings = vec![
            standing(1, 400),
            standing(2, 300),
            standing(3, 200),
            standing(4, 100),
        ];
        let payouts = PayoutModel::standard_tiered().distribute(1000, &standings);
        assert_eq!(payouts, vec![500, 300, 200, 0]);
    }

    #[test]
    fn test_tiered_with_fewer_members_than_tiers() {
        // The unpaid third tier's share falls back to rank 1.
        let standings = vec![standing(1, 200), standing(2, 100)];
        let payouts = PayoutModel::standard_tiered().distribute(1000, &standings);
        assert_eq!(payouts, vec![700, 300]);
        assert_eq!(payouts.iter().sum::<i64>(), 1000);
    }

    #[test]
    fn test_tiered_rounding_remainder_goes_to_rank_one() {
        let standings = vec![standing(1, 300), standing(2, 200), standing(3, 100)];
        // 1001: floor shares are 500/300/200, remainder 1 to rank 1.
        let payouts = PayoutModel::standard_tiered().distribute(1001, &standings);
        assert_eq!(payouts, vec![501, 300, 200]);
    }

    #[test]
    fn test_proportional_distribution() {
        let standings = vec![standing(1, 600), standing(2, 300), standing(3, 100)];
        let payouts = PayoutModel::ProportionalToValue.distribute(1000, &standings);
        assert_eq!(payouts, vec![600, 300, 100]);
    }

    #[test]
    fn test_proportional_rounding_sums_to_pool() {
        let standings = vec![standing(1, 1), standing(2, 1), standing(3, 1)];
        let payouts = PayoutModel::ProportionalToValue.distribute(100, &standings);
        assert_eq!(payouts.iter().sum::<i64>(), 100);
        assert_eq!(payouts, vec![34, 33, 33]);
    }

    #[test]
    fn test_proportional_with_zero_total_value() {
        let standings = vec![standing(1, 0), standing(2, -50)];
        let payouts = PayoutModel::ProportionalToValue.distribute(200, &standings);
        assert_eq!(payouts, vec![200, 0]);
    }

    #[test]
    fn test_distribute_empty_or_zero_pool() {
        assert!(PayoutModel::WinnerTakeAll.distribute(100, &[]).is_empty());
        let standings = vec![standing(1, 10), standing(2, 5)];
        assert_eq!(
            PayoutModel::WinnerTakeAll.distribute(0, &standings),
            vec![0, 0]
        );
    }

    #[test]
    fn test_rake_percentage() {
        let config = RakeConfig {
            percentage_bps: 1_000, // 10%
            min_amount: 0,
            max_amount: 1_000_000,
        };
        assert_eq!(config.rake_for(300), 30);
        assert_eq!(config.rake_for(0), 0);
    }

    #[test]
    fn test_rake_clamped_to_band_and_pool() {
        let config = RakeConfig {
            percentage_bps: 1_000,
            min_amount: 50,
            max_amount: 200,
        };
        assert_eq!(config.rake_for(300), 50, "below min clamps up");
        assert_eq!(config.rake_for(5_000), 200, "above max clamps down");
        assert_eq!(config.rake_for(40), 40, "never exceeds the pool");
    }

    #[test]
    fn test_member_result_classification() {
        assert_eq!(MemberResult::classify(270, 100), MemberResult::Win);
        assert_eq!(MemberResult::classify(100, 100), MemberResult::Breakeven);
        assert_eq!(MemberResult::classify(0, 100), MemberResult::Loss);
    }
}
