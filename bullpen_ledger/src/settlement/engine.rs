//! Room settlement engine.
//!
//! When a room completes, the engine marks every member's portfolio to
//! market, ranks the members, takes the operator's rake from the buy-in
//! pool, distributes the remainder by the configured payout model, and
//! writes the unlock and payout entries through the budget engine.
//!
//! Settlement is safe to retry: the correlation id is minted once per room
//! and every budget mutation derives its idempotency key from it, so a
//! re-run after a crash or partial failure replays the entries that already
//! committed and performs only the missing ones.

use super::models::{
    BullPen, BullPenMember, BullPenState, CancellationReport, MemberResult, MemberSettlement,
    MemberStanding, PayoutModel, RakeConfig, SettlementReport, SettlementStatus, SweepOutcome,
};
use crate::budget::{
    BudgetEngine, BudgetError, BullPenId, OperationRequest, OperationType,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Settlement errors
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Bull pen not found: {0}")]
    NotFound(BullPenId),

    #[error("Bull pen {bull_pen_id} member not found: {user_id}")]
    MemberNotFound { bull_pen_id: BullPenId, user_id: i64 },

    #[error("Bull pen {bull_pen_id} is not completed (state: {state})")]
    RoomNotCompleted {
        bull_pen_id: BullPenId,
        state: BullPenState,
    },

    #[error("Settlement already in progress for bull pen {0}")]
    InProgress(BullPenId),

    #[error("Bull pen {0} is already settled")]
    AlreadySettled(BullPenId),

    #[error("Settlement of bull pen {bull_pen_id} partially failed for users {failed_user_ids:?}")]
    PartialFailure {
        bull_pen_id: BullPenId,
        failed_user_ids: Vec<i64>,
    },

    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SettlementResult<T> = Result<T, SettlementError>;

/// How long an `in_progress` claim is honored before a retry may take the
/// room over. Covers a settler that crashed between claiming and finishing.
const STALE_CLAIM_SECS: i64 = 300;

impl SettlementError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::NotFound(_) | SettlementError::MemberNotFound { .. } => "NOT_FOUND",
            SettlementError::RoomNotCompleted { .. } => "VALIDATION_ERROR",
            SettlementError::InProgress(_) => "CONCURRENT_REQUEST",
            SettlementError::AlreadySettled(_) => "SETTLEMENT_ALREADY_COMPLETE",
            SettlementError::PartialFailure { .. } => "SETTLEMENT_PARTIAL_FAILURE",
            SettlementError::Budget(e) => e.code(),
            SettlementError::Database(_) | SettlementError::Serialization(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to callers.
    pub fn client_message(&self) -> String {
        match self {
            SettlementError::Database(_) => "An internal error occurred".to_string(),
            SettlementError::Serialization(_) => "An internal error occurred".to_string(),
            SettlementError::Budget(e) => e.client_message(),
            other => other.to_string(),
        }
    }
}

/// Mark-to-market price lookup. Market data itself is an external
/// collaborator; the engine only asks for last prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Last traded price for a symbol, in integer minor-units.
    async fn last_price(&self, symbol: &str) -> Option<i64>;
}

/// Static price table, used in tests and for rooms that close positions
/// before settlement.
#[derive(Debug, Clone, Default)]
pub struct FixedPrices {
    prices: HashMap<String, i64>,
}

impl FixedPrices {
    pub fn new(prices: HashMap<String, i64>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl PriceSource for FixedPrices {
    async fn last_price(&self, symbol: &str) -> Option<i64> {
        self.prices.get(symbol).copied()
    }
}

/// Room settlement engine
#[derive(Clone)]
pub struct SettlementEngine {
    pool: Arc<PgPool>,
    engine: BudgetEngine,
    prices: Arc<dyn PriceSource>,
    payout_model: PayoutModel,
}

impl SettlementEngine {
    pub fn new(
        pool: Arc<PgPool>,
        engine: BudgetEngine,
        prices: Arc<dyn PriceSource>,
        payout_model: PayoutModel,
    ) -> Self {
        Self {
            pool,
            engine,
            prices,
            payout_model,
        }
    }

    /// Settle a completed room.
    ///
    /// Idempotent: an already-settled room returns a no-op report, and a
    /// retry after a partial failure re-runs only the members whose entries
    /// did not commit.
    ///
    /// # Errors
    ///
    /// * `RoomNotCompleted` - the room is still running or was cancelled
    /// * `InProgress` - another settlement run holds the room
    /// * `PartialFailure` - some members could not be settled; retryable
    pub async fn settle_room(&self, bull_pen_id: BullPenId) -> SettlementResult<SettlementReport> {
        let room = self.get_room(bull_pen_id).await?;

        if room.settlement_status == SettlementStatus::Completed {
            info!("bull pen {bull_pen_id} already settled, nothing to do");
            return Ok(SettlementReport::already_complete(
                bull_pen_id,
                room.settlement_correlation_id,
            ));
        }
        if room.state != BullPenState::Completed {
            return Err(SettlementError::RoomNotCompleted {
                bull_pen_id,
                state: room.state,
            });
        }

        let correlation_id = self.claim_room(bull_pen_id).await?;
        info!("settling bull pen {bull_pen_id} ({correlation_id})");

        let members = self.get_members(bull_pen_id).await?;
        let standings = self.rank_members(&members).await;

        let pool: i64 = standings.iter().map(|s| s.buy_in).sum();
        let rake = match self.active_rake_config().await? {
            Some(config) => config.rake_for(pool),
            None => 0,
        };
        let payouts = self.payout_model.distribute(pool - rake, &standings);

        let mut report_members = Vec::with_capacity(standings.len());
        let mut failed_user_ids = Vec::new();
        for (idx, (standing, &payout)) in standings.iter().zip(&payouts).enumerate() {
            match self
                .settle_member(&room, &correlation_id, standing, payout)
                .await
            {
                Ok(result) => report_members.push(MemberSettlement {
                    user_id: standing.user_id,
                    rank: idx + 1,
                    portfolio_value: standing.portfolio_value,
                    buy_in: standing.buy_in,
                    payout,
                    result,
                }),
                Err(e) => {
                    error!(
                        "settlement of user {} in bull pen {bull_pen_id} failed: {e}",
                        standing.user_id
                    );
                    failed_user_ids.push(standing.user_id);
                }
            }
        }

        if !failed_user_ids.is_empty() {
            self.set_settlement_status(bull_pen_id, SettlementStatus::Failed)
                .await?;
            return Err(SettlementError::PartialFailure {
                bull_pen_id,
                failed_user_ids,
            });
        }

        self.record_rake(bull_pen_id, rake, &correlation_id).await?;
        self.set_settlement_status(bull_pen_id, SettlementStatus::Completed)
            .await?;
        info!(
            "settled bull pen {bull_pen_id}: pool {pool}, rake {rake}, {} members",
            report_members.len()
        );

        Ok(SettlementReport {
            bull_pen_id,
            correlation_id,
            pool,
            rake,
            members: report_members,
            already_complete: false,
        })
    }

    /// Settle every completed room whose settlement is pending, failed, or
    /// stuck in a stale `in_progress` claim.
    ///
    /// Per-room failures are logged and the sweep continues.
    pub async fn run_sweep(&self) -> SettlementResult<SweepOutcome> {
        let rows = sqlx::query(
            "SELECT id FROM bull_pens
             WHERE state = 'completed'
               AND (settlement_status IN ('pending', 'failed')
                    OR (settlement_status = 'in_progress'
                        AND updated_at < NOW() - make_interval(secs => $1)))
             ORDER BY id",
        )
        .bind(STALE_CLAIM_SECS as f64)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut outcome = SweepOutcome::default();
        for row in rows {
            let bull_pen_id: BullPenId = row.get("id");
            match self.settle_room(bull_pen_id).await {
                Ok(_) => outcome.settled.push(bull_pen_id),
                Err(e) => {
                    warn!("sweep: settlement of bull pen {bull_pen_id} failed: {e}");
                    outcome.failed.push(bull_pen_id);
                }
            }
        }
        Ok(outcome)
    }

    /// Cancel a room and refund every member's buy-in.
    ///
    /// Idempotent: refunds are keyed off the room's cancellation correlation
    /// id, so a re-run replays them.
    ///
    /// # Errors
    ///
    /// * `AlreadySettled` - a settled room cannot be cancelled
    pub async fn cancel_room(&self, bull_pen_id: BullPenId) -> SettlementResult<CancellationReport> {
        let room = self.get_room(bull_pen_id).await?;
        if room.settlement_status == SettlementStatus::Completed {
            return Err(SettlementError::AlreadySettled(bull_pen_id));
        }

        let correlation_id = cancellation_correlation_id(bull_pen_id);
        let members = self.get_members(bull_pen_id).await?;

        let mut refunded_user_ids = Vec::with_capacity(members.len());
        for member in &members {
            self.refund_member(member, &correlation_id).await?;
            refunded_user_ids.push(member.user_id);
        }

        sqlx::query("UPDATE bull_pens SET state = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(bull_pen_id)
            .execute(self.pool.as_ref())
            .await?;
        info!(
            "cancelled bull pen {bull_pen_id}, refunded {} members",
            refunded_user_ids.len()
        );

        Ok(CancellationReport {
            bull_pen_id,
            correlation_id,
            refunded_user_ids,
        })
    }

    /// Refund a single member who left before the room settled.
    pub async fn cancel_member(
        &self,
        bull_pen_id: BullPenId,
        user_id: i64,
    ) -> SettlementResult<CancellationReport> {
        let room = self.get_room(bull_pen_id).await?;
        if room.settlement_status == SettlementStatus::Completed {
            return Err(SettlementError::AlreadySettled(bull_pen_id));
        }

        let member = self
            .get_members(bull_pen_id)
            .await?
            .into_iter()
            .find(|m| m.user_id == user_id)
            .ok_or(SettlementError::MemberNotFound {
                bull_pen_id,
                user_id,
            })?;

        let correlation_id = cancellation_correlation_id(bull_pen_id);
        self.refund_member(&member, &correlation_id).await?;
        info!("refunded user {user_id} from bull pen {bull_pen_id}");

        Ok(CancellationReport {
            bull_pen_id,
            correlation_id,
            refunded_user_ids: vec![user_id],
        })
    }

    /// Claim the room for settlement, minting the correlation id on first
    /// claim and reusing it on retries.
    ///
    /// An `in_progress` claim older than [`STALE_CLAIM_SECS`] is treated as
    /// abandoned and may be taken over, so a settler that died mid-run does
    /// not leave the room stuck.
    async fn claim_room(&self, bull_pen_id: BullPenId) -> SettlementResult<String> {
        let minted = format!(
            "room-{bull_pen_id}-settlement-{}",
            Utc::now().timestamp()
        );
        let row = sqlx::query(
            "UPDATE bull_pens
             SET settlement_status = 'in_progress',
                 settlement_correlation_id = COALESCE(settlement_correlation_id, $2),
                 updated_at = NOW()
             WHERE id = $1
               AND (settlement_status IN ('pending', 'failed')
                    OR (settlement_status = 'in_progress'
                        AND updated_at < NOW() - make_interval(secs => $3)))
             RETURNING settlement_correlation_id",
        )
        .bind(bull_pen_id)
        .bind(&minted)
        .bind(STALE_CLAIM_SECS as f64)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Ok(row.get("settlement_correlation_id")),
            // Zero rows: another run holds a live claim on the room.
            None => Err(SettlementError::InProgress(bull_pen_id)),
        }
    }

    /// Mark members to market and rank them: portfolio value descending,
    /// earlier last trade wins ties, then user id for determinism.
    async fn rank_members(&self, members: &[BullPenMember]) -> Vec<MemberStanding> {
        let mut standings = Vec::with_capacity(members.len());
        for member in members {
            let value = self.portfolio_value(member).await;
            standings.push(MemberStanding {
                user_id: member.user_id,
                buy_in: member.buy_in,
                portfolio_value: value,
                last_trade_at: member.last_trade_at,
            });
        }
        standings.sort_by(|a, b| {
            b.portfolio_value
                .cmp(&a.portfolio_value)
                .then_with(|| match (a.last_trade_at, b.last_trade_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        standings
    }

    /// final_cash plus the marked-to-market value of open positions. A
    /// symbol with no available price is valued at zero, as is a position
    /// whose value would not fit in i64.
    async fn portfolio_value(&self, member: &BullPenMember) -> i64 {
        let mut value = member.final_cash;
        if let Some(positions) = member.positions.as_object() {
            for (symbol, qty) in positions {
                let qty = qty.as_i64().unwrap_or(0);
                if qty == 0 {
                    continue;
                }
                match self.prices.last_price(symbol).await {
                    Some(price) => {
                        match qty.checked_mul(price).and_then(|v| value.checked_add(v)) {
                            Some(total) => value = total,
                            None => warn!(
                                "position {symbol} x{qty} of user {} in bull pen {} \
                                 overflows, valued at zero",
                                member.user_id, member.bull_pen_id
                            ),
                        }
                    }
                    None => warn!(
                        "no price for {symbol} held by user {} in bull pen {}",
                        member.user_id, member.bull_pen_id
                    ),
                }
            }
        }
        value
    }

    /// Unlock the buy-in and credit the payout for one member. Both budget
    /// operations are idempotent under the room's correlation id.
    async fn settle_member(
        &self,
        room: &BullPen,
        correlation_id: &str,
        standing: &MemberStanding,
        payout: i64,
    ) -> SettlementResult<MemberResult> {
        if standing.buy_in > 0 {
            let unlock = OperationRequest {
                user_id: standing.user_id,
                amount: standing.buy_in,
                currency: None,
                operation_type: None,
                bull_pen_id: Some(room.id),
                season_id: room.season_id,
                correlation_id: Some(correlation_id.to_string()),
                meta: None,
            };
            self.engine
                .unlock(&format!("{correlation_id}-unlock-{}", standing.user_id), unlock)
                .await?;
        }

        let result = MemberResult::classify(payout, standing.buy_in);
        if payout > 0 {
            let operation_type = match result {
                MemberResult::Win => OperationType::RoomSettlementWin,
                MemberResult::Breakeven => OperationType::RoomSettlementBreakeven,
                _ => OperationType::RoomSettlementLoss,
            };
            let credit = OperationRequest {
                user_id: standing.user_id,
                amount: payout,
                currency: None,
                operation_type: Some(operation_type),
                bull_pen_id: Some(room.id),
                season_id: room.season_id,
                correlation_id: Some(correlation_id.to_string()),
                meta: Some(serde_json::json!({
                    "portfolio_value": standing.portfolio_value,
                    "buy_in": standing.buy_in,
                })),
            };
            self.engine
                .credit(&format!("{correlation_id}-payout-{}", standing.user_id), credit)
                .await?;
        }

        sqlx::query(
            "UPDATE bull_pen_members SET payout = $1, result = $2
             WHERE bull_pen_id = $3 AND user_id = $4",
        )
        .bind(payout)
        .bind(result.to_string())
        .bind(room.id)
        .bind(standing.user_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result)
    }

    async fn refund_member(
        &self,
        member: &BullPenMember,
        correlation_id: &str,
    ) -> SettlementResult<()> {
        if member.buy_in > 0 {
            let refund = OperationRequest {
                user_id: member.user_id,
                amount: member.buy_in,
                currency: None,
                operation_type: Some(OperationType::RoomCancellationRefund),
                bull_pen_id: Some(member.bull_pen_id),
                season_id: None,
                correlation_id: Some(correlation_id.to_string()),
                meta: None,
            };
            self.engine
                .unlock(&format!("{correlation_id}-{}", member.user_id), refund)
                .await?;
        }

        sqlx::query(
            "UPDATE bull_pen_members SET payout = $1, result = $2
             WHERE bull_pen_id = $3 AND user_id = $4",
        )
        .bind(member.buy_in)
        .bind(MemberResult::Refunded.to_string())
        .bind(member.bull_pen_id)
        .bind(member.user_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    /// Record the operator's cut. One row per room; a retry after the row
    /// was written is a no-op.
    async fn record_rake(
        &self,
        bull_pen_id: BullPenId,
        amount: i64,
        correlation_id: &str,
    ) -> SettlementResult<()> {
        sqlx::query(
            "INSERT INTO rake_collections (bull_pen_id, amount, correlation_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (bull_pen_id) DO NOTHING",
        )
        .bind(bull_pen_id)
        .bind(amount)
        .bind(correlation_id)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn set_settlement_status(
        &self,
        bull_pen_id: BullPenId,
        status: SettlementStatus,
    ) -> SettlementResult<()> {
        sqlx::query(
            "UPDATE bull_pens SET settlement_status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(status.to_string())
        .bind(bull_pen_id)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn get_room(&self, bull_pen_id: BullPenId) -> SettlementResult<BullPen> {
        let row = sqlx::query(
            "SELECT id, state, settlement_status, settlement_correlation_id, season_id
             FROM bull_pens
             WHERE id = $1",
        )
        .bind(bull_pen_id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(SettlementError::NotFound(bull_pen_id))?;

        Ok(BullPen {
            id: row.get("id"),
            state: BullPenState::parse(&row.get::<String, _>("state")),
            settlement_status: SettlementStatus::parse(
                &row.get::<String, _>("settlement_status"),
            ),
            settlement_correlation_id: row.get("settlement_correlation_id"),
            season_id: row.get("season_id"),
        })
    }

    async fn get_members(&self, bull_pen_id: BullPenId) -> SettlementResult<Vec<BullPenMember>> {
        let rows = sqlx::query(
            "SELECT bull_pen_id, user_id, buy_in, final_cash, positions, last_trade_at
             FROM bull_pen_members
             WHERE bull_pen_id = $1
             ORDER BY user_id",
        )
        .bind(bull_pen_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BullPenMember {
                bull_pen_id: row.get("bull_pen_id"),
                user_id: row.get("user_id"),
                buy_in: row.get("buy_in"),
                final_cash: row.get("final_cash"),
                positions: row.get("positions"),
                last_trade_at: row
                    .get::<Option<chrono::NaiveDateTime>, _>("last_trade_at")
                    .map(|dt| dt.and_utc()),
            })
            .collect())
    }

    /// The single active rake configuration, if any.
    async fn active_rake_config(&self) -> SettlementResult<Option<RakeConfig>> {
        let row = sqlx::query(
            "SELECT percentage_bps, min_amount, max_amount
             FROM rake_configs
             WHERE is_active",
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|row| RakeConfig {
            percentage_bps: row.get("percentage_bps"),
            min_amount: row.get("min_amount"),
            max_amount: row.get("max_amount"),
        }))
    }
}

fn cancellation_correlation_id(bull_pen_id: BullPenId) -> String {
    format!("room-{bull_pen_id}-cancellation")
}
