//! Budget ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bull pen (room) ID type
pub type BullPenId = i64;

/// Per-user, per-currency budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub user_id: i64,
    pub currency: String,
    /// Funds the user can spend or have debited
    pub available_balance: i64,
    /// Funds reserved (e.g., a room buy-in) but not spendable
    pub locked_balance: i64,
    pub status: BudgetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    /// Total balance across the spendable and reserved halves.
    pub fn total_balance(&self) -> i64 {
        self.available_balance + self.locked_balance
    }
}

/// Budget lifecycle status. Budgets are never hard-deleted, only frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Active,
    Frozen,
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetStatus::Active => write!(f, "active"),
            BudgetStatus::Frozen => write!(f, "frozen"),
        }
    }
}

impl BudgetStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "frozen" => BudgetStatus::Frozen,
            _ => BudgetStatus::Active,
        }
    }
}

/// Entry direction relative to the user's available balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryDirection {
    In,
    Out,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::In => write!(f, "IN"),
            EntryDirection::Out => write!(f, "OUT"),
        }
    }
}

impl EntryDirection {
    pub fn parse(s: &str) -> Self {
        match s {
            "OUT" => EntryDirection::Out,
            _ => EntryDirection::In,
        }
    }
}

/// Operation type recorded on every log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Credit,
    Debit,
    Lock,
    Unlock,
    TransferIn,
    TransferOut,
    Adjustment,
    RoomSettlementWin,
    RoomSettlementLoss,
    RoomSettlementBreakeven,
    RoomCancellationRefund,
    /// Operator's cut; only appears on house-account entries, never on a
    /// member's budget
    Rake,
    BonusRedemption,
}

impl OperationType {
    /// Operation types written by the settlement engine.
    pub fn is_settlement(self) -> bool {
        matches!(
            self,
            OperationType::RoomSettlementWin
                | OperationType::RoomSettlementLoss
                | OperationType::RoomSettlementBreakeven
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CREDIT" => OperationType::Credit,
            "DEBIT" => OperationType::Debit,
            "LOCK" => OperationType::Lock,
            "UNLOCK" => OperationType::Unlock,
            "TRANSFER_IN" => OperationType::TransferIn,
            "TRANSFER_OUT" => OperationType::TransferOut,
            "ADJUSTMENT" => OperationType::Adjustment,
            "ROOM_SETTLEMENT_WIN" => OperationType::RoomSettlementWin,
            "ROOM_SETTLEMENT_LOSS" => OperationType::RoomSettlementLoss,
            "ROOM_SETTLEMENT_BREAKEVEN" => OperationType::RoomSettlementBreakeven,
            "ROOM_CANCELLATION_REFUND" => OperationType::RoomCancellationRefund,
            "RAKE" => OperationType::Rake,
            "BONUS_REDEMPTION" => OperationType::BonusRedemption,
            _ => return None,
        })
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationType::Credit => "CREDIT",
            OperationType::Debit => "DEBIT",
            OperationType::Lock => "LOCK",
            OperationType::Unlock => "UNLOCK",
            OperationType::TransferIn => "TRANSFER_IN",
            OperationType::TransferOut => "TRANSFER_OUT",
            OperationType::Adjustment => "ADJUSTMENT",
            OperationType::RoomSettlementWin => "ROOM_SETTLEMENT_WIN",
            OperationType::RoomSettlementLoss => "ROOM_SETTLEMENT_LOSS",
            OperationType::RoomSettlementBreakeven => "ROOM_SETTLEMENT_BREAKEVEN",
            OperationType::RoomCancellationRefund => "ROOM_CANCELLATION_REFUND",
            OperationType::Rake => "RAKE",
            OperationType::BonusRedemption => "BONUS_REDEMPTION",
        };
        write!(f, "{s}")
    }
}

/// Budget log entry (append-only, immutable once written)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLogEntry {
    pub id: i64,
    pub user_id: i64,
    pub direction: EntryDirection,
    pub operation_type: OperationType,
    pub amount: i64,
    pub currency: String,
    /// Snapshot of `available_balance` before the operation, for audit replay
    pub balance_before: i64,
    pub balance_after: i64,
    pub bull_pen_id: Option<BullPenId>,
    pub season_id: Option<i64>,
    /// Groups related entries: both legs of a transfer, or all payouts of
    /// one room's settlement
    pub correlation_id: Option<String>,
    /// The opposite leg of a transfer
    pub related_log_id: Option<i64>,
    /// Free-form audit metadata; opaque at this boundary, never control flow
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Insert form of a log entry
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub user_id: i64,
    pub direction: EntryDirection,
    pub operation_type: OperationType,
    pub amount: i64,
    pub currency: String,
    pub balance_before: i64,
    pub balance_after: i64,
    pub bull_pen_id: Option<BullPenId>,
    pub season_id: Option<i64>,
    pub correlation_id: Option<String>,
    pub related_log_id: Option<i64>,
    pub meta: serde_json::Value,
}

/// Request body for credit, debit, lock, and unlock operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub user_id: i64,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    /// Override for the logged operation type (e.g. a settlement payout is
    /// a credit logged as `ROOM_SETTLEMENT_WIN`). Defaults per operation.
    #[serde(default)]
    pub operation_type: Option<OperationType>,
    #[serde(default)]
    pub bull_pen_id: Option<BullPenId>,
    #[serde(default)]
    pub season_id: Option<i64>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

impl OperationRequest {
    pub fn new(user_id: i64, amount: i64) -> Self {
        Self {
            user_id,
            amount,
            currency: None,
            operation_type: None,
            bull_pen_id: None,
            season_id: None,
            correlation_id: None,
            meta: None,
        }
    }

    pub fn with_operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    pub fn with_bull_pen(mut self, bull_pen_id: BullPenId) -> Self {
        self.bull_pen_id = Some(bull_pen_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Request body for admin adjustments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub user_id: i64,
    pub amount: i64,
    pub direction: EntryDirection,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Request body for wallet-to-wallet transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Result of a single budget operation.
///
/// `idempotent = true` means the response was served from the idempotency
/// guard's stored result rather than freshly computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub log_id: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub idempotent: bool,
}

/// Result of a transfer: both legs plus the shared correlation ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub from_log_id: i64,
    pub to_log_id: i64,
    pub from_balance_before: i64,
    pub from_balance_after: i64,
    pub to_balance_before: i64,
    pub to_balance_after: i64,
    pub correlation_id: String,
    pub idempotent: bool,
}

/// Filter for paginated log history reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub operation_type: Option<OperationType>,
    pub bull_pen_id: Option<BullPenId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_display_parse_round_trip() {
        let all = [
            OperationType::Credit,
            OperationType::Debit,
            OperationType::Lock,
            OperationType::Unlock,
            OperationType::TransferIn,
            OperationType::TransferOut,
            OperationType::Adjustment,
            OperationType::RoomSettlementWin,
            OperationType::RoomSettlementLoss,
            OperationType::RoomSettlementBreakeven,
            OperationType::RoomCancellationRefund,
            OperationType::Rake,
            OperationType::BonusRedemption,
        ];
        for op in all {
            assert_eq!(OperationType::parse(&op.to_string()), Some(op));
        }
        assert_eq!(OperationType::parse("NOT_AN_OP"), None);
    }

    #[test]
    fn test_settlement_operation_types() {
        assert!(OperationType::RoomSettlementWin.is_settlement());
        assert!(OperationType::RoomSettlementLoss.is_settlement());
        assert!(OperationType::RoomSettlementBreakeven.is_settlement());
        assert!(!OperationType::Credit.is_settlement());
        assert!(!OperationType::Unlock.is_settlement());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(EntryDirection::parse("IN"), EntryDirection::In);
        assert_eq!(EntryDirection::parse("OUT"), EntryDirection::Out);
    }

    #[test]
    fn test_total_balance() {
        let budget = Budget {
            user_id: 1,
            currency: "BUX".to_string(),
            available_balance: 70,
            locked_balance: 30,
            status: BudgetStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(budget.total_balance(), 100);
    }
}
