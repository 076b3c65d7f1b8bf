use thiserror::Error;

/// Input rejected before it reaches the ledger.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} must be positive")]
    MustBePositive(&'static str),

    #[error("{0} must be finite")]
    MustBeFinite(&'static str),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Unknown {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },

    #[error("Trade {trade_id} does not belong to challenge {challenge_id}")]
    ForeignTrade {
        trade_id: String,
        challenge_id: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors raised by ledger operations.
///
/// Every variant except `Internal` is a caller mistake and is surfaced as a
/// 4xx response; none of them is retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Challenge {challenge_id} is not active (status: {status})")]
    ChallengeNotActive { challenge_id: String, status: String },

    #[error("Trade {trade_id} is already closed")]
    TradeAlreadyClosed { trade_id: String },

    #[error("Insufficient balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn challenge_not_found(id: &str) -> Self {
        LedgerError::NotFound {
            entity: "Challenge",
            id: id.to_string(),
        }
    }

    pub fn trade_not_found(id: &str) -> Self {
        LedgerError::NotFound {
            entity: "Trade",
            id: id.to_string(),
        }
    }

    /// Machine-readable error kind returned to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::ChallengeNotActive { .. } => "challenge_not_active",
            LedgerError::TradeAlreadyClosed { .. } => "trade_already_closed",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::MarketDataUnavailable(_) => "market_data_unavailable",
            LedgerError::Internal(_) => "internal_error",
        }
    }
}

/// Errors reported by a ledger store implementation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// A conditional write found the row in an unexpected state.
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        LedgerError::Internal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_converts_into_ledger_error() {
        let err: LedgerError = ValidationError::MustBePositive("quantity").into();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_insufficient_balance_message() {
        let err = LedgerError::InsufficientBalance {
            required: 6000.0,
            available: 5000.0,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 6000.00, available 5000.00"
        );
        assert_eq!(err.kind(), "insufficient_balance");
    }

    #[test]
    fn test_store_error_becomes_internal() {
        let err: LedgerError = StoreError::Backend("disk full".to_string()).into();
        assert!(matches!(err, LedgerError::Internal(_)));
        assert_eq!(err.kind(), "internal_error");
    }

    #[test]
    fn test_not_found_helpers() {
        assert_eq!(
            LedgerError::trade_not_found("t-1").to_string(),
            "Trade not found: t-1"
        );
        assert_eq!(
            LedgerError::challenge_not_found("c-1").to_string(),
            "Challenge not found: c-1"
        );
    }
}
