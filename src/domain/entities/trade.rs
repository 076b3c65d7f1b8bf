use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{pnl::PnL, price::Price, quantity::Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            _ => Err(ValidationError::UnknownVariant {
                field: "side",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TradeStatus::Open),
            "closed" => Ok(TradeStatus::Closed),
            other => Err(ValidationError::UnknownVariant {
                field: "trade status",
                value: other.to_string(),
            }),
        }
    }
}

/// A position opened against a challenge's virtual balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub challenge_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub status: TradeStatus,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn open(
        id: String,
        challenge_id: String,
        symbol: String,
        side: TradeSide,
        quantity: Quantity,
        entry_price: Price,
        open_time: DateTime<Utc>,
    ) -> Self {
        Trade {
            id,
            challenge_id,
            symbol,
            side,
            quantity: quantity.value(),
            entry_price: entry_price.value(),
            exit_price: None,
            pnl: None,
            pnl_pct: None,
            status: TradeStatus::Open,
            open_time,
            close_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Capital committed at entry.
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    /// Realized P&L if the position were closed at `exit_price`.
    pub fn realized_pnl(&self, exit_price: Price) -> Result<PnL, ValidationError> {
        let diff = match self.side {
            TradeSide::Buy => exit_price.value() - self.entry_price,
            TradeSide::Sell => self.entry_price - exit_price.value(),
        };
        PnL::new(diff * self.quantity)
    }
}

/// Normalize and validate a ticker symbol.
pub fn normalize_symbol(symbol: &str) -> Result<String, ValidationError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || trimmed.len() > 20 {
        return Err(ValidationError::InvalidSymbol(symbol.to_string()));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '/' | '.' | '_' | '='))
    {
        return Err(ValidationError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}
