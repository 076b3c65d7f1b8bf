use crate::domain::errors::ValidationError;

/// Realized profit and loss in account currency.
///
/// Unlike Price, PnL can be negative to represent losses.
/// The value is always finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PnL(f64);

impl PnL {
    /// Create a new PnL value
    ///
    /// # Errors
    /// Returns ValidationError::MustBeFinite if the value is NaN or infinite
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite("pnl"));
        }
        Ok(PnL(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Check if this represents a profit (strictly positive value)
    pub fn is_profit(&self) -> bool {
        self.0 > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.0 < 0.0
    }

    pub fn zero() -> Self {
        PnL(0.0)
    }

    /// This amount as a percentage of `base`.
    ///
    /// A zero base yields 0 rather than an infinite percentage.
    pub fn percent_of(&self, base: f64) -> f64 {
        percent_of(self.0, base)
    }
}

/// `value / base * 100`, or 0 when `base` is zero.
pub fn percent_of(value: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        value / base * 100.0
    }
}

impl std::fmt::Display for PnL {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 >= 0.0 {
            write!(f, "+${:.2}", self.0)
        } else {
            write!(f, "-${:.2}", self.0.abs())
        }
    }
}

impl std::ops::Add for PnL {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        PnL(self.0 + other.0)
    }
}
