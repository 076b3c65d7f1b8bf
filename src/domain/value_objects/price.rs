use crate::domain::errors::ValidationError;

/// Positive, finite instrument price.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite("price"));
        }
        if value <= 0.0 {
            return Err(ValidationError::MustBePositive("price"));
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Notional value of `quantity` units at this price.
    pub fn notional(&self, quantity: super::quantity::Quantity) -> f64 {
        self.0 * quantity.value()
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
