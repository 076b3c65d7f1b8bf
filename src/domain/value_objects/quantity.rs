use crate::domain::errors::ValidationError;

/// Positive, finite trade size.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quantity(f64);

impl Quantity {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite("quantity"));
        }
        if value <= 0.0 {
            return Err(ValidationError::MustBePositive("quantity"));
        }
        Ok(Quantity(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}
