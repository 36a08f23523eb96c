//! Error types for core parsing operations

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing addresses and amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Address is not 20 bytes of hex
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Amount string could not be parsed
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Amount has more fractional digits than the token supports
    #[error("Too many decimal places: {given} > {max}")]
    TooManyDecimals { given: usize, max: u8 },

    /// Amount does not fit in 128 bits
    #[error("Amount overflow")]
    Overflow,
}

impl CoreError {
    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidAddress(_) => 1001,
            Self::InvalidAmount(_) | Self::TooManyDecimals { .. } => 1002,
            Self::Overflow => 1003,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidAddress("0x12".to_string());
        assert_eq!(err.to_string(), "Invalid address: 0x12");

        let err = CoreError::TooManyDecimals { given: 20, max: 18 };
        assert!(err.to_string().contains("20 > 18"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::InvalidAddress(String::new()).code(), 1001);
        assert_eq!(CoreError::Overflow.code(), 1003);
    }
}
