//! Core error types for SLUICE.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Encoding or decoding failed
    Encoding {
        /// Underlying codec message
        reason: String,
    },

    /// Amount could not be parsed or represented
    InvalidAmount {
        /// Offending input and parse error
        reason: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding { reason } => write!(f, "Encoding error: {}", reason),
            Self::InvalidAmount { reason } => write!(f, "Invalid amount: {}", reason),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}

impl From<postcard::Error> for CoreError {
    fn from(err: postcard::Error) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = "12x".parse::<crate::Wei>().unwrap_err();
        assert!(format!("{}", err).starts_with("Invalid amount: \"12x\""));

        let err = CoreError::Encoding {
            reason: "unexpected end".to_string(),
        };
        assert_eq!(format!("{}", err), "Encoding error: unexpected end");
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u64>("not json").unwrap_err();
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::Encoding { .. }));
    }
}
