#![forbid(unsafe_code)]

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    UnknownVariant {
        field: &'static str,
        got: String,
        allowed: &'static [&'static str],
    },
    InvalidDate {
        field: &'static str,
        got: String,
    },
}

impl ContractViolation {
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidValue { field, .. }
            | Self::UnknownVariant { field, .. }
            | Self::InvalidDate { field, .. } => field,
        }
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => write!(f, "{field} {reason}"),
            Self::UnknownVariant {
                field,
                got,
                allowed,
            } => write!(
                f,
                "{field} has unknown value '{got}'. allowed: {}",
                allowed.join(", ")
            ),
            Self::InvalidDate { field, got } => {
                write!(f, "{field} must be an ISO date (YYYY-MM-DD), got '{got}'")
            }
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}
