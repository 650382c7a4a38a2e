#![forbid(unsafe_code)]

pub mod common;
pub mod subscription;

pub use common::{ContractViolation, SchemaVersion, Validate};
