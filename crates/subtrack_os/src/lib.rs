#![forbid(unsafe_code)]

pub mod auth;
pub mod board;
pub mod gateway;
