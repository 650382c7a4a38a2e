#![forbid(unsafe_code)]

pub mod subscription_cli;
