#![forbid(unsafe_code)]

pub mod document_store;
pub mod journal;
pub mod repo;
