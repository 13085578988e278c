//! Outbound adapters (driven side).

pub mod compose;
pub mod container;
