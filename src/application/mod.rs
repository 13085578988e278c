//! Application services (use cases).
//!
//! These services sequence domain logic against the ports and know
//! nothing about the concrete container engine.

pub mod coordinator;
pub mod distribution;
