//! Infrastructure layer.
//!
//! Technical concerns that support the adapters without containing
//! orchestration logic.
//!
//! # Submodules
//!
//! - [`process`] - Child process execution with return-code token handling

pub mod process;
