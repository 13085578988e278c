//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`runtime`] - [`ScriptedRuntime`](runtime::ScriptedRuntime), a
//!   [`ContainerRuntime`](crate::port::ContainerRuntime) double with scripted
//!   probe results and a recorded event log.
//! - [`config`] - Canonical variable maps and plans with fast health checks.

pub mod config;
pub mod runtime;
