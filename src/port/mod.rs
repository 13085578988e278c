//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Role coordinator      │
//!                    │  (application layer)    │
//!                    └────────────┬────────────┘
//!                                 │ ContainerRuntime
//!                                 ▼
//!                 ┌───────────────────────────────┐
//!                 │ docker / podman CLI adapter   │
//!                 └───────────────────────────────┘
//! ```

mod runtime;

pub use runtime::{ContainerHandle, ContainerRuntime};
