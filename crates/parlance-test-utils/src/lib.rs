#![deny(unsafe_code)]

//! Shared test utilities for the Parlance workspace.
//!
//! Provides config builders, history fixtures, a scripted LLM provider,
//! temporary workspaces, and tracing helpers so that individual crate tests
//! stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! parlance-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixtures;
pub mod mock_provider;
pub mod tracing_setup;
pub mod workspace;

pub use mock_provider::MockProvider;
pub use workspace::TestWorkspace;
