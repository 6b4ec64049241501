//! Infrastructure layer - adapters behind the application ports.
//!
//! This layer provides:
//! - The symbol registry patchable code calls through
//! - The reference patch primitive
//! - The per-test fixture

pub mod fixture;
pub mod patcher;
pub mod symbols;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides a recording primitive and a capturing
/// tracing layer.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// mocker-builder = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
