//! Application layer - orchestration of domain logic.
//!
//! This layer turns descriptors into installed patches:
//! - Target resolution (descriptor to dotted path)
//! - Option assembly (ambiguity, bypass, async wrapping)
//! - Nested configuration of generated stand-ins
//! - Lifecycle management (install, start, stop, teardown)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from how symbols are looked up and substituted.

pub mod configure;
pub mod lifecycle;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod resolver;
pub mod spec_builder;
