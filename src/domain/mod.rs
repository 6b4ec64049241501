//! Domain layer - pure types with no I/O and no dependencies on ports.
//!
//! This layer contains the vocabulary of the patching engine:
//! - Target descriptors and canonical resolved paths
//! - Patch options, warnings and nested configuration commands
//! - Dynamic values, deferred values and generated stand-ins
//! - Patch metadata and its lifecycle state machine
//!
//! All types in this layer are pure and easily testable.

pub mod configure;
pub mod error;
pub mod metadata;
pub mod options;
pub mod path;
pub mod stand_in;
pub mod target;
pub mod value;
