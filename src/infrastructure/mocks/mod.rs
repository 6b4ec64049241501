//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of the lifecycle manager.

pub mod layer;
pub mod patcher;

pub use layer::{CapturedEvent, MockCaptureLayer};
pub use patcher::{PrimitiveCall, RecordingPatcher};
