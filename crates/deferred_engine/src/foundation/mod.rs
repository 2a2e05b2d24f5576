//! Foundation utilities shared across the engine
//!
//! Math types, logging setup, and frame timing. These modules carry no
//! Vulkan dependencies and are usable from tests directly.

pub mod logging;
pub mod math;
pub mod time;
