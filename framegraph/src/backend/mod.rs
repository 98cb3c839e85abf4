//! Backends for the frame device and command protocol.
//!
//! # Available Backends
//!
//! - `dummy` (default): in-memory device that records every command it is
//!   given, for tests and headless tooling
//! - `vulkan-backend`: native Vulkan backend using ash and gpu-allocator

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;
