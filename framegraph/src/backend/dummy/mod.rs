//! Dummy backend for testing and development.
//!
//! No GPU work is performed. The device hands out integer handles and keeps
//! counters of what was created; [`DummyCommand`] records every barrier,
//! pass bracket, binding and draw as a [`CommandEvent`] so callers can
//! assert on the exact command stream a graph produces.

mod cache;
mod command;
mod device;
mod resource;

pub use cache::{DummyPipelineCache, DummyShaderCache};
pub use command::{CommandEvent, DummyCommand, DummyContext};
pub use device::{DummyBuffer, DummyCommandPool, DummyDescriptorPool, DummyDevice, DummyStats};
pub use resource::{DummyResource, DummyResourceFactory};
