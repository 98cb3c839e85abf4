//! # RedLilium Core
//!
//! Small utilities shared by the frame graph crates. At the moment this is
//! the profiling layer; every macro compiles to nothing unless the
//! `profiling` feature is enabled.

pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core version. Binaries call this once after installing a logger.
pub fn init() {
    log::info!("RedLilium Core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_disabled_macros_expand() {
        // With profiling off these must still be valid in statement position.
        crate::profile_scope!("scope");
        crate::profile_function!();
        crate::profile_plot!("value", 1.0);
        crate::frame_mark!();
    }
}
