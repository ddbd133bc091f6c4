//! Top-level facade crate for conflux.
//!
//! Re-exports the message model and the runtime so users can depend on a single crate.

pub mod core {
    pub use conflux_core::*;
}

pub mod runtime {
    pub use conflux_runtime::*;
}
