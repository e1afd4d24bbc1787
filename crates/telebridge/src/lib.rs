//! Top-level facade crate for telebridge.
//!
//! Re-exports the state core and the gateway library so users can depend on a single crate.

pub mod core {
    pub use telebridge_core::*;
}

pub mod gateway {
    pub use telebridge_gateway::*;
}
