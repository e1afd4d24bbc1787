//! Inbound HTTP surface.

pub mod error;
pub mod params;
pub mod routes;

pub use error::ApiError;
