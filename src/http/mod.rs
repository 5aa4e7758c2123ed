//! HTTP protocol layer module
//!
//! Protocol helpers shared by the front-end server and the management API,
//! decoupled from either one's routing.

pub mod cache;
pub mod mime;
pub mod response;

// Re-export commonly used types
pub use response::{
    build_304_response, build_404_response, build_405_response, build_413_response,
    build_cached_response, build_health_response, build_options_response,
    build_redirect_response,
};
