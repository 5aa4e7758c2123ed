//! Request handler module
//!
//! Front-end listener: serves the built single-page bundle and realises the
//! client-side route table on the server (redirects and history fallback).

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
