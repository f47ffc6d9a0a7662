//! Undertow Web - HTTP API for the streaming gateway
//!
//! Thin axum layer over [`undertow_core::Gateway`]: JSON status and health
//! endpoints plus the byte-streaming and transcoding routes.

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, ServerError, build_router, run_server, serve};
