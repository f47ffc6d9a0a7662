//! Integration tests for the Undertow gateway
//!
//! Drive the HTTP router over the simulated engine, either in-process with
//! `tower::ServiceExt::oneshot` or through a real listener when connection
//! behavior matters.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/range_validation.rs"]
mod range_validation;

#[path = "integration/session_dedup.rs"]
mod session_dedup;

#[path = "integration/status_api.rs"]
mod status_api;

#[path = "integration/readiness.rs"]
mod readiness;

#[path = "integration/local_catalog.rs"]
mod local_catalog;

#[path = "integration/transcode.rs"]
mod transcode;
