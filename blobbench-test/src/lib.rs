//! Test utilities for blobbench.
//!
//! This crate provides utilities to facilitate testing of blobbench and its transports. See the
//! modules for all available utilities.

pub mod server;
pub mod tracing;
