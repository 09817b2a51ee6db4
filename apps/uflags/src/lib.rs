//! # uflags Library
//!
//! This library exposes the uflags modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;

// Re-export uflags_core for convenience
pub use uflags_core;
