//! Splicer - marker-driven audio splicing
//!
//! This library crate exposes the binary's wiring for integration testing.

pub mod app;
pub mod config;
pub mod fetch;
