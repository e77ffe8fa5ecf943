//! Domain-level building blocks shared across the API and sweeper crates.
//!
//! Configuration loading, the record-store contracts (including the
//! expirable record lifecycle), models for custom domains and branding, the
//! supporting services and the per-action logic objects all live here so
//! that the HTTP surface stays a thin dispatcher.

pub mod config;
pub mod logic;
pub mod model;
pub mod services;
pub mod storage;

pub use model::*;
pub use storage::*;
