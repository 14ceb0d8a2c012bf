//! HTTP boundary for the trade-outcome ensemble
//!
//! Exposes the router and configuration so integration tests can drive the
//! same handlers the binary serves.

pub mod api;
pub mod config;
