//! Gatewatch - Adaptive Rate Limiting Middleware
//!
//! This crate implements tiered, per-identifier rate limiting for axum
//! services: fixed-window counters with TTL expiry, escalating violation
//! tracking, and automatic temporary blocking of abusive clients. Counter
//! state lives behind a store trait so single-instance deployments can use
//! the built-in in-memory store while multi-instance deployments plug in a
//! shared backend.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
