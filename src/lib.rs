//! Quotagate - Fixed-Window Rate Limiting Service
//!
//! This crate decides whether inbound requests exceed a configured rate.
//! Counters live in a shared Redis-compatible store, so any number of
//! stateless instances make consistent decisions.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
