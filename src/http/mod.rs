//! HTTP front end for the fixed-window rate limit service.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, ApiError, RateLimitRequest, RATE_LIMIT_PATH};
