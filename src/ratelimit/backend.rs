//! Rate limiter trait the HTTP layer is written against.

use async_trait::async_trait;

use super::descriptor::RequestDescriptor;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The HTTP service is generic over this trait so handlers can be exercised
/// without a live counter store.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether a request carrying `descriptors` must be rejected.
    async fn should_limit(&self, descriptors: &[RequestDescriptor]) -> Result<bool>;
}
