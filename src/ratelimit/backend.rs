//! Admission backend trait for abstracting the decision source.

use async_trait::async_trait;

use super::clock::Clock;
use super::registry::{AdmissionRegistry, Decision};
use crate::error::Result;

/// Trait for admission decision sources.
///
/// The gRPC service is generic over this trait so that it can be exercised
/// against a stub in tests.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// Decide whether one unit of work for `resource`/`key` may proceed.
    async fn admit(&self, resource: &str, key: &str) -> Result<Decision>;
}

#[async_trait]
impl<C: Clock + Clone + 'static> AdmissionBackend for AdmissionRegistry<C> {
    async fn admit(&self, resource: &str, key: &str) -> Result<Decision> {
        self.check(resource, key)
    }
}
