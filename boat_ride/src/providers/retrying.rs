use async_trait::async_trait;

use super::{EnvProvider, PartialEnv, ProviderError, ProviderKind};
use crate::models::NormalizedPoint;
use crate::retry::{with_retry, RetryConfig};

/// Applies per-attempt timeout and retry with backoff to any provider.
pub struct RetryingProvider<P> {
    inner: P,
    retry: RetryConfig,
}

impl<P: EnvProvider> RetryingProvider<P> {
    pub fn new(inner: P, retry: RetryConfig) -> Self {
        RetryingProvider { inner, retry }
    }
}

#[async_trait]
impl<P: EnvProvider> EnvProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    async fn query(&self, point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
        with_retry(self.inner.name(), || self.inner.query(point), &self.retry).await
    }
}
