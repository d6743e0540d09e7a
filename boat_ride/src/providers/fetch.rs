use async_trait::async_trait;

use super::{EnvProvider, PartialEnv, ProviderError, ProviderKind};
use crate::fetch::FetchCalculator;
use crate::models::NormalizedPoint;

/// Supplies the ray fan; the chain turns it into effective fetch once wind is known.
pub struct FetchProvider {
    calculator: FetchCalculator,
}

impl FetchProvider {
    pub fn new(calculator: FetchCalculator) -> Self {
        FetchProvider { calculator }
    }
}

#[async_trait]
impl EnvProvider for FetchProvider {
    fn name(&self) -> &str {
        "fetch"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Fetch
    }

    async fn query(&self, point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
        let profile = self.calculator.compute(point.position());
        Ok(PartialEnv {
            fetch: Some(profile),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Waterway;
    use crate::providers::mock::tests::sample_point;
    use crate::shoreline::tests::circle;
    use crate::shoreline::ShorelineIndex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fetch_provider_returns_profile_only() {
        let point = sample_point();
        let index = ShorelineIndex::from_lines(vec![circle(point.position(), 10.0, 360)]);
        let provider = FetchProvider::new(FetchCalculator::new(Arc::new(index), 50.0));

        let env = provider.query(&point).await.unwrap();
        let profile = env.fetch.unwrap();
        assert_eq!(profile.waterway(), Waterway::Coastal);
        assert!(env.wind_speed_kt.is_none());
        assert!(env.wave.is_none());
    }
}
