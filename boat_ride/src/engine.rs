use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::error::Result;
use crate::models::RideScore;
use crate::plan::{Trip, TripPlan};
use crate::providers::{build_providers, ProviderChain, DEFAULT_SELECTOR};
use crate::route;
use crate::scoring::score_point;

/// Score every sample of a validated trip, in sample order.
///
/// Points are evaluated with at most `concurrency` in flight. Provider
/// failures degrade to unknown fields; only normalization errors fail the run.
pub async fn run_trip(trip: &Trip, chain: &ProviderChain, concurrency: usize) -> Result<Vec<RideScore>> {
    let points = route::normalize(&trip.route, trip.samples, &trip.window)?;
    log::info!(
        "Scoring trip {} at {} points with providers {:?}",
        trip.trip_id,
        points.len(),
        chain.provider_names()
    );

    let scores = stream::iter(points.iter())
        .map(|point| async move {
            let env = chain.evaluate(point).await;
            score_point(&trip.boat, &env)
        })
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    Ok(scores)
}

/// Validate a plan, build its providers and score it.
///
/// `selector` overrides the plan's own provider selector.
pub async fn score_plan(plan: &TripPlan, selector: Option<&str>, config: &Config) -> Result<(Trip, Vec<RideScore>)> {
    let trip = plan.validate()?;
    let selector = selector
        .or(trip.providers.as_deref())
        .unwrap_or(DEFAULT_SELECTOR);
    let chain = ProviderChain::new(build_providers(selector, config)?);
    let scores = run_trip(&trip, &chain, config.point_concurrency).await?;
    Ok((trip, scores))
}
