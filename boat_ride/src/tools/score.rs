use anyhow::Context;
use serde::Serialize;

use boat_ride::config::config;
use boat_ride::engine;
use boat_ride::models::{BoatProfile, RideScore};
use boat_ride::plan::TripPlan;

use crate::cli::ScoreArgs;

#[derive(Serialize)]
struct ScoreReport<'a> {
    trip_id: &'a str,
    boat: &'a BoatProfile,
    scores: &'a [RideScore],
}

pub async fn exec(args: ScoreArgs) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(&args.trip)
        .await
        .with_context(|| format!("Failed to read trip plan {}", args.trip.display()))?;
    let plan = TripPlan::from_json(&json)?;

    let (trip, scores) = engine::score_plan(&plan, args.providers.as_deref(), config())
        .await
        .context("Failed to score trip")?;

    if !args.silent {
        print_table(&trip.trip_id, &scores);
    }

    if let Some(out) = &args.out {
        let report = ScoreReport {
            trip_id: &trip.trip_id,
            boat: &trip.boat,
            scores: &scores,
        };
        let body = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(out, body)
            .await
            .with_context(|| format!("Failed to write {}", out.display()))?;
        log::info!("Wrote {} scores to {}", scores.len(), out.display());
    }
    Ok(())
}

fn opt(v: Option<f64>, precision: usize) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{:.*}", precision, x))
}

fn print_table(trip_id: &str, scores: &[RideScore]) {
    println!("Trip {}", trip_id);
    println!(
        "{:<22} {:>9} {:>10} {:>5} {:>5} {:>5} {:>5} {:>9} {:>6} {:<6} reasons",
        "time", "lat", "lon", "wind", "gust", "wave", "per", "waterway", "score", "label"
    );
    for s in scores {
        let env = &s.env;
        println!(
            "{:<22} {:>9.4} {:>10.4} {:>5} {:>5} {:>5} {:>5} {:>9} {:>6.1} {:<6} {}",
            s.t_local,
            s.lat,
            s.lon,
            opt(env.wind_speed_kt, 0),
            opt(env.wind_gust_kt, 0),
            opt(env.wave_height_ft(), 1),
            opt(env.wave_period_s(), 0),
            env.waterway.map_or_else(|| "-".to_string(), |w| w.to_string()),
            s.score,
            s.label.to_string(),
            s.reasons.join("; ")
        );
    }

    if let Some(worst) = scores.iter().min_by(|a, b| a.score.total_cmp(&b.score)) {
        let mean = scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64;
        println!(
            "Mean {:.1}, worst {:.1} ({}) at {}",
            mean, worst.score, worst.label, worst.t_local
        );
    }
}
