//! Ride comfort and safety scoring along a boating route.
//!
//! A trip plan is resampled into timed points, each point is enriched by a
//! chain of environmental providers, and the merged snapshot is scored 0-100.

pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod models;
pub mod plan;
pub mod providers;
pub mod retry;
pub mod route;
pub mod scoring;
pub mod shoreline;
pub mod waves;

pub use error::{Error, Result};
