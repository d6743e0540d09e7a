use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Boat ride comfort scoring CLI.")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Score a trip plan JSON file
    Score(ScoreArgs),
    /// Download and cache the coastline dataset used for fetch
    Coastline(CoastlineArgs),
    /// Render a score report as an HTML map
    Map(MapArgs),
}

#[derive(Debug, Parser)]
pub struct ScoreArgs {
    /// Trip plan JSON file
    pub trip: PathBuf,
    /// Provider selector, e.g. nws+ndbc+fetch+coops (overrides the plan)
    #[arg(env = "BOAT_RIDE_PROVIDERS", short, long)]
    pub providers: Option<String>,
    /// Write scores as JSON to this file
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    /// Do not print the score table
    #[arg(long)]
    pub silent: bool,
}

#[derive(Debug, Parser)]
pub struct CoastlineArgs {
    /// Download again even when a cached copy exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Parser)]
pub struct MapArgs {
    /// Score report JSON written by `score --out`
    pub report: PathBuf,
    /// HTML output file (defaults to the report path with an .html extension)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}
