use clap::Parser;
use cli::{Cli, Command};

mod cli;
mod tools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Cli::parse();

    match args.cmd {
        Command::Score(score_args) => tools::score::exec(score_args).await,
        Command::Coastline(coastline_args) => tools::coastline::exec(coastline_args).await,
        Command::Map(map_args) => tools::map::exec(map_args).await,
    }
}
