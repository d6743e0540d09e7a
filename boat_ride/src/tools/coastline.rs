use anyhow::Context;
use boat_ride::config::config;
use boat_ride::shoreline::{self, ShorelineIndex};

use crate::cli::CoastlineArgs;

pub async fn exec(args: CoastlineArgs) -> anyhow::Result<()> {
    let config = config();
    let path = config.coastline_path();
    if args.force && path.exists() {
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    let path = shoreline::ensure_cached(config).await?;
    let index = ShorelineIndex::load(&path)?;
    println!("Coastline cached at {} ({} segments)", path.display(), index.segment_count());
    Ok(())
}
