//! Apply a configuration file to the running program

use anyhow::Result;
use log::info;
use scaled_ep_common::config::SepConfig;
use scaled_ep_xdp::PinnedMaps;
use std::path::Path;

pub async fn apply_config(config: &Path, pin_dir: &Path) -> Result<()> {
    info!("Applying configuration {}", config.display());

    // Validate before touching the maps.
    let config = SepConfig::load(config)?;
    let maps = PinnedMaps::open(pin_dir)?;
    let written = maps.apply(&config).await?;

    println!("Applied {} scaled endpoints", written);
    Ok(())
}
