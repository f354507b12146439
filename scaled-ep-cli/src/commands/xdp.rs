//! XDP command implementation

use anyhow::{Context, Result};
use log::info;
use scaled_ep_common::config::SepConfig;
use scaled_ep_xdp::{unload_pinned, PinnedMaps, SepManager, XdpAttachFlags};
use std::path::{Path, PathBuf};

use crate::utils::print_header;
use crate::XdpCommands;

/// Handle XDP-related commands
pub async fn handle_command(cmd: XdpCommands, pin_dir: &Path) -> Result<()> {
    match cmd {
        XdpCommands::Load {
            file,
            interface,
            config,
            skb_mode,
            offload,
        } => load_xdp(file, interface, config, skb_mode, offload, pin_dir).await,
        XdpCommands::Unload { interface } => unload_xdp(&interface, pin_dir),
        XdpCommands::Stats { json } => show_xdp_stats(json, pin_dir).await,
    }
}

/// Load, attach and pin the XDP program
async fn load_xdp(
    file: Option<PathBuf>,
    interface: Option<String>,
    config: Option<PathBuf>,
    skb_mode: bool,
    offload: bool,
    pin_dir: &Path,
) -> Result<()> {
    let config = match config {
        Some(path) => Some(SepConfig::load(&path)?),
        None => None,
    };
    let xdp_section = config.as_ref().map(|c| c.xdp.clone()).unwrap_or_default();

    // Command line wins over the configuration file.
    let interface = interface
        .or(xdp_section.iface)
        .context("No interface given on the command line or in the configuration")?;
    let flags = XdpAttachFlags {
        offload: offload || xdp_section.offload,
        skb_mode: skb_mode || xdp_section.skb_mode,
    };

    info!("Loading XDP program...");

    let mut sep = match file.or(xdp_section.object) {
        Some(path) => {
            info!("Loading XDP program from file: {}", path.display());
            SepManager::load_from_file(path, Some(pin_dir)).await?
        }
        None => load_embedded(pin_dir).await?,
    };

    if let Some(config) = &config {
        sep.maps().apply(config).await?;
    }

    sep.attach(&interface, flags)?;
    sep.pin_links(pin_dir)?;

    println!(
        "XDP program attached to interface {} and pinned under {}",
        interface,
        pin_dir.display()
    );

    Ok(())
}

#[cfg(feature = "embedded")]
async fn load_embedded(pin_dir: &Path) -> Result<SepManager> {
    info!("Loading embedded XDP program");
    SepManager::load_from_embedded(Some(pin_dir)).await
}

#[cfg(not(feature = "embedded"))]
async fn load_embedded(_pin_dir: &Path) -> Result<SepManager> {
    anyhow::bail!("This build has no embedded XDP program; pass --file or set xdp.object")
}

/// Detach the XDP program and remove its pins
fn unload_xdp(interface: &str, pin_dir: &Path) -> Result<()> {
    info!("Unloading XDP program from interface: {}", interface);

    unload_pinned(pin_dir, interface)?;

    println!("XDP program detached from interface: {}", interface);

    Ok(())
}

/// Show XDP statistics
async fn show_xdp_stats(json: bool, pin_dir: &Path) -> Result<()> {
    info!("Fetching XDP statistics");

    let maps = PinnedMaps::open(pin_dir)?;
    let stats = maps.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    print_header("Decisions");
    print!("{}", stats);
    println!(
        "\n{} transmitted, {} dropped, {} aborted",
        stats.transmit,
        stats.drops(),
        stats.aborts()
    );

    Ok(())
}
