//! Scaled endpoint commands

use anyhow::Result;
use log::info;
use scaled_ep_common::{types::TunnelId, Error};
use scaled_ep_xdp::PinnedMaps;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::utils::{format_backends, print_header};
use crate::EndpointCommands;

/// Handle endpoint commands
pub async fn handle_command(cmd: EndpointCommands, pin_dir: &Path) -> Result<()> {
    let maps = PinnedMaps::open(pin_dir)?;

    match cmd {
        EndpointCommands::Add { vni, vip, backends } => {
            add_endpoint(&maps, vni, vip, &backends).await
        }
        EndpointCommands::Remove { vni, vip } => remove_endpoint(&maps, vni, vip).await,
        EndpointCommands::Show => show_endpoints(&maps).await,
    }
}

fn tunnel_id(vni: u32) -> Result<TunnelId> {
    Ok(TunnelId::from_vni_u32(vni).ok_or(Error::InvalidVni(vni))?)
}

async fn add_endpoint(
    maps: &PinnedMaps,
    vni: u32,
    vip: Ipv4Addr,
    backends: &[Ipv4Addr],
) -> Result<()> {
    info!("Adding scaled endpoint: vni={}, vip={}", vni, vip);

    maps.endpoints.insert(tunnel_id(vni)?, vip, backends).await?;

    println!(
        "Scaled endpoint vni {} / {} -> {}",
        vni,
        vip,
        format_backends(backends.iter().copied())
    );
    Ok(())
}

async fn remove_endpoint(maps: &PinnedMaps, vni: u32, vip: Ipv4Addr) -> Result<()> {
    info!("Removing scaled endpoint: vni={}, vip={}", vni, vip);

    if maps.endpoints.remove(tunnel_id(vni)?, vip).await? {
        println!("Removed scaled endpoint vni {} / {}", vni, vip);
    } else {
        println!("No scaled endpoint vni {} / {}", vni, vip);
    }
    Ok(())
}

async fn show_endpoints(maps: &PinnedMaps) -> Result<()> {
    let mut entries = maps.endpoints().await?;
    entries.sort_by_key(|(key, _)| (key.tunnel_id(), key.vip()));

    print_header("Scaled endpoints");
    if entries.is_empty() {
        println!("(none)");
    }
    for (key, ep) in entries {
        println!("{:<28} {}", key.to_string(), format_backends(ep.backends()));
    }
    Ok(())
}
