//! Interface identity commands

use anyhow::Result;
use scaled_ep_common::types::InterfaceConfig;
use scaled_ep_xdp::PinnedMaps;
use std::path::Path;

use crate::IfaceCommands;

pub async fn handle_command(cmd: IfaceCommands, pin_dir: &Path) -> Result<()> {
    let maps = PinnedMaps::open(pin_dir)?;

    match cmd {
        IfaceCommands::Set { ip, ifindex } => {
            maps.interface.set(InterfaceConfig::new(ip, ifindex)).await?;
            println!("Interface set to {} (ifindex {})", ip, ifindex);
        }
        IfaceCommands::Show => match maps.interface().await? {
            Some(itf) => println!("{} (ifindex {})", itf.ip(), itf.iface_index),
            None => println!("Interface not configured; every packet aborts"),
        },
    }

    Ok(())
}
