//! Loader utilities for the eBPF XDP program.
//!
//! Loading, attaching and pinning. Pinned links keep the program attached
//! after the loading process exits.

use anyhow::{Context, Result};
use aya::{
    programs::{
        links::{FdLink, PinnedLink},
        xdp::XdpLinkId,
        Xdp, XdpFlags,
    },
    Ebpf,
};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Flags for attaching XDP programs
#[derive(Debug, Clone, Copy, Default)]
pub struct XdpAttachFlags {
    /// Use hardware offload if available
    pub offload: bool,
    /// Enable SKB mode (slower but more compatible)
    pub skb_mode: bool,
}

impl XdpAttachFlags {
    /// Convert to aya's XdpFlags
    pub fn to_aya_flags(&self) -> XdpFlags {
        let mut flags = XdpFlags::default();

        if self.offload {
            flags |= XdpFlags::HW_MODE;
        } else if self.skb_mode {
            flags |= XdpFlags::SKB_MODE;
        } else {
            flags |= XdpFlags::DRV_MODE;
        }

        flags
    }
}

/// Load an eBPF object file from the given path
pub fn load_ebpf_object<P: AsRef<Path>>(path: P) -> Result<Ebpf> {
    let path = path.as_ref();

    debug!("Loading eBPF object file: {}", path.display());

    let ebpf = Ebpf::load_file(path)
        .with_context(|| format!("Failed to load eBPF object file: {}", path.display()))?;

    info!("Successfully loaded eBPF object file: {}", path.display());

    Ok(ebpf)
}

/// Find the XDP program in an eBPF object and load it into the kernel
pub fn load_xdp_program<'a>(ebpf: &'a mut Ebpf, program_name: &str) -> Result<&'a mut Xdp> {
    debug!("Loading XDP program: {}", program_name);

    let program: &mut Xdp = ebpf
        .program_mut(program_name)
        .with_context(|| format!("Failed to find program '{}'", program_name))?
        .try_into()
        .with_context(|| format!("Failed to convert program '{}' to XDP", program_name))?;

    program
        .load()
        .with_context(|| format!("Failed to load program '{}'", program_name))?;

    info!("Successfully loaded XDP program: {}", program_name);

    Ok(program)
}

/// Attach an XDP program to an interface
pub fn attach_xdp_to_interface(
    program: &mut Xdp,
    interface: &str,
    flags: XdpAttachFlags,
) -> Result<XdpLinkId> {
    debug!("Attaching XDP program to interface: {} ({:?})", interface, flags);

    let link_id = program
        .attach(interface, flags.to_aya_flags())
        .with_context(|| format!("Failed to attach to interface: {}", interface))?;

    info!("Successfully attached XDP program to interface: {}", interface);

    Ok(link_id)
}

/// Detach an XDP program from an interface
pub fn detach_xdp_from_interface(program: &mut Xdp, link_id: XdpLinkId) -> Result<()> {
    debug!("Detaching XDP program");

    program
        .detach(link_id)
        .context("Failed to detach XDP program")?;

    info!("Successfully detached XDP program");

    Ok(())
}

/// Path under `pin_dir` where the link for `interface` is pinned.
pub fn link_pin_path(pin_dir: &Path, interface: &str) -> PathBuf {
    pin_dir.join(format!("link_{}", interface))
}

/// Pin the link of an attached program so it outlives this process
pub fn pin_xdp_link(
    program: &mut Xdp,
    link_id: XdpLinkId,
    pin_dir: &Path,
    interface: &str,
) -> Result<PathBuf> {
    let path = link_pin_path(pin_dir, interface);

    let link = program
        .take_link(link_id)
        .context("Failed to take ownership of XDP link")?;
    let fd_link: FdLink = link
        .try_into()
        .context("XDP link is not fd-based; kernel too old to pin it")?;
    fd_link
        .pin(&path)
        .with_context(|| format!("Failed to pin XDP link at {}", path.display()))?;

    info!("Pinned XDP link for {} at {}", interface, path.display());

    Ok(path)
}

/// Remove a pinned link, which detaches the program from the interface
pub fn unpin_xdp_link(pin_dir: &Path, interface: &str) -> Result<()> {
    let path = link_pin_path(pin_dir, interface);

    let pinned = PinnedLink::from_pin(&path)
        .with_context(|| format!("No pinned XDP link at {}", path.display()))?;
    let link = pinned.unpin().context("Failed to unpin XDP link")?;
    drop(link);

    info!("Detached XDP program from interface: {}", interface);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_mode_selection() {
        let native = XdpAttachFlags::default().to_aya_flags();
        assert!(native.contains(XdpFlags::DRV_MODE));

        let skb = XdpAttachFlags {
            offload: false,
            skb_mode: true,
        }
        .to_aya_flags();
        assert!(skb.contains(XdpFlags::SKB_MODE));
        assert!(!skb.contains(XdpFlags::DRV_MODE));

        // Offload wins over SKB mode.
        let hw = XdpAttachFlags {
            offload: true,
            skb_mode: true,
        }
        .to_aya_flags();
        assert!(hw.contains(XdpFlags::HW_MODE));
        assert!(!hw.contains(XdpFlags::SKB_MODE));
    }

    #[test]
    fn link_pins_are_per_interface() {
        let dir = Path::new("/sys/fs/bpf/scaled-ep");
        assert_eq!(
            link_pin_path(dir, "eth0"),
            PathBuf::from("/sys/fs/bpf/scaled-ep/link_eth0")
        );
    }
}
