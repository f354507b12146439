//! Userspace side of the scaled-endpoint XDP stage.
//!
//! [`SepManager`] owns a loaded program and writes its configuration maps.
//! [`PinnedMaps`] reaches the maps of an instance loaded by another process.

use anyhow::{Context, Result};
use aya::{programs::xdp::XdpLinkId, Ebpf};
use aya_log::EbpfLogger;
use log::{info, warn};
use scaled_ep_common::{
    config::SepConfig,
    metrics::DecisionStats,
    types::{EndpointKey, InterfaceConfig, ScaledEndpoint},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod loader;
pub mod maps;

pub use loader::XdpAttachFlags;
pub use maps::{DecisionCounters, EndpointTable, InterfaceTable};

/// Name of the XDP entry point in the object.
pub const PROGRAM_NAME: &str = "transit_scaled_endpoint";

/// Where maps and links are pinned by default.
pub const DEFAULT_PIN_DIR: &str = "/sys/fs/bpf/scaled-ep";

/// Handles onto the three program maps.
pub struct PinnedMaps {
    pub interface: Arc<InterfaceTable>,
    pub endpoints: Arc<EndpointTable>,
    pub counters: Arc<DecisionCounters>,
}

impl PinnedMaps {
    /// Open the maps a running instance pinned under `pin_dir`
    pub fn open(pin_dir: &Path) -> Result<Self> {
        Ok(Self {
            interface: Arc::new(InterfaceTable::from_pin(pin_dir)?),
            endpoints: Arc::new(EndpointTable::from_pin(pin_dir)?),
            counters: Arc::new(DecisionCounters::from_pin(pin_dir)?),
        })
    }

    /// Write the interface and every endpoint in `config`.
    ///
    /// Entries are validated before anything is written. Returns the number
    /// of endpoints written.
    pub async fn apply(&self, config: &SepConfig) -> Result<usize> {
        let entries = config.map_entries()?;

        if let Some(itf) = config.interface_config() {
            self.interface.set(itf).await?;
        }

        for (key, ep) in &entries {
            self.endpoints.insert_raw(*key, *ep).await?;
        }

        info!("Applied {} scaled endpoints", entries.len());
        Ok(entries.len())
    }

    pub async fn interface(&self) -> Result<Option<InterfaceConfig>> {
        self.interface.get().await
    }

    pub async fn endpoints(&self) -> Result<Vec<(EndpointKey, ScaledEndpoint)>> {
        self.endpoints.entries().await
    }

    pub async fn stats(&self) -> Result<DecisionStats> {
        self.counters.snapshot().await
    }
}

/// A loaded program and its maps
pub struct SepManager {
    ebpf: Ebpf,
    maps: PinnedMaps,
    links: Vec<(String, XdpLinkId)>,
}

impl SepManager {
    /// Load the object compiled into this binary by the build script
    #[cfg(feature = "embedded")]
    pub async fn load_from_embedded(pin_dir: Option<&Path>) -> Result<Self> {
        let ebpf = Ebpf::load(aya::include_bytes_aligned!(concat!(
            env!("OUT_DIR"),
            "/scaled-ep"
        )))?;
        Self::from_ebpf(ebpf, pin_dir).await
    }

    /// Load the XDP program from a file
    pub async fn load_from_file<P: AsRef<Path>>(path: P, pin_dir: Option<&Path>) -> Result<Self> {
        let ebpf = loader::load_ebpf_object(path)?;
        Self::from_ebpf(ebpf, pin_dir).await
    }

    async fn from_ebpf(mut ebpf: Ebpf, pin_dir: Option<&Path>) -> Result<Self> {
        if let Err(e) = EbpfLogger::init(&mut ebpf) {
            warn!("Failed to initialize eBPF logger: {}", e);
        }

        if let Some(dir) = pin_dir {
            pin_maps(&ebpf, dir)?;
        }

        let maps = PinnedMaps {
            interface: Arc::new(InterfaceTable::new(&mut ebpf)?),
            endpoints: Arc::new(EndpointTable::new(&mut ebpf)?),
            counters: Arc::new(DecisionCounters::new(&mut ebpf)?),
        };
        maps.counters.reset().await?;

        loader::load_xdp_program(&mut ebpf, PROGRAM_NAME)?;

        Ok(Self {
            ebpf,
            maps,
            links: Vec::new(),
        })
    }

    /// Attach the XDP program to the specified network interface
    pub fn attach(&mut self, interface: &str, flags: XdpAttachFlags) -> Result<()> {
        let program = self.program_mut()?;
        let link_id = loader::attach_xdp_to_interface(program, interface, flags)?;
        self.links.push((interface.to_string(), link_id));
        Ok(())
    }

    /// Pin every attachment so it survives this process; returns pin paths
    pub fn pin_links(&mut self, pin_dir: &Path) -> Result<Vec<PathBuf>> {
        let links = std::mem::take(&mut self.links);
        let program = self.program_mut()?;
        let mut paths = Vec::with_capacity(links.len());
        for (interface, link_id) in links {
            paths.push(loader::pin_xdp_link(program, link_id, pin_dir, &interface)?);
        }
        Ok(paths)
    }

    /// Detach the XDP program from all interfaces
    pub fn detach_all(&mut self) -> Result<()> {
        let links = std::mem::take(&mut self.links);
        let program = self.program_mut()?;
        for (interface, link_id) in links {
            if let Err(e) = loader::detach_xdp_from_interface(program, link_id) {
                warn!("Failed to detach from interface {}: {}", interface, e);
            }
        }
        Ok(())
    }

    pub fn maps(&self) -> &PinnedMaps {
        &self.maps
    }

    /// Get a list of attached interfaces
    pub fn attached_interfaces(&self) -> Vec<&str> {
        self.links.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn program_mut(&mut self) -> Result<&mut aya::programs::Xdp> {
        let program = self
            .ebpf
            .program_mut(PROGRAM_NAME)
            .with_context(|| format!("Failed to find XDP program '{}'", PROGRAM_NAME))?;
        Ok(program.try_into()?)
    }
}

fn pin_maps(ebpf: &Ebpf, pin_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(pin_dir)
        .with_context(|| format!("Failed to create pin directory {}", pin_dir.display()))?;

    for name in maps::MAP_NAMES {
        let path = pin_dir.join(name);
        ebpf.map(name)
            .with_context(|| format!("Failed to find map '{}'", name))?
            .pin(&path)
            .with_context(|| format!("Failed to pin map at {}", path.display()))?;
        info!("Pinned map {} at {}", name, path.display());
    }

    Ok(())
}

/// Detach from `interface` and remove the pins a previous load left behind
pub fn unload_pinned(pin_dir: &Path, interface: &str) -> Result<()> {
    loader::unpin_xdp_link(pin_dir, interface)?;

    let remaining_links = std::fs::read_dir(pin_dir)
        .with_context(|| format!("Failed to read pin directory {}", pin_dir.display()))?
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_name().to_string_lossy().starts_with("link_"));

    if !remaining_links {
        for name in maps::MAP_NAMES {
            let path = pin_dir.join(name);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove pinned map {}: {}", path.display(), e);
            }
        }
        if let Err(e) = std::fs::remove_dir(pin_dir) {
            warn!("Failed to remove pin directory {}: {}", pin_dir.display(), e);
        }
    }

    Ok(())
}
