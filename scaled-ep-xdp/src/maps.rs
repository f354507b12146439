//! Map interaction utilities for the XDP program.
//!
//! Userspace is the only writer of the interface and endpoint maps; the
//! program only reads them. Each wrapper can be built from a freshly loaded
//! object or from the pins a running instance left under the bpffs.

use anyhow::{Context, Result};
use aya::{
    maps::{Array, HashMap, Map, MapData, MapError},
    Ebpf,
};
use log::{debug, info};
use scaled_ep_common::{
    metrics::{DecisionStats, COUNTER_SLOTS},
    types::{EndpointKey, InterfaceConfig, ScaledEndpoint, TunnelId},
};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

// Map names matching those in the eBPF program
pub const INTERFACE_CONFIG_MAP: &str = "INTERFACE_CONFIG";
pub const ENDPOINTS_MAP: &str = "ENDPOINTS";
pub const METRICS_MAP: &str = "METRICS";

/// Every map the program declares.
pub const MAP_NAMES: [&str; 3] = [INTERFACE_CONFIG_MAP, ENDPOINTS_MAP, METRICS_MAP];

fn take_map(ebpf: &mut Ebpf, name: &str) -> Result<Map> {
    ebpf.take_map(name)
        .with_context(|| format!("Failed to find map '{}'", name))
}

fn pinned_data(pin_dir: &Path, name: &str) -> Result<MapData> {
    let path = pin_dir.join(name);
    MapData::from_pin(&path)
        .with_context(|| format!("Failed to open pinned map {}", path.display()))
}

/// Wrapper for the single-entry interface identity map
pub struct InterfaceTable {
    map: Arc<RwLock<Array<MapData, InterfaceConfig>>>,
}

impl InterfaceTable {
    pub fn new(ebpf: &mut Ebpf) -> Result<Self> {
        Self::from_map(take_map(ebpf, INTERFACE_CONFIG_MAP)?)
    }

    pub fn from_pin(pin_dir: &Path) -> Result<Self> {
        Self::from_map(Map::Array(pinned_data(pin_dir, INTERFACE_CONFIG_MAP)?))
    }

    fn from_map(map: Map) -> Result<Self> {
        let map = Array::try_from(map)?;
        Ok(Self {
            map: Arc::new(RwLock::new(map)),
        })
    }

    /// Set the identity the program reports for this attachment
    pub async fn set(&self, config: InterfaceConfig) -> Result<()> {
        let mut map = self.map.write().await;
        map.set(0, config, 0)?;
        info!(
            "Interface set to {} (ifindex {})",
            config.ip(),
            config.iface_index
        );
        Ok(())
    }

    /// Clear the identity; every packet aborts until it is set again
    pub async fn clear(&self) -> Result<()> {
        let mut map = self.map.write().await;
        map.set(0, InterfaceConfig::new(Ipv4Addr::UNSPECIFIED, 0), 0)?;
        Ok(())
    }

    pub async fn get(&self) -> Result<Option<InterfaceConfig>> {
        let map = self.map.read().await;
        let config = map.get(&0, 0)?;
        Ok(Some(config).filter(|c| c.is_configured()))
    }
}

/// Wrapper for the scaled endpoint map
pub struct EndpointTable {
    map: Arc<RwLock<HashMap<MapData, EndpointKey, ScaledEndpoint>>>,
}

impl EndpointTable {
    pub fn new(ebpf: &mut Ebpf) -> Result<Self> {
        Self::from_map(take_map(ebpf, ENDPOINTS_MAP)?)
    }

    pub fn from_pin(pin_dir: &Path) -> Result<Self> {
        Self::from_map(Map::HashMap(pinned_data(pin_dir, ENDPOINTS_MAP)?))
    }

    fn from_map(map: Map) -> Result<Self> {
        let map = HashMap::try_from(map)?;
        Ok(Self {
            map: Arc::new(RwLock::new(map)),
        })
    }

    /// Insert or replace the endpoint for `vip` in `tunnel_id`.
    ///
    /// The whole value is replaced in one update, so the program never sees
    /// a count that disagrees with the address list.
    pub async fn insert(
        &self,
        tunnel_id: TunnelId,
        vip: Ipv4Addr,
        backends: &[Ipv4Addr],
    ) -> Result<()> {
        let ep = ScaledEndpoint::new(backends).map_err(scaled_ep_common::Error::from)?;
        self.insert_raw(EndpointKey::new(tunnel_id, vip), ep).await?;
        info!(
            "Scaled endpoint vni {} / {} -> {} backends",
            tunnel_id.vni(),
            vip,
            backends.len()
        );
        Ok(())
    }

    pub async fn insert_raw(&self, key: EndpointKey, ep: ScaledEndpoint) -> Result<()> {
        let mut map = self.map.write().await;
        map.insert(key, ep, 0)?;
        debug!("Wrote endpoint {}", key);
        Ok(())
    }

    /// Remove an endpoint; returns whether it existed
    pub async fn remove(&self, tunnel_id: TunnelId, vip: Ipv4Addr) -> Result<bool> {
        let key = EndpointKey::new(tunnel_id, vip);
        let mut map = self.map.write().await;
        match map.remove(&key) {
            Ok(()) => {
                info!("Removed scaled endpoint {}", key);
                Ok(true)
            }
            Err(MapError::KeyNotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, tunnel_id: TunnelId, vip: Ipv4Addr) -> Result<Option<ScaledEndpoint>> {
        let key = EndpointKey::new(tunnel_id, vip);
        let map = self.map.read().await;
        match map.get(&key, 0) {
            Ok(ep) => Ok(Some(ep)),
            Err(MapError::KeyNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All entries, in map iteration order.
    ///
    /// Not a snapshot: concurrent writes may or may not be reflected.
    pub async fn entries(&self) -> Result<Vec<(EndpointKey, ScaledEndpoint)>> {
        let map = self.map.read().await;
        let mut entries = Vec::new();
        for entry in map.iter() {
            entries.push(entry?);
        }
        Ok(entries)
    }
}

/// Wrapper for the decision counters
pub struct DecisionCounters {
    map: Arc<RwLock<HashMap<MapData, u32, u64>>>,
}

impl DecisionCounters {
    pub fn new(ebpf: &mut Ebpf) -> Result<Self> {
        Self::from_map(take_map(ebpf, METRICS_MAP)?)
    }

    pub fn from_pin(pin_dir: &Path) -> Result<Self> {
        Self::from_map(Map::HashMap(pinned_data(pin_dir, METRICS_MAP)?))
    }

    fn from_map(map: Map) -> Result<Self> {
        let map = HashMap::try_from(map)?;
        Ok(Self {
            map: Arc::new(RwLock::new(map)),
        })
    }

    /// Zero every slot
    pub async fn reset(&self) -> Result<()> {
        let mut map = self.map.write().await;
        for index in 0..COUNTER_SLOTS {
            map.insert(index, 0u64, 0)?;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<DecisionStats> {
        let map = self.map.read().await;
        let mut counters = Vec::with_capacity(COUNTER_SLOTS as usize);
        for entry in map.iter() {
            counters.push(entry?);
        }
        Ok(DecisionStats::from_counters(counters))
    }
}
