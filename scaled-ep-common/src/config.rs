//! Configuration file for the stage.
//!
//! ```toml
//! [interface]
//! ip = "172.16.0.2"
//! ifindex = 4
//!
//! [xdp]
//! iface = "eth0"
//! skb_mode = true
//!
//! [[endpoints]]
//! vni = 3000
//! vip = "10.0.0.3"
//! backends = ["10.0.1.1", "10.0.1.2"]
//! ```
//!
//! Any key may be overridden from the environment with the `SEP_` prefix
//! and `__` between sections, e.g. `SEP_INTERFACE__IFINDEX=7`.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::provider::{EndpointTable, StaticInterface};
use crate::types::{EndpointKey, InterfaceConfig, ScaledEndpoint, TunnelId};
use crate::Result;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SEP";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SepConfig {
    pub interface: Option<InterfaceSection>,
    #[serde(default)]
    pub xdp: XdpSection,
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSection {
    /// Local tunnel endpoint address.
    pub ip: Ipv4Addr,
    pub ifindex: u32,
}

/// How and where the program is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XdpSection {
    pub iface: Option<String>,
    #[serde(default)]
    pub skb_mode: bool,
    #[serde(default)]
    pub offload: bool,
    /// Compiled object to load instead of the embedded one.
    pub object: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub vni: u32,
    pub vip: Ipv4Addr,
    #[serde(default)]
    pub backends: Vec<Ipv4Addr>,
}

impl EndpointEntry {
    /// Key and value as written to the endpoint map.
    pub fn to_map_entry(&self) -> Result<(EndpointKey, ScaledEndpoint)> {
        let tunnel_id = TunnelId::from_vni_u32(self.vni).ok_or(Error::InvalidVni(self.vni))?;
        let ep = ScaledEndpoint::new(&self.backends)?;
        Ok((EndpointKey::new(tunnel_id, self.vip), ep))
    }
}

impl SepConfig {
    /// Loads `path` (format from its extension) with environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let cfg = Config::builder()
            .add_source(File::from(path))
            .add_source(env_source())
            .build()?
            .try_deserialize::<SepConfig>()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses an in-memory document without environment overrides.
    pub fn parse(text: &str, format: FileFormat) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::from_str(text, format))
            .build()?
            .try_deserialize::<SepConfig>()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects entries the data path could not hold.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.endpoints {
            entry.to_map_entry()?;
        }
        Ok(())
    }

    pub fn interface_config(&self) -> Option<InterfaceConfig> {
        self.interface
            .as_ref()
            .map(|i| InterfaceConfig::new(i.ip, i.ifindex))
    }

    pub fn map_entries(&self) -> Result<Vec<(EndpointKey, ScaledEndpoint)>> {
        self.endpoints.iter().map(EndpointEntry::to_map_entry).collect()
    }

    /// In-memory providers holding this configuration.
    pub fn providers(&self) -> Result<(StaticInterface, EndpointTable)> {
        let mut table = EndpointTable::new();
        for (key, ep) in self.map_entries()? {
            table.insert_raw(key, ep);
        }
        Ok((StaticInterface(self.interface_config()), table))
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
