//! Types shared between userspace and the eBPF program.
//!
//! These are the key and value layouts of the BPF maps, so they are plain
//! `repr(C)` data with no padding and no pointers.

use core::fmt;
use core::net::Ipv4Addr;

/// Capacity of the replica array of a scaled endpoint.
pub const MAX_REMOTES: usize = 128;

/// Maximum number of entries in the endpoint table.
pub const MAX_ENDPOINTS: u32 = 1024;

/// Largest value the 24-bit Geneve VNI field can carry.
pub const MAX_VNI: u32 = 0x00ff_ffff;

/// Identifies the virtual network that owns a scaled endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TunnelId(pub u64);

impl TunnelId {
    /// Tunnel id carried by the three VNI bytes of a Geneve header.
    pub fn from_vni(vni: [u8; 3]) -> Self {
        Self(((vni[0] as u64) << 16) | ((vni[1] as u64) << 8) | vni[2] as u64)
    }

    /// Returns `None` when `vni` is wider than 24 bits.
    pub fn from_vni_u32(vni: u32) -> Option<Self> {
        if vni > MAX_VNI {
            return None;
        }
        Some(Self(vni as u64))
    }

    pub fn vni(&self) -> u32 {
        (self.0 & MAX_VNI as u64) as u32
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TunnelId({})", self.0)
    }
}

/// Identity of the interface the stage is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InterfaceConfig {
    /// Local tunnel endpoint address, network order.
    pub ip: [u8; 4],
    /// Interface index
    pub iface_index: u32,
}

impl InterfaceConfig {
    pub fn new(ip: Ipv4Addr, iface_index: u32) -> Self {
        Self {
            ip: ip.octets(),
            iface_index,
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }

    /// A zeroed map slot has interface index 0, which no interface uses.
    pub fn is_configured(&self) -> bool {
        self.iface_index != 0
    }
}

/// Exact-match key of the endpoint table.
///
/// The tunnel id is stored in host byte order followed by the virtual
/// address in network order, twelve bytes in all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct EndpointKey {
    tunnel_id: [u8; 8],
    vip: [u8; 4],
}

impl EndpointKey {
    pub fn new(tunnel_id: TunnelId, vip: Ipv4Addr) -> Self {
        Self {
            tunnel_id: tunnel_id.0.to_ne_bytes(),
            vip: vip.octets(),
        }
    }

    pub fn tunnel_id(&self) -> TunnelId {
        TunnelId(u64::from_ne_bytes(self.tunnel_id))
    }

    pub fn vip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.vip)
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vni {} / {}", self.tunnel_id().vni(), self.vip())
    }
}

/// Backend list larger than [`MAX_REMOTES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded {
    pub requested: usize,
}

/// A virtual service address backed by up to [`MAX_REMOTES`] replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScaledEndpoint {
    /// Number of valid entries at the front of `remote_ips`.
    pub nremote_ips: u32,
    /// Replica addresses, network order.
    pub remote_ips: [[u8; 4]; MAX_REMOTES],
}

impl ScaledEndpoint {
    /// An endpoint with no replicas attached.
    pub const fn empty() -> Self {
        Self {
            nremote_ips: 0,
            remote_ips: [[0; 4]; MAX_REMOTES],
        }
    }

    /// Builds an endpoint from an ordered backend list, rejecting lists that
    /// do not fit the replica array.
    pub fn new(backends: &[Ipv4Addr]) -> Result<Self, CapacityExceeded> {
        if backends.len() > MAX_REMOTES {
            return Err(CapacityExceeded {
                requested: backends.len(),
            });
        }

        let mut ep = Self::empty();
        for (slot, addr) in ep.remote_ips.iter_mut().zip(backends) {
            *slot = addr.octets();
        }
        ep.nremote_ips = backends.len() as u32;
        Ok(ep)
    }

    pub fn count(&self) -> u32 {
        self.nremote_ips
    }

    /// Replica at `index`, if the index is inside the array.
    pub fn remote(&self, index: usize) -> Option<Ipv4Addr> {
        self.remote_ips.get(index).map(|ip| Ipv4Addr::from(*ip))
    }

    /// Configured replicas in selection order.
    pub fn backends(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        let n = (self.nremote_ips as usize).min(MAX_REMOTES);
        self.remote_ips[..n].iter().map(|ip| Ipv4Addr::from(*ip))
    }
}

impl Default for ScaledEndpoint {
    fn default() -> Self {
        Self::empty()
    }
}

/// The action to take when processing a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum XdpAction {
    /// Aborts packet processing; packet is dropped.
    Aborted = 0,
    /// Packet is dropped.
    Drop = 1,
    /// Packet passes through to the networking stack.
    Pass = 2,
    /// Packet is TX'd out the same interface it was received on.
    Tx = 3,
    /// Packet is redirected to another interface.
    Redirect = 4,
}

#[cfg(feature = "user")]
impl From<CapacityExceeded> for crate::Error {
    fn from(e: CapacityExceeded) -> Self {
        crate::Error::TooManyBackends {
            requested: e.requested,
            max: MAX_REMOTES,
        }
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for InterfaceConfig {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for EndpointKey {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for ScaledEndpoint {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_id_from_vni_bytes() {
        assert_eq!(TunnelId::from_vni([0x00, 0x0b, 0xb8]), TunnelId(3000));
        assert_eq!(TunnelId::from_vni([0xff, 0xff, 0xff]).vni(), MAX_VNI);
        assert_eq!(TunnelId::from_vni_u32(MAX_VNI + 1), None);
    }

    #[test]
    fn endpoint_key_layout() {
        assert_eq!(core::mem::size_of::<EndpointKey>(), 12);

        let key = EndpointKey::new(TunnelId(3000), Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(key.tunnel_id(), TunnelId(3000));
        assert_eq!(key.vip(), Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn scaled_endpoint_capacity() {
        let too_many = vec![Ipv4Addr::new(10, 0, 0, 1); MAX_REMOTES + 1];
        assert_eq!(
            ScaledEndpoint::new(&too_many),
            Err(CapacityExceeded {
                requested: MAX_REMOTES + 1
            })
        );

        let full = vec![Ipv4Addr::new(10, 0, 0, 1); MAX_REMOTES];
        assert_eq!(ScaledEndpoint::new(&full).map(|ep| ep.count()), Ok(128));
    }

    #[test]
    fn backends_keep_order() {
        let list = [
            Ipv4Addr::new(10, 0, 1, 1),
            Ipv4Addr::new(10, 0, 1, 2),
            Ipv4Addr::new(10, 0, 1, 3),
        ];
        let ep = ScaledEndpoint::new(&list).unwrap();
        assert_eq!(ep.backends().collect::<Vec<_>>(), list);
        assert_eq!(ep.remote(1), Some(list[1]));
        assert_eq!(ep.remote(MAX_REMOTES), None);
    }
}
