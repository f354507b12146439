//! Read-only configuration sources consulted once per packet.
//!
//! The XDP program implements these over its BPF maps; userspace tools and
//! tests use the in-memory tables below.

use core::cell::Cell;

use crate::types::{EndpointKey, InterfaceConfig, ScaledEndpoint};

/// Identity of the attachment point.
pub trait InterfaceProvider {
    fn interface(&self) -> Option<InterfaceConfig>;
}

/// Exact-match lookup of scaled endpoints.
pub trait EndpointProvider {
    fn lookup(&self, key: &EndpointKey) -> Option<&ScaledEndpoint>;
}

impl<T: InterfaceProvider + ?Sized> InterfaceProvider for &T {
    fn interface(&self) -> Option<InterfaceConfig> {
        (**self).interface()
    }
}

impl<T: EndpointProvider + ?Sized> EndpointProvider for &T {
    fn lookup(&self, key: &EndpointKey) -> Option<&ScaledEndpoint> {
        (**self).lookup(key)
    }
}

/// Interface provider that keeps the identity it handed out.
///
/// The packet path reads the interface once; callers that need the address
/// again afterwards (for logging) take it from [`SeenInterface::seen`]
/// instead of reading the source a second time.
pub struct SeenInterface<P> {
    inner: P,
    seen: Cell<Option<InterfaceConfig>>,
}

impl<P: InterfaceProvider> SeenInterface<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            seen: Cell::new(None),
        }
    }

    /// Identity returned by the last read, if any.
    pub fn seen(&self) -> Option<InterfaceConfig> {
        self.seen.get()
    }
}

impl<P: InterfaceProvider> InterfaceProvider for SeenInterface<P> {
    fn interface(&self) -> Option<InterfaceConfig> {
        let itf = self.inner.interface();
        self.seen.set(itf);
        itf
    }
}

#[cfg(any(test, feature = "user"))]
pub use self::memory::{EndpointTable, StaticInterface};

#[cfg(any(test, feature = "user"))]
mod memory {
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    use super::*;
    use crate::types::{CapacityExceeded, TunnelId};

    /// Fixed interface identity, or none at all.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StaticInterface(pub Option<InterfaceConfig>);

    impl StaticInterface {
        pub fn new(ip: Ipv4Addr, iface_index: u32) -> Self {
            Self(Some(InterfaceConfig::new(ip, iface_index)))
        }

        pub fn missing() -> Self {
            Self(None)
        }
    }

    impl InterfaceProvider for StaticInterface {
        fn interface(&self) -> Option<InterfaceConfig> {
            self.0
        }
    }

    /// Endpoint table held in process memory.
    #[derive(Debug, Clone, Default)]
    pub struct EndpointTable {
        entries: HashMap<EndpointKey, ScaledEndpoint>,
    }

    impl EndpointTable {
        pub fn new() -> Self {
            Self::default()
        }

        /// Inserts or replaces the endpoint for (`tunnel_id`, `vip`).
        pub fn insert(
            &mut self,
            tunnel_id: TunnelId,
            vip: Ipv4Addr,
            backends: &[Ipv4Addr],
        ) -> Result<(), CapacityExceeded> {
            let ep = ScaledEndpoint::new(backends)?;
            self.entries.insert(EndpointKey::new(tunnel_id, vip), ep);
            Ok(())
        }

        /// Inserts a raw map value as the control plane would write it.
        pub fn insert_raw(&mut self, key: EndpointKey, ep: ScaledEndpoint) {
            self.entries.insert(key, ep);
        }

        pub fn remove(&mut self, tunnel_id: TunnelId, vip: Ipv4Addr) -> Option<ScaledEndpoint> {
            self.entries.remove(&EndpointKey::new(tunnel_id, vip))
        }

        pub fn len(&self) -> usize {
            self.entries.len()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }

        pub fn iter(&self) -> impl Iterator<Item = (&EndpointKey, &ScaledEndpoint)> {
            self.entries.iter()
        }
    }

    impl EndpointProvider for EndpointTable {
        fn lookup(&self, key: &EndpointKey) -> Option<&ScaledEndpoint> {
            self.entries.get(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::types::TunnelId;

    #[test]
    fn table_lookup_is_exact() {
        let mut table = EndpointTable::new();
        table
            .insert(
                TunnelId(3000),
                Ipv4Addr::new(10, 0, 0, 3),
                &[Ipv4Addr::new(10, 0, 1, 1)],
            )
            .unwrap();

        let hit = EndpointKey::new(TunnelId(3000), Ipv4Addr::new(10, 0, 0, 3));
        let other_vni = EndpointKey::new(TunnelId(3001), Ipv4Addr::new(10, 0, 0, 3));
        let other_vip = EndpointKey::new(TunnelId(3000), Ipv4Addr::new(10, 0, 0, 4));

        assert_eq!(table.lookup(&hit).map(|ep| ep.count()), Some(1));
        assert!(table.lookup(&other_vni).is_none());
        assert!(table.lookup(&other_vip).is_none());
    }

    #[test]
    fn last_write_wins() {
        let mut table = EndpointTable::new();
        let vip = Ipv4Addr::new(10, 0, 0, 3);
        table
            .insert(TunnelId(1), vip, &[Ipv4Addr::new(10, 0, 1, 1)])
            .unwrap();
        table
            .insert(
                TunnelId(1),
                vip,
                &[Ipv4Addr::new(10, 0, 2, 1), Ipv4Addr::new(10, 0, 2, 2)],
            )
            .unwrap();

        assert_eq!(table.len(), 1);
        let ep = table.lookup(&EndpointKey::new(TunnelId(1), vip)).unwrap();
        assert_eq!(ep.remote(0), Some(Ipv4Addr::new(10, 0, 2, 1)));
    }

    #[test]
    fn seen_interface_keeps_last_read() {
        let itf = SeenInterface::new(StaticInterface::new(Ipv4Addr::new(172, 16, 0, 2), 7));
        assert!(itf.seen().is_none());
        let read = itf.interface();
        assert_eq!(itf.seen(), read);
        assert_eq!(itf.seen().map(|i| i.iface_index), Some(7));

        let none = SeenInterface::new(StaticInterface::missing());
        assert!(none.interface().is_none());
        assert!(none.seen().is_none());
    }

    #[test]
    fn missing_interface() {
        assert!(StaticInterface::missing().interface().is_none());
        let itf = StaticInterface::new(Ipv4Addr::new(172, 16, 0, 2), 7);
        assert_eq!(itf.interface().map(|i| i.iface_index), Some(7));
    }
}
