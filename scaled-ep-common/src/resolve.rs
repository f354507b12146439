//! Endpoint resolution.

use core::net::Ipv4Addr;

use crate::error::{ConfigSource, Fault};
use crate::provider::EndpointProvider;
use crate::types::{EndpointKey, ScaledEndpoint, TunnelId};

/// Looks up the scaled endpoint serving `vip` in `tunnel_id`.
///
/// A miss means the control plane steered traffic here without configuring
/// the endpoint, so it is a configuration fault rather than a drop.
pub fn resolve<E: EndpointProvider + ?Sized>(
    eps: &E,
    tunnel_id: TunnelId,
    vip: Ipv4Addr,
) -> Result<&ScaledEndpoint, Fault> {
    let key = EndpointKey::new(tunnel_id, vip);
    eps.lookup(&key)
        .ok_or(Fault::ConfigMissing(ConfigSource::Endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EndpointTable;

    #[test]
    fn hit_and_miss() {
        let mut table = EndpointTable::new();
        let vip = Ipv4Addr::new(10, 0, 0, 3);
        table
            .insert(TunnelId(3000), vip, &[Ipv4Addr::new(10, 0, 1, 1)])
            .unwrap();

        assert_eq!(resolve(&table, TunnelId(3000), vip).map(|ep| ep.count()), Ok(1));

        let err = resolve(&table, TunnelId(3000), Ipv4Addr::new(10, 0, 0, 9)).unwrap_err();
        assert_eq!(err, Fault::ConfigMissing(ConfigSource::Endpoint));
        assert!(!err.is_drop());
    }
}
