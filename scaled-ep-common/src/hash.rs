//! Flow hash and backend selection.
//!
//! The hash is the kernel's `jhash_2words`, so the same flow lands on the
//! same replica whether the decision is made by the XDP program or by a
//! userspace tool replaying a frame.

use core::net::Ipv4Addr;

use crate::error::Fault;
use crate::types::{ScaledEndpoint, MAX_REMOTES};

/// Seed mixed into every flow hash.
pub const FLOW_HASH_SEED: u32 = 0x6e23_a88f;

const JHASH_INITVAL: u32 = 0xdead_beef;

#[inline(always)]
fn jhash_final(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(14));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(11));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(25));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(16));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(4));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(14));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(24));
    c
}

/// Bob Jenkins' lookup3 hash of two words, as `jhash_2words` in Linux.
#[inline]
pub fn jhash_2words(a: u32, b: u32, initval: u32) -> u32 {
    let init = initval
        .wrapping_add(JHASH_INITVAL)
        .wrapping_add(2 << 2);
    jhash_final(a.wrapping_add(init), b.wrapping_add(init), init)
}

/// Hash of the inner source address and port.
///
/// Both words are fed in the layout they have on the wire, read as native
/// integers, which is what the kernel helpers see.
#[inline]
pub fn flow_hash(saddr: Ipv4Addr, sport: u16) -> u32 {
    let a = u32::from_ne_bytes(saddr.octets());
    let b = u16::from_ne_bytes(sport.to_be_bytes()) as u32;
    jhash_2words(a, b, FLOW_HASH_SEED)
}

/// Outcome of backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub hash: u32,
    pub index: u32,
    pub backend: Ipv4Addr,
}

/// Picks `replicas[flow_hash(saddr, sport) % N]`.
///
/// An endpoint with no replicas is a drop. An index outside the replica
/// array can only come from a corrupted count and is reported as an
/// invariant violation rather than read.
pub fn select_backend(
    ep: &ScaledEndpoint,
    saddr: Ipv4Addr,
    sport: u16,
) -> Result<Selection, Fault> {
    let n = ep.nremote_ips;
    if n == 0 {
        return Err(Fault::NoBackends);
    }

    let hash = flow_hash(saddr, sport);
    let index = hash % n;

    let backend = ep.remote(index as usize).ok_or(Fault::InvariantViolation {
        index,
        max: MAX_REMOTES as u32,
    })?;

    Ok(Selection {
        hash,
        index,
        backend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(n: u8) -> ScaledEndpoint {
        let backends: Vec<_> = (1..=n).map(|i| Ipv4Addr::new(10, 1, 0, i)).collect();
        ScaledEndpoint::new(&backends).unwrap()
    }

    #[test]
    fn jhash_mixes_both_words() {
        let base = jhash_2words(1, 2, 0);
        assert_ne!(base, jhash_2words(2, 2, 0));
        assert_ne!(base, jhash_2words(1, 3, 0));
        assert_ne!(base, jhash_2words(1, 2, 1));
        assert_eq!(base, jhash_2words(1, 2, 0));
    }

    #[test]
    fn selection_is_hash_mod_count() {
        let ep = endpoint(5);
        for port in [1u16, 80, 443, 40000, 65535] {
            let src = Ipv4Addr::new(192, 168, 1, 10);
            let sel = select_backend(&ep, src, port).unwrap();
            let expected = flow_hash(src, port) % 5;
            assert_eq!(sel.index, expected);
            assert_eq!(sel.backend, ep.remote(expected as usize).unwrap());
        }
    }

    #[test]
    fn selection_is_deterministic() {
        let ep = endpoint(7);
        let src = Ipv4Addr::new(172, 20, 3, 4);
        let first = select_backend(&ep, src, 5353).unwrap();
        for _ in 0..100 {
            assert_eq!(select_backend(&ep, src, 5353).unwrap(), first);
        }
    }

    #[test]
    fn single_replica_always_selected() {
        let ep = endpoint(1);
        for port in 0..512u16 {
            let sel = select_backend(&ep, Ipv4Addr::new(10, 9, 8, 7), port).unwrap();
            assert_eq!(sel.index, 0);
            assert_eq!(sel.backend, Ipv4Addr::new(10, 1, 0, 1));
        }
    }

    #[test]
    fn no_replicas_is_drop() {
        let ep = ScaledEndpoint::empty();
        let err = select_backend(&ep, Ipv4Addr::new(10, 0, 0, 1), 1).unwrap_err();
        assert_eq!(err, Fault::NoBackends);
        assert!(err.is_drop());
    }

    #[test]
    fn corrupted_count_is_invariant_violation() {
        let mut ep = endpoint(2);
        ep.nremote_ips = u32::MAX;
        // Find a flow whose index lands past the array.
        let (port, index) = (0..u16::MAX)
            .map(|p| (p, flow_hash(Ipv4Addr::new(10, 0, 0, 1), p) % u32::MAX))
            .find(|(_, i)| *i as usize >= MAX_REMOTES)
            .unwrap();

        assert_eq!(
            select_backend(&ep, Ipv4Addr::new(10, 0, 0, 1), port),
            Err(Fault::InvariantViolation {
                index,
                max: MAX_REMOTES as u32
            })
        );
    }

    #[test]
    fn spreads_flows_across_replicas() {
        let ep = endpoint(4);
        let mut hits = [0u32; 4];
        for port in 1024..2048u16 {
            let sel = select_backend(&ep, Ipv4Addr::new(192, 168, 0, 1), port).unwrap();
            hits[sel.index as usize] += 1;
        }
        assert!(hits.iter().all(|h| *h > 0));
    }
}
