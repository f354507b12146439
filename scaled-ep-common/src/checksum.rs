// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Derived from the checksum module of oxidecomputer/opte
// (lib/opte/src/engine/checksum.rs), Copyright 2022 Oxide Computer Company.

//! Internet checksum helpers.
//!
//! The checksum is a one's complement sum of 16-bit words. The words are
//! read and written with native endianness: the bytes being summed are in
//! network order, and so is the result when stored back (RFC 1071 §1.B).
//! Incremental updates follow RFC 1624.

/// Checksum bytes as stored in a header, one's complement applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderChecksum {
    inner: [u8; 2],
}

impl HeaderChecksum {
    pub fn wrap(bytes: [u8; 2]) -> Self {
        Self { inner: bytes }
    }

    pub fn bytes(&self) -> [u8; 2] {
        self.inner
    }
}

impl From<Checksum> for HeaderChecksum {
    fn from(mut csum: Checksum) -> Self {
        Self {
            inner: (!csum.finalize()).to_ne_bytes(),
        }
    }
}

/// Rolling one's complement sum with carries folded on finalize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    inner: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self { inner: 0 }
    }

    /// Sum of `bytes` from scratch.
    pub fn compute(bytes: &[u8]) -> Self {
        Self {
            inner: csum_add(0, bytes),
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_add(self.inner, bytes);
    }

    /// Removes `bytes` from the sum by adding their complement.
    pub fn sub_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_sub(self.inner, bytes);
    }

    /// Replaces `old` with `new` in the sum (RFC 1624, eqn. 3).
    pub fn replace(&mut self, old: &[u8], new: &[u8]) {
        self.sub_bytes(old);
        self.add_bytes(new);
    }

    pub fn finalize(&mut self) -> u16 {
        while (self.inner >> 16) != 0 {
            self.inner = (self.inner >> 16) + (self.inner & 0xffff);
        }

        (self.inner & 0xffff) as u16
    }
}

impl From<HeaderChecksum> for Checksum {
    fn from(hc: HeaderChecksum) -> Self {
        Self {
            inner: (!u16::from_ne_bytes(hc.bytes())) as u32,
        }
    }
}

fn csum_add(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut words = bytes.chunks_exact(2);
    for w in &mut words {
        csum += u16::from_ne_bytes([w[0], w[1]]) as u32;
    }
    if let [last] = words.remainder() {
        csum += u16::from_ne_bytes([*last, 0]) as u32;
    }
    csum
}

fn csum_sub(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut words = bytes.chunks_exact(2);
    for w in &mut words {
        csum += (!u16::from_ne_bytes([w[0], w[1]])) as u32;
    }
    if let [last] = words.remainder() {
        csum += (!u16::from_ne_bytes([*last, 0])) as u32;
    }
    csum
}

/// Full checksum of an IPv4 header whose checksum field is zeroed.
pub fn ipv4_header_checksum(header: &[u8]) -> [u8; 2] {
    HeaderChecksum::from(Checksum::compute(header)).bytes()
}

/// Whether an IPv4 header, checksum field included, sums to all ones.
pub fn ipv4_header_valid(header: &[u8]) -> bool {
    Checksum::compute(header).finalize() == 0xffff
}

#[cfg(test)]
mod tests {
    use super::*;

    // 20-byte header from RFC 1071 style examples, checksum zeroed.
    const HDR: [u8; 20] = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8, 0x00,
        0x01, 0xc0, 0xa8, 0x00, 0xc7,
    ];

    #[test]
    fn full_checksum_matches_known_value() {
        assert_eq!(ipv4_header_checksum(&HDR), [0xb8, 0x61]);

        let mut hdr = HDR;
        hdr[10..12].copy_from_slice(&[0xb8, 0x61]);
        assert!(ipv4_header_valid(&hdr));
    }

    #[test]
    fn incremental_update_matches_recompute() {
        let mut hdr = HDR;
        hdr[10..12].copy_from_slice(&ipv4_header_checksum(&HDR));

        let new_src = [10, 1, 2, 3];
        let mut csum = Checksum::from(HeaderChecksum::wrap([hdr[10], hdr[11]]));
        csum.replace(&hdr[12..16], &new_src);
        hdr[12..16].copy_from_slice(&new_src);
        hdr[10..12].copy_from_slice(&HeaderChecksum::from(csum).bytes());

        let mut zeroed = hdr;
        zeroed[10..12].copy_from_slice(&[0, 0]);
        assert_eq!([hdr[10], hdr[11]], ipv4_header_checksum(&zeroed));
        assert!(ipv4_header_valid(&hdr));
    }
}
