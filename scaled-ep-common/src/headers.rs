//! Wire layouts of the headers the stage reads and rewrites.
//!
//! All structs are `repr(C, packed)` so they can be viewed in place over
//! frame bytes. Multi-byte integer fields hold network-order values as they
//! sit on the wire; use the accessors to get host-order values.

use core::mem;

/// Plain-old-data header that may be viewed in place over frame bytes.
///
/// # Safety
///
/// Implementors must be `repr(C, packed)` (alignment 1) and valid for every
/// bit pattern.
pub unsafe trait Header: Copy {
    const LEN: usize = mem::size_of::<Self>();
}

/// Ethernet header structure.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct EthHdr {
    /// Destination MAC address.
    pub h_dest: [u8; 6],
    /// Source MAC address.
    pub h_source: [u8; 6],
    /// Ethernet type.
    pub h_proto: u16,
}

impl EthHdr {
    pub fn ether_type(&self) -> u16 {
        u16::from_be(self.h_proto)
    }

    pub fn swap_macs(&mut self) {
        let dest = self.h_dest;
        self.h_dest = self.h_source;
        self.h_source = dest;
    }
}

/// IPv4 header structure, without options.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Ipv4Hdr {
    /// Version (4 bits) and header length in words (4 bits).
    pub ver_ihl: u8,
    pub tos: u8,
    pub tot_len: u16,
    pub id: u16,
    pub frag_off: u16,
    pub ttl: u8,
    pub protocol: u8,
    /// Header checksum, kept as raw bytes.
    pub check: [u8; 2],
    pub saddr: [u8; 4],
    pub daddr: [u8; 4],
}

impl Ipv4Hdr {
    /// Header length in bytes, options included.
    pub fn header_len(&self) -> usize {
        ((self.ver_ihl & 0x0f) as usize) * 4
    }
}

/// UDP header structure.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct UdpHdr {
    /// Source port.
    pub source: u16,
    /// Destination port.
    pub dest: u16,
    /// Length of UDP header and data.
    pub len: u16,
    /// Checksum.
    pub check: u16,
}

/// TCP header structure, without options.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct TcpHdr {
    pub source: u16,
    pub dest: u16,
    pub seq: u32,
    pub ack_seq: u32,
    /// Data offset, reserved bits and flags.
    pub doff_flags: u16,
    pub window: u16,
    pub check: u16,
    pub urg_ptr: u16,
}

/// Fixed portion of a Geneve header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct GeneveHdr {
    /// Version (2 bits) and options length in 4-byte words (6 bits).
    pub ver_opt_len: u8,
    /// OAM and critical-options flags.
    pub flags: u8,
    pub proto_type: u16,
    pub vni: [u8; 3],
    pub rsvd: u8,
}

impl GeneveHdr {
    pub fn opt_len_words(&self) -> u8 {
        self.ver_opt_len & 0x3f
    }

    /// Length of the options area in bytes.
    pub fn opt_len(&self) -> usize {
        self.opt_len_words() as usize * 4
    }
}

/// Header of one Geneve option TLV.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct GeneveOptHdr {
    pub opt_class: u16,
    pub opt_type: u8,
    /// Reserved (3 high bits) and payload length in 4-byte words (5 bits).
    pub flags_len: u8,
}

impl GeneveOptHdr {
    /// Stamps class, type and length, leaving the reserved bits alone.
    pub fn set(&mut self, opt_class: u16, opt_type: u8, len_words: u8) {
        self.opt_class = opt_class.to_be();
        self.opt_type = opt_type;
        self.flags_len = (self.flags_len & 0xe0) | (len_words & 0x1f);
    }

    pub fn len_words(&self) -> u8 {
        self.flags_len & 0x1f
    }
}

/// Payload of the route-state option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C, packed)]
pub struct RtsData {
    /// `match_flow` (bit 0) and `host_requested` (bit 1).
    pub flags: u8,
    pub rsvd: [u8; 3],
    /// Host that should be addressed directly, network order.
    pub host_ip: [u8; 4],
    pub host_mac: [u8; 6],
    pub rsvd2: [u8; 2],
}

/// Route-state option as it sits first in the options area.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct RtsOpt {
    pub hdr: GeneveOptHdr,
    pub data: RtsData,
}

/// Redirect target carried in the scaled-endpoint option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C, packed)]
pub struct ScaledEpTarget {
    pub saddr: [u8; 4],
    pub daddr: [u8; 4],
    /// Ports in network order.
    pub sport: u16,
    pub dport: u16,
    pub h_source: [u8; 6],
    pub h_dest: [u8; 6],
}

/// Payload of the scaled-endpoint option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C, packed)]
pub struct ScaledEpData {
    pub msg_type: u8,
    pub target: ScaledEpTarget,
}

/// Scaled-endpoint option, directly after the route-state option.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct ScaledEpOpt {
    pub hdr: GeneveOptHdr,
    pub data: ScaledEpData,
}

unsafe impl Header for EthHdr {}
unsafe impl Header for Ipv4Hdr {}
unsafe impl Header for UdpHdr {}
unsafe impl Header for TcpHdr {}
unsafe impl Header for GeneveHdr {}
unsafe impl Header for RtsOpt {}
unsafe impl Header for ScaledEpOpt {}

/// Constants for Ethernet protocol values.
pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;

/// Constants for IP protocol values.
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// IANA-assigned Geneve UDP port.
pub const GENEVE_PORT: u16 = 6081;

/// Geneve protocol type for a bridged Ethernet payload.
pub const GENEVE_PROTO_ETHERNET: u16 = 0x6558;

/// Option class owned by the transit pipeline.
pub const TRN_GNV_OPT_CLASS: u16 = 0x0111;
pub const TRN_GNV_RTS_OPT_TYPE: u8 = 0x48;
pub const TRN_GNV_SCALED_EP_OPT_TYPE: u8 = 0x49;

/// Scaled-endpoint message asking the next stage to modify the flow.
pub const TRN_SCALED_EP_MODIFY: u8 = b'M';

/// Size constants for packet headers.
pub const ETH_HDR_SIZE: usize = mem::size_of::<EthHdr>();
pub const IPV4_HDR_SIZE: usize = mem::size_of::<Ipv4Hdr>();
pub const UDP_HDR_SIZE: usize = mem::size_of::<UdpHdr>();
pub const TCP_HDR_SIZE: usize = mem::size_of::<TcpHdr>();
pub const GENEVE_HDR_SIZE: usize = mem::size_of::<GeneveHdr>();
pub const RTS_OPT_SIZE: usize = mem::size_of::<RtsOpt>();
pub const SCALED_EP_OPT_SIZE: usize = mem::size_of::<ScaledEpOpt>();

/// Length fields written into the option headers (payload size / 4).
pub const RTS_DATA_WORDS: u8 = (mem::size_of::<RtsData>() / 4) as u8;
pub const SCALED_EP_DATA_WORDS: u8 = (mem::size_of::<ScaledEpData>() / 4) as u8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_sizes() {
        assert_eq!(ETH_HDR_SIZE, 14);
        assert_eq!(IPV4_HDR_SIZE, 20);
        assert_eq!(UDP_HDR_SIZE, 8);
        assert_eq!(TCP_HDR_SIZE, 20);
        assert_eq!(GENEVE_HDR_SIZE, 8);
        assert_eq!(RTS_OPT_SIZE, 20);
        assert_eq!(mem::size_of::<ScaledEpData>(), 25);
        assert_eq!(SCALED_EP_OPT_SIZE, 29);
        assert_eq!(RTS_DATA_WORDS, 4);
        assert_eq!(SCALED_EP_DATA_WORDS, 6);
    }

    #[test]
    fn option_header_keeps_reserved_bits() {
        let mut hdr = GeneveOptHdr {
            opt_class: 0,
            opt_type: 0,
            flags_len: 0xe0 | 0x1f,
        };
        hdr.set(TRN_GNV_OPT_CLASS, TRN_GNV_SCALED_EP_OPT_TYPE, 6);
        assert_eq!(hdr.flags_len, 0xe6);
        assert_eq!(hdr.len_words(), 6);
        let class = hdr.opt_class;
        assert_eq!(u16::from_be(class), 0x0111);
    }

    #[test]
    fn geneve_option_length() {
        let hdr = GeneveHdr {
            ver_opt_len: 0x40 | 13,
            flags: 0,
            proto_type: GENEVE_PROTO_ETHERNET.to_be(),
            vni: [0, 0, 1],
            rsvd: 0,
        };
        assert_eq!(hdr.opt_len_words(), 13);
        assert_eq!(hdr.opt_len(), 52);
    }
}
