//! Builder for Geneve-encapsulated frames as the transit pipeline sees them.
//!
//! Used by the tests and by `sep craft` to produce input for offline
//! decisions.

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};

use crate::checksum::ipv4_header_checksum;
use crate::headers::{
    ETH_P_IP, GENEVE_PORT, GENEVE_PROTO_ETHERNET, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP,
    RTS_DATA_WORDS, RTS_OPT_SIZE, SCALED_EP_DATA_WORDS, SCALED_EP_OPT_SIZE, TRN_GNV_OPT_CLASS,
    TRN_GNV_RTS_OPT_TYPE, TRN_GNV_SCALED_EP_OPT_TYPE,
};

/// Inner payload protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerProto {
    Udp,
    Tcp,
    /// ICMP echo request.
    Icmp,
    /// Any other protocol number, no L4 header emitted.
    Raw(u8),
}

impl InnerProto {
    pub fn number(&self) -> u8 {
        match self {
            InnerProto::Udp => IPPROTO_UDP,
            InnerProto::Tcp => IPPROTO_TCP,
            InnerProto::Icmp => IPPROTO_ICMP,
            InnerProto::Raw(p) => *p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameBuilder {
    outer_src_mac: [u8; 6],
    outer_dst_mac: [u8; 6],
    outer_src_ip: Ipv4Addr,
    outer_dst_ip: Ipv4Addr,
    outer_ttl: u8,
    vni: u32,
    options_words: u8,
    inner_src_mac: [u8; 6],
    inner_dst_mac: [u8; 6],
    inner_ether_type: u16,
    inner_src: (Ipv4Addr, u16),
    inner_dst: (Ipv4Addr, u16),
    inner_proto: InnerProto,
    inner_ip_options: Vec<u8>,
    payload: Vec<u8>,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    /// Options area holding both transit options, padded to whole words.
    pub const OPTIONS_LEN: usize = (RTS_OPT_SIZE + SCALED_EP_OPT_SIZE + 3) / 4 * 4;

    pub fn new() -> Self {
        Self {
            outer_src_mac: [0x02, 0, 0, 0, 0, 0x01],
            outer_dst_mac: [0x02, 0, 0, 0, 0, 0x02],
            outer_src_ip: Ipv4Addr::new(172, 16, 0, 1),
            outer_dst_ip: Ipv4Addr::new(172, 16, 0, 2),
            outer_ttl: 64,
            vni: 1,
            options_words: (Self::OPTIONS_LEN / 4) as u8,
            inner_src_mac: [0x0a, 0, 0, 0, 0, 0x0a],
            inner_dst_mac: [0x0a, 0, 0, 0, 0, 0x0b],
            inner_ether_type: ETH_P_IP,
            inner_src: (Ipv4Addr::new(192, 168, 1, 10), 40000),
            inner_dst: (Ipv4Addr::new(10, 0, 0, 3), 80),
            inner_proto: InnerProto::Udp,
            inner_ip_options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn outer_macs(mut self, src: [u8; 6], dst: [u8; 6]) -> Self {
        self.outer_src_mac = src;
        self.outer_dst_mac = dst;
        self
    }

    pub fn outer_ips(mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        self.outer_src_ip = src;
        self.outer_dst_ip = dst;
        self
    }

    pub fn outer_ttl(mut self, ttl: u8) -> Self {
        self.outer_ttl = ttl;
        self
    }

    /// Only the low 24 bits are encoded.
    pub fn vni(mut self, vni: u32) -> Self {
        self.vni = vni;
        self
    }

    /// Overrides the Geneve option length field (6 bits).
    pub fn options_len_words(mut self, words: u8) -> Self {
        self.options_words = words & 0x3f;
        self
    }

    pub fn inner_macs(mut self, src: [u8; 6], dst: [u8; 6]) -> Self {
        self.inner_src_mac = src;
        self.inner_dst_mac = dst;
        self
    }

    pub fn inner_ether_type(mut self, ether_type: u16) -> Self {
        self.inner_ether_type = ether_type;
        self
    }

    pub fn inner_src(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.inner_src = (addr, port);
        self
    }

    pub fn inner_dst(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.inner_dst = (addr, port);
        self
    }

    pub fn inner_proto(mut self, proto: InnerProto) -> Self {
        self.inner_proto = proto;
        self
    }

    /// Options appended to the inner IPv4 header, padded to whole words.
    pub fn inner_ip_options(mut self, options: &[u8]) -> Self {
        self.inner_ip_options = options.to_vec();
        while self.inner_ip_options.len() % 4 != 0 {
            self.inner_ip_options.push(0);
        }
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let inner = self.inner_frame();
        let options = self.options();

        let udp_len = 8 + 8 + options.len() + inner.len();
        let ip_len = 20 + udp_len;

        let mut buf = BytesMut::with_capacity(14 + ip_len);

        buf.put_slice(&self.outer_dst_mac);
        buf.put_slice(&self.outer_src_mac);
        buf.put_u16(ETH_P_IP);

        put_ipv4(
            &mut buf,
            ip_len as u16,
            self.outer_ttl,
            IPPROTO_UDP,
            self.outer_src_ip,
            self.outer_dst_ip,
            &[],
        );

        buf.put_u16(49152);
        buf.put_u16(GENEVE_PORT);
        buf.put_u16(udp_len as u16);
        buf.put_u16(0);

        buf.put_u8(self.options_words & 0x3f);
        buf.put_u8(0);
        buf.put_u16(GENEVE_PROTO_ETHERNET);
        let vni = self.vni.to_be_bytes();
        buf.put_slice(&vni[1..4]);
        buf.put_u8(0);

        buf.put_slice(&options);
        buf.put_slice(&inner);

        buf.to_vec()
    }

    /// Options area: route-state option with a stale host entry, then an
    /// empty scaled-endpoint option, then zero padding.
    fn options(&self) -> Vec<u8> {
        let mut opts = BytesMut::with_capacity(Self::OPTIONS_LEN);

        opts.put_u16(TRN_GNV_OPT_CLASS);
        opts.put_u8(TRN_GNV_RTS_OPT_TYPE);
        opts.put_u8(RTS_DATA_WORDS);
        opts.put_u8(0x03);
        opts.put_slice(&[0; 3]);
        opts.put_slice(&[172, 16, 0, 99]);
        opts.put_slice(&[0x02, 0, 0, 0, 0, 0x63]);
        opts.put_slice(&[0; 2]);

        opts.put_u16(TRN_GNV_OPT_CLASS);
        opts.put_u8(TRN_GNV_SCALED_EP_OPT_TYPE);
        opts.put_u8(SCALED_EP_DATA_WORDS);
        opts.put_slice(&[0; SCALED_EP_OPT_SIZE - 4]);

        let mut opts = opts.to_vec();
        opts.resize(self.options_words as usize * 4, 0);
        opts
    }

    fn inner_frame(&self) -> Vec<u8> {
        let l4 = self.inner_l4();
        let ip_len = 20 + self.inner_ip_options.len() + l4.len();

        let mut buf = BytesMut::with_capacity(14 + ip_len);
        buf.put_slice(&self.inner_dst_mac);
        buf.put_slice(&self.inner_src_mac);
        buf.put_u16(self.inner_ether_type);

        put_ipv4(
            &mut buf,
            ip_len as u16,
            64,
            self.inner_proto.number(),
            self.inner_src.0,
            self.inner_dst.0,
            &self.inner_ip_options,
        );

        buf.put_slice(&l4);
        buf.to_vec()
    }

    fn inner_l4(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self.inner_proto {
            InnerProto::Udp => {
                buf.put_u16(self.inner_src.1);
                buf.put_u16(self.inner_dst.1);
                buf.put_u16((8 + self.payload.len()) as u16);
                buf.put_u16(0);
            }
            InnerProto::Tcp => {
                buf.put_u16(self.inner_src.1);
                buf.put_u16(self.inner_dst.1);
                buf.put_u32(1);
                buf.put_u32(0);
                // Data offset 5, SYN.
                buf.put_u16(0x5002);
                buf.put_u16(65535);
                buf.put_u16(0);
                buf.put_u16(0);
            }
            InnerProto::Icmp => {
                buf.put_u8(8);
                buf.put_u8(0);
                buf.put_u16(0);
                buf.put_u16(1);
                buf.put_u16(1);
            }
            InnerProto::Raw(_) => {}
        }
        buf.put_slice(&self.payload);
        buf.to_vec()
    }
}

fn put_ipv4(
    buf: &mut BytesMut,
    tot_len: u16,
    ttl: u8,
    protocol: u8,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    options: &[u8],
) {
    let mut hdr = BytesMut::with_capacity(20 + options.len());
    hdr.put_u8(0x40 | ((20 + options.len()) / 4) as u8);
    hdr.put_u8(0);
    hdr.put_u16(tot_len);
    hdr.put_u16(0);
    hdr.put_u16(0x4000);
    hdr.put_u8(ttl);
    hdr.put_u8(protocol);
    hdr.put_u16(0);
    hdr.put_slice(&src.octets());
    hdr.put_slice(&dst.octets());
    hdr.put_slice(options);

    let csum = ipv4_header_checksum(&hdr);
    hdr[10..12].copy_from_slice(&csum);
    buf.put_slice(&hdr);
}
