//! Parser chain for Geneve-encapsulated scaled-endpoint traffic.
//!
//! Stages run strictly forward:
//!
//! outer Ethernet → outer IPv4 → outer UDP → Geneve (+ options) →
//! inner Ethernet → inner IPv4 → inner UDP | TCP | ICMP
//!
//! Each stage reserves its header through the [`Cursor`] before reading any
//! field, and either hands the advanced cursor to the next stage or returns
//! a terminal [`Fault`].

use core::net::Ipv4Addr;

use crate::cursor::{Cursor, HeaderRef};
use crate::error::{Fault, Stage, Unsupported};
use crate::headers::{
    EthHdr, GeneveHdr, Header, Ipv4Hdr, RtsOpt, ScaledEpOpt, TcpHdr, UdpHdr, ETH_P_IP,
    IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP, IPV4_HDR_SIZE, RTS_OPT_SIZE, SCALED_EP_OPT_SIZE,
};
use crate::types::TunnelId;

/// Identity of the inner flow. Ports are host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InnerTuple {
    pub saddr: Ipv4Addr,
    pub daddr: Ipv4Addr,
    pub sport: u16,
    pub dport: u16,
    pub protocol: u8,
}

/// Inner transport header, if the protocol has one.
#[derive(Debug, Clone, Copy)]
pub enum InnerL4 {
    Udp(HeaderRef<UdpHdr>),
    Tcp(HeaderRef<TcpHdr>),
    /// ICMP has no ports; the tuple carries zeros.
    Icmp,
}

/// The two transit options at fixed positions in the Geneve options area.
#[derive(Debug, Clone, Copy)]
pub struct GeneveRefs {
    pub header: HeaderRef<GeneveHdr>,
    pub rts_opt: HeaderRef<RtsOpt>,
    pub scaled_ep_opt: HeaderRef<ScaledEpOpt>,
}

/// Every header of one packet, each proven to lie inside the frame.
pub struct ParsedContext<'a> {
    cursor: Cursor<'a>,
    pub outer_eth: HeaderRef<EthHdr>,
    pub outer_ip: HeaderRef<Ipv4Hdr>,
    pub outer_udp: HeaderRef<UdpHdr>,
    pub geneve: GeneveRefs,
    pub inner_eth: HeaderRef<EthHdr>,
    pub inner_ip: HeaderRef<Ipv4Hdr>,
    pub inner_l4: InnerL4,
    pub tunnel_id: TunnelId,
    pub tuple: InnerTuple,
}

impl<'a> ParsedContext<'a> {
    pub fn header<T: Header>(&self, hdr: HeaderRef<T>) -> &T {
        self.cursor.get(hdr)
    }

    pub fn header_mut<T: Header>(&mut self, hdr: HeaderRef<T>) -> &mut T {
        self.cursor.get_mut(hdr)
    }

    pub fn frame(&self) -> &[u8] {
        self.cursor.frame()
    }
}

/// Runs the whole chain over `frame`.
pub fn parse(frame: &mut [u8]) -> Result<ParsedContext<'_>, Fault> {
    let mut cur = Cursor::new(frame);

    let outer_eth = parse_outer_eth(&mut cur)?;
    let outer_ip = parse_outer_ipv4(&mut cur)?;
    let outer_udp = parse_outer_udp(&mut cur)?;
    let geneve = parse_geneve(&mut cur)?;
    let tunnel_id = TunnelId::from_vni(cur.get(geneve.header).vni);
    let inner_eth = parse_inner_eth(&mut cur)?;
    let (inner_ip, inner_l4, tuple) = parse_inner_ipv4(&mut cur)?;

    Ok(ParsedContext {
        cursor: cur,
        outer_eth,
        outer_ip,
        outer_udp,
        geneve,
        inner_eth,
        inner_ip,
        inner_l4,
        tunnel_id,
        tuple,
    })
}

// The outer ethertype is not checked here; whoever hands us the frame has
// already matched it as Geneve over IPv4.
fn parse_outer_eth(cur: &mut Cursor<'_>) -> Result<HeaderRef<EthHdr>, Fault> {
    cur.take::<EthHdr>(Stage::OuterEth)
}

// TTL is read from the fixed header before the IHL is trusted, so an
// expired packet is a drop even when its options are bogus.
fn parse_outer_ipv4(cur: &mut Cursor<'_>) -> Result<HeaderRef<Ipv4Hdr>, Fault> {
    let ip = cur.take::<Ipv4Hdr>(Stage::OuterIpv4)?;

    if cur.get(ip).ttl == 0 {
        return Err(Fault::ExpiredPacket);
    }

    skip_ipv4_options(cur, ip, Stage::OuterIpv4)?;
    Ok(ip)
}

// The tunnel port was matched before this stage was entered.
fn parse_outer_udp(cur: &mut Cursor<'_>) -> Result<HeaderRef<UdpHdr>, Fault> {
    cur.take::<UdpHdr>(Stage::OuterUdp)
}

fn parse_geneve(cur: &mut Cursor<'_>) -> Result<GeneveRefs, Fault> {
    let header = cur.take::<GeneveHdr>(Stage::Geneve)?;

    // The option length comes from the packet; the whole options area must
    // fit before anything inside it is located.
    let opt_len = cur.get(header).opt_len();
    if opt_len > cur.remaining() {
        return Err(Fault::MalformedPacket(Stage::Geneve));
    }

    // Both transit options must sit inside the options area, or rewriting
    // them would spill into the inner frame.
    if opt_len < RTS_OPT_SIZE + SCALED_EP_OPT_SIZE {
        return Err(Fault::MalformedPacket(Stage::GeneveOptions));
    }

    let rts_opt = cur.take::<RtsOpt>(Stage::GeneveOptions)?;
    let scaled_ep_opt = cur.take::<ScaledEpOpt>(Stage::GeneveOptions)?;
    cur.skip(opt_len - RTS_OPT_SIZE - SCALED_EP_OPT_SIZE, Stage::GeneveOptions)?;

    Ok(GeneveRefs {
        header,
        rts_opt,
        scaled_ep_opt,
    })
}

fn parse_inner_eth(cur: &mut Cursor<'_>) -> Result<HeaderRef<EthHdr>, Fault> {
    let eth = cur.take::<EthHdr>(Stage::InnerEth)?;

    let proto = cur.get(eth).ether_type();
    if proto != ETH_P_IP {
        return Err(Fault::UnsupportedInner(Unsupported::EtherType(proto)));
    }

    Ok(eth)
}

fn parse_inner_ipv4(
    cur: &mut Cursor<'_>,
) -> Result<(HeaderRef<Ipv4Hdr>, InnerL4, InnerTuple), Fault> {
    let ip = take_ipv4(cur, Stage::InnerIpv4)?;
    let hdr = *cur.get(ip);

    let mut tuple = InnerTuple {
        saddr: Ipv4Addr::from(hdr.saddr),
        daddr: Ipv4Addr::from(hdr.daddr),
        sport: 0,
        dport: 0,
        protocol: hdr.protocol,
    };

    let l4 = match hdr.protocol {
        IPPROTO_UDP => parse_inner_udp(cur, &mut tuple)?,
        IPPROTO_TCP => parse_inner_tcp(cur, &mut tuple)?,
        IPPROTO_ICMP => parse_inner_icmp(&mut tuple),
        other => return Err(Fault::UnsupportedInner(Unsupported::Protocol(other))),
    };

    Ok((ip, l4, tuple))
}

// The inner IPv4 stage owns the extent of the L4 header it announces, so a
// frame cut right after the IPv4 header is reported against that stage.
fn parse_inner_udp(cur: &mut Cursor<'_>, tuple: &mut InnerTuple) -> Result<InnerL4, Fault> {
    let udp = cur.take::<UdpHdr>(Stage::InnerIpv4)?;
    let hdr = cur.get(udp);
    tuple.sport = u16::from_be(hdr.source);
    tuple.dport = u16::from_be(hdr.dest);
    Ok(InnerL4::Udp(udp))
}

fn parse_inner_tcp(cur: &mut Cursor<'_>, tuple: &mut InnerTuple) -> Result<InnerL4, Fault> {
    let tcp = cur.take::<TcpHdr>(Stage::InnerIpv4)?;
    let hdr = cur.get(tcp);
    tuple.sport = u16::from_be(hdr.source);
    tuple.dport = u16::from_be(hdr.dest);
    Ok(InnerL4::Tcp(tcp))
}

// ICMP is hashed with zero ports and forwarded like any other flow. Whether
// it should be dropped instead is still open.
fn parse_inner_icmp(tuple: &mut InnerTuple) -> InnerL4 {
    tuple.sport = 0;
    tuple.dport = 0;
    InnerL4::Icmp
}

/// Reserves an IPv4 header and any options its IHL announces.
fn take_ipv4(cur: &mut Cursor<'_>, stage: Stage) -> Result<HeaderRef<Ipv4Hdr>, Fault> {
    let ip = cur.take::<Ipv4Hdr>(stage)?;
    skip_ipv4_options(cur, ip, stage)?;
    Ok(ip)
}

/// Moves past the options announced by the IHL of `ip`.
fn skip_ipv4_options(
    cur: &mut Cursor<'_>,
    ip: HeaderRef<Ipv4Hdr>,
    stage: Stage,
) -> Result<(), Fault> {
    let hdr_len = cur.get(ip).header_len();
    if hdr_len < IPV4_HDR_SIZE {
        return Err(Fault::MalformedPacket(stage));
    }
    cur.skip(hdr_len - IPV4_HDR_SIZE, stage)
}
