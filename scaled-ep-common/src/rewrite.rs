//! In-place rewrite of a packet that has a backend selected.

use core::net::Ipv4Addr;

use crate::checksum::{Checksum, HeaderChecksum};
use crate::headers::{
    RtsData, ScaledEpData, ScaledEpTarget, SCALED_EP_DATA_WORDS, RTS_DATA_WORDS,
    TRN_GNV_OPT_CLASS, TRN_GNV_RTS_OPT_TYPE, TRN_GNV_SCALED_EP_OPT_TYPE, TRN_SCALED_EP_MODIFY,
};
use crate::parser::ParsedContext;

/// Payload written into the scaled-endpoint option for the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteDirective {
    pub backend: Ipv4Addr,
    pub saddr: Ipv4Addr,
    /// Host order.
    pub sport: u16,
    /// Host order.
    pub dport: u16,
    pub h_source: [u8; 6],
    pub h_dest: [u8; 6],
}

impl RewriteDirective {
    /// Directive for the flow in `ctx`, pointing at `backend`. The inner MAC
    /// addresses are copied as they are; the inner frame is not touched.
    pub fn new(ctx: &ParsedContext<'_>, backend: Ipv4Addr) -> Self {
        let inner_eth = ctx.header(ctx.inner_eth);
        Self {
            backend,
            saddr: ctx.tuple.saddr,
            sport: ctx.tuple.sport,
            dport: ctx.tuple.dport,
            h_source: inner_eth.h_source,
            h_dest: inner_eth.h_dest,
        }
    }

    /// Option payload in wire layout.
    pub fn to_data(&self) -> ScaledEpData {
        ScaledEpData {
            msg_type: TRN_SCALED_EP_MODIFY,
            target: ScaledEpTarget {
                saddr: self.saddr.octets(),
                daddr: self.backend.octets(),
                sport: self.sport.to_be(),
                dport: self.dport.to_be(),
                h_source: self.h_source,
                h_dest: self.h_dest,
            },
        }
    }

    /// Reads a directive back from option payload bytes.
    pub fn from_data(data: &ScaledEpData) -> Option<Self> {
        if data.msg_type != TRN_SCALED_EP_MODIFY {
            return None;
        }
        let target = data.target;
        Some(Self {
            backend: Ipv4Addr::from(target.daddr),
            saddr: Ipv4Addr::from(target.saddr),
            sport: u16::from_be(target.sport),
            dport: u16::from_be(target.dport),
            h_source: target.h_source,
            h_dest: target.h_dest,
        })
    }
}

/// Stamps the scaled-endpoint option header and writes `directive` into it.
pub fn write_directive(ctx: &mut ParsedContext<'_>, directive: &RewriteDirective) {
    let opt = ctx.header_mut(ctx.geneve.scaled_ep_opt);
    opt.hdr.set(
        TRN_GNV_OPT_CLASS,
        TRN_GNV_SCALED_EP_OPT_TYPE,
        SCALED_EP_DATA_WORDS,
    );
    opt.data = directive.to_data();
}

/// Resets the route-state option to an empty entry.
// Populating it with the backend's host would save a hop; not done yet.
pub fn reset_rts_opt(ctx: &mut ParsedContext<'_>) {
    let opt = ctx.header_mut(ctx.geneve.rts_opt);
    opt.hdr
        .set(TRN_GNV_OPT_CLASS, TRN_GNV_RTS_OPT_TYPE, RTS_DATA_WORDS);
    opt.data = RtsData::default();
}

/// Swaps the outer IPv4 addresses and patches the header checksum for each
/// rewritten address word.
pub fn swap_outer_ips(ctx: &mut ParsedContext<'_>) {
    let ip = ctx.header_mut(ctx.outer_ip);
    let old_src = ip.saddr;
    let old_dst = ip.daddr;

    let mut csum = Checksum::from(HeaderChecksum::wrap(ip.check));
    csum.replace(&old_src, &old_dst);
    csum.replace(&old_dst, &old_src);

    ip.saddr = old_dst;
    ip.daddr = old_src;
    ip.check = HeaderChecksum::from(csum).bytes();
}

pub fn swap_outer_macs(ctx: &mut ParsedContext<'_>) {
    ctx.header_mut(ctx.outer_eth).swap_macs();
}

/// Full rewrite for a selected backend; returns what was written.
pub fn rewrite(ctx: &mut ParsedContext<'_>, backend: Ipv4Addr) -> RewriteDirective {
    let directive = RewriteDirective::new(ctx, backend);
    write_directive(ctx, &directive);
    reset_rts_opt(ctx);
    swap_outer_ips(ctx);
    swap_outer_macs(ctx);
    directive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ipv4_header_valid;
    use crate::frame::FrameBuilder;
    use crate::headers::RtsOpt;
    use crate::parser::parse;

    fn frame() -> Vec<u8> {
        FrameBuilder::new()
            .outer_ips(Ipv4Addr::new(172, 16, 0, 1), Ipv4Addr::new(172, 16, 0, 2))
            .outer_macs([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
            .inner_macs([0xa, 0, 0, 0, 0, 0xa], [0xa, 0, 0, 0, 0, 0xb])
            .inner_src(Ipv4Addr::new(192, 168, 1, 10), 40000)
            .inner_dst(Ipv4Addr::new(10, 0, 0, 3), 80)
            .build()
    }

    #[test]
    fn directive_carries_flow_and_backend() {
        let mut buf = frame();
        let mut ctx = parse(&mut buf).unwrap();
        let backend = Ipv4Addr::new(10, 0, 1, 7);

        let directive = rewrite(&mut ctx, backend);
        let opt = *ctx.header(ctx.geneve.scaled_ep_opt);

        let class = opt.hdr.opt_class;
        assert_eq!(u16::from_be(class), TRN_GNV_OPT_CLASS);
        assert_eq!(opt.hdr.opt_type, TRN_GNV_SCALED_EP_OPT_TYPE);
        assert_eq!(opt.hdr.len_words(), SCALED_EP_DATA_WORDS);
        assert_eq!(RewriteDirective::from_data(&opt.data), Some(directive));

        assert_eq!(directive.backend, backend);
        assert_eq!(directive.saddr, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(directive.sport, 40000);
        assert_eq!(directive.dport, 80);
        assert_eq!(directive.h_source, [0xa, 0, 0, 0, 0, 0xa]);
        assert_eq!(directive.h_dest, [0xa, 0, 0, 0, 0, 0xb]);
    }

    #[test]
    fn rewrite_is_idempotent_for_directive() {
        let backend = Ipv4Addr::new(10, 0, 1, 7);

        let mut a = frame();
        let mut ctx = parse(&mut a).unwrap();
        let first = RewriteDirective::new(&ctx, backend);
        write_directive(&mut ctx, &first);
        let once = ctx.header(ctx.geneve.scaled_ep_opt).data;

        let second = RewriteDirective::new(&ctx, backend);
        write_directive(&mut ctx, &second);
        let twice = ctx.header(ctx.geneve.scaled_ep_opt).data;

        assert_eq!(first, second);
        assert_eq!(once, twice);
    }

    #[test]
    fn route_state_is_reset() {
        let mut buf = frame();
        let mut ctx = parse(&mut buf).unwrap();
        assert_ne!(ctx.header(ctx.geneve.rts_opt).data, RtsData::default());

        reset_rts_opt(&mut ctx);
        let opt: RtsOpt = *ctx.header(ctx.geneve.rts_opt);
        assert_eq!(opt.data, RtsData::default());
        assert_eq!(opt.hdr.opt_type, TRN_GNV_RTS_OPT_TYPE);
        assert_eq!(opt.hdr.len_words(), RTS_DATA_WORDS);
    }

    #[test]
    fn outer_turnaround_keeps_checksum_valid() {
        let mut buf = frame();
        let mut ctx = parse(&mut buf).unwrap();
        swap_outer_ips(&mut ctx);
        swap_outer_macs(&mut ctx);

        let ip = *ctx.header(ctx.outer_ip);
        assert_eq!(ip.saddr, [172, 16, 0, 2]);
        assert_eq!(ip.daddr, [172, 16, 0, 1]);

        let eth = *ctx.header(ctx.outer_eth);
        assert_eq!(eth.h_source, [2, 0, 0, 0, 0, 2]);
        assert_eq!(eth.h_dest, [2, 0, 0, 0, 0, 1]);

        assert!(ipv4_header_valid(&ctx.frame()[14..34]));
    }

    #[test]
    fn inner_frame_is_untouched() {
        let original = frame();
        let mut buf = original.clone();
        let inner_start = 50 + FrameBuilder::OPTIONS_LEN;
        {
            let mut ctx = parse(&mut buf).unwrap();
            rewrite(&mut ctx, Ipv4Addr::new(10, 0, 1, 7));
        }
        assert_eq!(&buf[inner_start..], &original[inner_start..]);
        assert_eq!(buf.len(), original.len());
    }
}
