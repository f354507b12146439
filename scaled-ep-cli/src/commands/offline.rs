//! Offline frame crafting and decisions
//!
//! These commands run the same decision engine the XDP program runs, over
//! frames stored in files, so endpoint configurations can be checked without
//! a bpffs or root.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use scaled_ep_common::{
    config::SepConfig,
    frame::FrameBuilder,
    metrics::DecisionStats,
    parser::parse,
    process,
    rewrite::RewriteDirective,
    Decision,
};
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};

use crate::utils::{format_mac, parse_inner_proto, print_header};

/// Arguments of `sep craft`
pub struct CraftArgs {
    pub out: PathBuf,
    pub vni: u32,
    pub src: String,
    pub dst: String,
    pub proto: String,
    pub ttl: u8,
    pub truncate: Option<usize>,
}

/// Build a test frame and write it to `args.out`
pub fn craft(args: CraftArgs) -> Result<()> {
    let src: SocketAddrV4 = args
        .src
        .parse()
        .with_context(|| format!("Invalid source address '{}'", args.src))?;
    let dst: SocketAddrV4 = args
        .dst
        .parse()
        .with_context(|| format!("Invalid destination address '{}'", args.dst))?;
    let proto = parse_inner_proto(&args.proto)?;

    let mut frame = FrameBuilder::new()
        .vni(args.vni)
        .outer_ttl(args.ttl)
        .inner_src(*src.ip(), src.port())
        .inner_dst(*dst.ip(), dst.port())
        .inner_proto(proto)
        .build();

    if let Some(len) = args.truncate {
        frame.truncate(len);
    }

    std::fs::write(&args.out, &frame)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;

    println!("Wrote {} byte frame to {}", frame.len(), args.out.display());
    Ok(())
}

/// Run every frame in `frames` through the engine
pub fn decide(config: &Path, frames: &[PathBuf], out: Option<&Path>) -> Result<()> {
    if out.is_some() && frames.len() != 1 {
        bail!("--out takes exactly one input frame, got {}", frames.len());
    }

    let config = SepConfig::load(config)?;
    let (itf, eps) = config.providers()?;
    info!("Loaded {} scaled endpoints", eps.len());

    let mut stats = DecisionStats::new();

    for path in frames {
        let mut frame = std::fs::read(path)
            .with_context(|| format!("Failed to read frame {}", path.display()))?;
        debug!("{}: {} bytes", path.display(), frame.len());

        let decision = process(&mut frame, &itf, &eps);
        stats.record(&decision);
        println!("{}: {}", path.display(), decision);

        if let Decision::Transmit(_) = decision {
            print_directive(&mut frame);
            if let Some(out) = out {
                std::fs::write(out, &frame)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                println!("  rewritten frame written to {}", out.display());
            }
        }
    }

    if frames.len() > 1 {
        print_header("Summary");
        print!("{}", stats);
    }

    Ok(())
}

fn print_directive(frame: &mut [u8]) {
    let Ok(ctx) = parse(frame) else {
        return;
    };
    let opt = ctx.header(ctx.geneve.scaled_ep_opt);
    if let Some(directive) = RewriteDirective::from_data(&opt.data) {
        println!(
            "  directive: {}:{} -> {}:{} ({} -> {})",
            directive.saddr,
            directive.sport,
            directive.backend,
            directive.dport,
            format_mac(&directive.h_source),
            format_mac(&directive.h_dest)
        );
    }
}
