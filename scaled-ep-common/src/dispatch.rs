//! Entry point of the transit stage.
//!
//! [`process`] runs one packet to completion: interface identity, the parser
//! chain, endpoint resolution, backend selection and the rewrite. Every
//! failure is terminal and folded into a [`Decision`].

use core::fmt;
use core::net::Ipv4Addr;

use crate::error::{Action, ConfigSource, Fault};
use crate::hash::select_backend;
use crate::metrics;
use crate::parser::parse;
use crate::provider::{EndpointProvider, InterfaceProvider};
use crate::resolve::resolve;
use crate::rewrite::rewrite;
use crate::types::XdpAction;

/// Where a transmitted packet was steered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    pub backend: Ipv4Addr,
    pub index: u32,
    pub hash: u32,
    /// Interface the packet goes back out of.
    pub ifindex: u32,
}

/// Terminal outcome of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The frame was rewritten in place and goes back out the ingress port.
    Transmit(Redirect),
    Drop(Fault),
    Abort(Fault),
}

impl Decision {
    pub fn from_fault(fault: Fault) -> Self {
        match fault.action() {
            Action::Drop => Decision::Drop(fault),
            Action::Abort => Decision::Abort(fault),
        }
    }

    pub fn xdp_action(&self) -> XdpAction {
        match self {
            Decision::Transmit(_) => XdpAction::Tx,
            Decision::Drop(_) => XdpAction::Drop,
            Decision::Abort(_) => XdpAction::Aborted,
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        match self {
            Decision::Transmit(_) => None,
            Decision::Drop(f) | Decision::Abort(f) => Some(*f),
        }
    }

    pub fn is_transmit(&self) -> bool {
        matches!(self, Decision::Transmit(_))
    }

    /// Index of the `METRICS` slot this decision bumps.
    pub fn counter(&self) -> u32 {
        match self {
            Decision::Transmit(_) => metrics::TRANSMIT,
            Decision::Drop(fault) | Decision::Abort(fault) => fault.counter(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Transmit(r) => write!(
                f,
                "TRANSMIT backend {} (index {}, hash {:#010x}) via ifindex {}",
                r.backend, r.index, r.hash, r.ifindex
            ),
            Decision::Drop(fault) => write!(f, "DROP: {}", fault),
            Decision::Abort(fault) => write!(f, "ABORT: {}", fault),
        }
    }
}

/// Processes one frame against the given configuration sources.
///
/// On [`Decision::Transmit`] the frame has been rewritten in place and keeps
/// its length. On any other decision the frame is left untouched.
pub fn process<I, E>(frame: &mut [u8], itf: &I, eps: &E) -> Decision
where
    I: InterfaceProvider + ?Sized,
    E: EndpointProvider + ?Sized,
{
    match try_process(frame, itf, eps) {
        Ok(redirect) => Decision::Transmit(redirect),
        Err(fault) => Decision::from_fault(fault),
    }
}

fn try_process<I, E>(frame: &mut [u8], itf: &I, eps: &E) -> Result<Redirect, Fault>
where
    I: InterfaceProvider + ?Sized,
    E: EndpointProvider + ?Sized,
{
    let itf = itf
        .interface()
        .ok_or(Fault::ConfigMissing(ConfigSource::Interface))?;

    let mut ctx = parse(frame)?;

    let ep = resolve(eps, ctx.tunnel_id, ctx.tuple.daddr)?;
    let sel = select_backend(ep, ctx.tuple.saddr, ctx.tuple.sport)?;

    rewrite(&mut ctx, sel.backend);

    Ok(Redirect {
        backend: sel.backend,
        index: sel.index,
        hash: sel.hash,
        ifindex: itf.iface_index,
    })
}
