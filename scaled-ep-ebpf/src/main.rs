#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::{Array, HashMap},
    programs::XdpContext,
};
use aya_log_ebpf::{debug, info};

use scaled_ep_common::{
    metrics::{COUNTER_SLOTS, PACKETS_TOTAL},
    process,
    provider::SeenInterface,
    types::MAX_ENDPOINTS,
    Decision, EndpointKey, EndpointProvider, InterfaceConfig, InterfaceProvider, ScaledEndpoint,
};

mod utils;

use utils::{bump, frame_mut, ipv4_bits};

/// Identity of the attachment point (single entry).
#[map(name = "INTERFACE_CONFIG")]
static INTERFACE_CONFIG: Array<InterfaceConfig> = Array::with_max_entries(1, 0);

/// Scaled endpoints keyed by tunnel id and virtual address.
#[map(name = "ENDPOINTS")]
static ENDPOINTS: HashMap<EndpointKey, ScaledEndpoint> =
    HashMap::with_max_entries(MAX_ENDPOINTS, 0);

/// Decision counters, see `scaled_ep_common::metrics`.
#[map(name = "METRICS")]
static METRICS: HashMap<u32, u64> = HashMap::with_max_entries(COUNTER_SLOTS, 0);

struct MapInterface;

impl InterfaceProvider for MapInterface {
    #[inline(always)]
    fn interface(&self) -> Option<InterfaceConfig> {
        INTERFACE_CONFIG
            .get(0)
            .filter(|itf| itf.is_configured())
            .copied()
    }
}

struct MapEndpoints;

impl EndpointProvider for MapEndpoints {
    #[inline(always)]
    fn lookup(&self, key: &EndpointKey) -> Option<&ScaledEndpoint> {
        // SAFETY: entries are only replaced whole by the control plane.
        unsafe { ENDPOINTS.get(key) }
    }
}

#[xdp]
pub fn transit_scaled_endpoint(ctx: XdpContext) -> u32 {
    let frame = match frame_mut(&ctx) {
        Some(frame) => frame,
        None => return xdp_action::XDP_ABORTED,
    };

    let itf = SeenInterface::new(MapInterface);
    let decision = process(frame, &itf, &MapEndpoints);

    bump(&METRICS, PACKETS_TOTAL);
    bump(&METRICS, decision.counter());

    let local = itf.seen().map(|itf| ipv4_bits(itf.ip)).unwrap_or(0);

    match decision {
        Decision::Transmit(redirect) => {
            debug!(
                &ctx,
                "[Scaled_EP] {:i}: scaled endpoint to {:i} (remote {})",
                local,
                ipv4_bits(redirect.backend.octets()),
                redirect.index
            );
            xdp_action::XDP_TX
        }
        Decision::Drop(fault) => {
            debug!(&ctx, "[Scaled_EP] {:i}: DROP code {:x}", local, fault.code());
            xdp_action::XDP_DROP
        }
        Decision::Abort(fault) => {
            info!(&ctx, "[Scaled_EP] {:i}: ABORT code {:x}", local, fault.code());
            xdp_action::XDP_ABORTED
        }
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
