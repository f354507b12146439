//! Helpers shared by the XDP entry point.

use aya_ebpf::{maps::HashMap, programs::XdpContext};

/// The packet between `data` and `data_end` as a mutable byte slice.
///
/// Returns `None` if the kernel hands us an inverted range.
#[inline(always)]
pub fn frame_mut(ctx: &XdpContext) -> Option<&mut [u8]> {
    let start = ctx.data();
    let end = ctx.data_end();

    if end < start {
        return None;
    }

    // SAFETY: [data, data_end) is the packet owned by this invocation and
    // nothing else aliases it while the program runs.
    Some(unsafe { core::slice::from_raw_parts_mut(start as *mut u8, end - start) })
}

/// Adds one to a counter slot, creating it if userspace has not.
#[inline(always)]
pub fn bump(map: &HashMap<u32, u64>, index: u32) {
    match map.get_ptr_mut(&index) {
        // SAFETY: the pointer comes from a live map entry.
        Some(count) => unsafe { *count += 1 },
        None => {
            let _ = map.insert(&index, &1, 0);
        }
    }
}

/// IPv4 octets as the host-order integer aya-log renders with `{:i}`.
#[inline(always)]
pub fn ipv4_bits(octets: [u8; 4]) -> u32 {
    u32::from_be_bytes(octets)
}
