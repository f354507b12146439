//! Decision counters.
//!
//! The XDP program keeps one `u64` per index below in its `METRICS` map.
//! Userspace reads them back into [`DecisionStats`].

/* ---------------------------------------------------------------- *
 * Counter indices
 * ---------------------------------------------------------------- */

pub const PACKETS_TOTAL: u32 = 0;
pub const TRANSMIT: u32 = 1;
pub const DROP_EXPIRED: u32 = 2;
pub const DROP_UNSUPPORTED: u32 = 3;
pub const DROP_NO_BACKENDS: u32 = 4;
pub const ABORT_MALFORMED: u32 = 5;
pub const ABORT_CONFIG_MISSING: u32 = 6;
pub const ABORT_INVARIANT: u32 = 7;

/// Number of counter slots.
pub const COUNTER_SLOTS: u32 = 8;

pub fn counter_name(index: u32) -> &'static str {
    match index {
        PACKETS_TOTAL => "packets_total",
        TRANSMIT => "transmit",
        DROP_EXPIRED => "drop_expired",
        DROP_UNSUPPORTED => "drop_unsupported_inner",
        DROP_NO_BACKENDS => "drop_no_backends",
        ABORT_MALFORMED => "abort_malformed",
        ABORT_CONFIG_MISSING => "abort_config_missing",
        ABORT_INVARIANT => "abort_invariant",
        _ => "unknown",
    }
}

/* ---------------------------------------------------------------- *
 * Userspace view
 * ---------------------------------------------------------------- */

#[cfg(any(test, feature = "user"))]
pub use self::stats::DecisionStats;

#[cfg(any(test, feature = "user"))]
mod stats {
    use std::fmt;

    use super::*;
    use crate::dispatch::Decision;

    /// Snapshot of the decision counters.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "user", derive(serde::Serialize))]
    pub struct DecisionStats {
        pub packets_total: u64,
        pub transmit: u64,
        pub drop_expired: u64,
        pub drop_unsupported_inner: u64,
        pub drop_no_backends: u64,
        pub abort_malformed: u64,
        pub abort_config_missing: u64,
        pub abort_invariant: u64,
    }

    impl DecisionStats {
        pub fn new() -> Self {
            Self::default()
        }

        /// Builds a snapshot from `(index, value)` pairs; unknown indices are
        /// ignored.
        pub fn from_counters<I>(counters: I) -> Self
        where
            I: IntoIterator<Item = (u32, u64)>,
        {
            let mut stats = Self::default();
            for (index, value) in counters {
                if let Some(slot) = stats.slot_mut(index) {
                    *slot = value;
                }
            }
            stats
        }

        /// Counts one decision the way the XDP program does.
        pub fn record(&mut self, decision: &Decision) {
            self.packets_total += 1;
            if let Some(slot) = self.slot_mut(decision.counter()) {
                *slot += 1;
            }
        }

        pub fn drops(&self) -> u64 {
            self.drop_expired + self.drop_unsupported_inner + self.drop_no_backends
        }

        pub fn aborts(&self) -> u64 {
            self.abort_malformed + self.abort_config_missing + self.abort_invariant
        }

        /// `(name, value)` in index order.
        pub fn entries(&self) -> [(&'static str, u64); COUNTER_SLOTS as usize] {
            let mut out = [("", 0); COUNTER_SLOTS as usize];
            for (index, entry) in out.iter_mut().enumerate() {
                let index = index as u32;
                *entry = (counter_name(index), self.slot(index).unwrap_or(0));
            }
            out
        }

        fn slot(&self, index: u32) -> Option<u64> {
            let v = match index {
                PACKETS_TOTAL => self.packets_total,
                TRANSMIT => self.transmit,
                DROP_EXPIRED => self.drop_expired,
                DROP_UNSUPPORTED => self.drop_unsupported_inner,
                DROP_NO_BACKENDS => self.drop_no_backends,
                ABORT_MALFORMED => self.abort_malformed,
                ABORT_CONFIG_MISSING => self.abort_config_missing,
                ABORT_INVARIANT => self.abort_invariant,
                _ => return None,
            };
            Some(v)
        }

        fn slot_mut(&mut self, index: u32) -> Option<&mut u64> {
            let slot = match index {
                PACKETS_TOTAL => &mut self.packets_total,
                TRANSMIT => &mut self.transmit,
                DROP_EXPIRED => &mut self.drop_expired,
                DROP_UNSUPPORTED => &mut self.drop_unsupported_inner,
                DROP_NO_BACKENDS => &mut self.drop_no_backends,
                ABORT_MALFORMED => &mut self.abort_malformed,
                ABORT_CONFIG_MISSING => &mut self.abort_config_missing,
                ABORT_INVARIANT => &mut self.abort_invariant,
                _ => return None,
            };
            Some(slot)
        }
    }

    impl fmt::Display for DecisionStats {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (name, value) in self.entries() {
                writeln!(f, "{:<24} {}", name, value)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Decision, Redirect};
    use crate::error::{Fault, Stage};
    use core::net::Ipv4Addr;

    #[test]
    fn record_counts_total_and_kind() {
        let mut stats = DecisionStats::new();
        stats.record(&Decision::Drop(Fault::ExpiredPacket));
        stats.record(&Decision::Abort(Fault::MalformedPacket(Stage::Geneve)));
        stats.record(&Decision::Transmit(Redirect {
            backend: Ipv4Addr::new(10, 0, 1, 1),
            index: 0,
            hash: 0,
            ifindex: 3,
        }));

        assert_eq!(stats.packets_total, 3);
        assert_eq!(stats.transmit, 1);
        assert_eq!(stats.drops(), 1);
        assert_eq!(stats.aborts(), 1);
    }

    #[test]
    fn from_counters_ignores_unknown_slots() {
        let stats = DecisionStats::from_counters([(TRANSMIT, 5), (ABORT_INVARIANT, 1), (99, 7)]);
        assert_eq!(stats.transmit, 5);
        assert_eq!(stats.abort_invariant, 1);
        assert_eq!(stats.entries()[TRANSMIT as usize], ("transmit", 5));
    }
}
