//! Error types for the scaled-endpoint stage.
//!
//! [`Fault`] is what the packet path produces: every variant is terminal for
//! the current packet and maps to either a drop or an abort. [`Error`] is the
//! userspace error used by configuration and map management.

use core::fmt;

use crate::metrics;

/// Parser stage whose bounds check rejected a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage {
    OuterEth = 1,
    OuterIpv4 = 2,
    OuterUdp = 3,
    Geneve = 4,
    GeneveOptions = 5,
    InnerEth = 6,
    /// Covers the inner IPv4 header and the L4 header it announces.
    InnerIpv4 = 7,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::OuterEth => "outer-eth",
            Stage::OuterIpv4 => "outer-ipv4",
            Stage::OuterUdp => "outer-udp",
            Stage::Geneve => "geneve",
            Stage::GeneveOptions => "geneve-options",
            Stage::InnerEth => "inner-eth",
            Stage::InnerIpv4 => "inner-ipv4",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-mostly configuration source that had no entry for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSource {
    Interface,
    Endpoint,
}

/// Inner traffic this stage does not handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unsupported {
    /// Inner Ethernet payload is not IPv4.
    EtherType(u16),
    /// Inner IPv4 protocol is not UDP, TCP or ICMP.
    Protocol(u8),
}

/// What the surrounding program does with a packet that was not transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Valid network condition; the packet is silently discarded.
    Drop,
    /// Defect or misconfiguration; the packet is discarded and flagged.
    Abort,
}

/// Terminal failure of one packet's processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Interface or endpoint lookup came back empty.
    ConfigMissing(ConfigSource),
    /// A header would extend past the end of the frame.
    MalformedPacket(Stage),
    /// Outer IPv4 time-to-live is zero.
    ExpiredPacket,
    UnsupportedInner(Unsupported),
    /// The resolved endpoint has no replicas attached.
    NoBackends,
    /// The selected replica index is outside the replica array.
    InvariantViolation { index: u32, max: u32 },
}

impl Fault {
    pub fn action(&self) -> Action {
        match self {
            Fault::ExpiredPacket | Fault::UnsupportedInner(_) | Fault::NoBackends => Action::Drop,
            Fault::ConfigMissing(_) | Fault::MalformedPacket(_) | Fault::InvariantViolation { .. } => {
                Action::Abort
            }
        }
    }

    pub fn is_drop(&self) -> bool {
        self.action() == Action::Drop
    }

    /// Index of the `METRICS` slot this fault bumps.
    pub fn counter(&self) -> u32 {
        match self {
            Fault::ExpiredPacket => metrics::DROP_EXPIRED,
            Fault::UnsupportedInner(_) => metrics::DROP_UNSUPPORTED,
            Fault::NoBackends => metrics::DROP_NO_BACKENDS,
            Fault::MalformedPacket(_) => metrics::ABORT_MALFORMED,
            Fault::ConfigMissing(_) => metrics::ABORT_CONFIG_MISSING,
            Fault::InvariantViolation { .. } => metrics::ABORT_INVARIANT,
        }
    }

    /// Numeric code for kernel-side log records, which cannot format enums.
    pub fn code(&self) -> u32 {
        match self {
            Fault::ConfigMissing(ConfigSource::Interface) => 1,
            Fault::ConfigMissing(ConfigSource::Endpoint) => 2,
            Fault::MalformedPacket(stage) => 0x10 | *stage as u32,
            Fault::ExpiredPacket => 0x20,
            Fault::UnsupportedInner(Unsupported::EtherType(_)) => 0x30,
            Fault::UnsupportedInner(Unsupported::Protocol(_)) => 0x31,
            Fault::NoBackends => 0x40,
            Fault::InvariantViolation { .. } => 0x50,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::ConfigMissing(ConfigSource::Interface) => {
                write!(f, "no interface configuration")
            }
            Fault::ConfigMissing(ConfigSource::Endpoint) => {
                write!(f, "no scaled endpoint configuration for destination")
            }
            Fault::MalformedPacket(stage) => write!(f, "truncated packet at {} stage", stage),
            Fault::ExpiredPacket => write!(f, "outer ttl expired"),
            Fault::UnsupportedInner(Unsupported::EtherType(proto)) => {
                write!(f, "unsupported inner ethertype {:#06x}", proto)
            }
            Fault::UnsupportedInner(Unsupported::Protocol(proto)) => {
                write!(f, "unsupported inner protocol {}", proto)
            }
            Fault::NoBackends => write!(f, "no backend attached to scaled endpoint"),
            Fault::InvariantViolation { index, max } => write!(
                f,
                "selected remote index {} is beyond the {} supported remotes",
                index, max
            ),
        }
    }
}

#[cfg(feature = "user")]
impl std::error::Error for Fault {}

/// All possible errors on the userspace side.
#[cfg(feature = "user")]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration file could not be read or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Backend list larger than the replica array.
    #[error("scaled endpoint has {requested} backends, at most {max} are supported")]
    TooManyBackends { requested: usize, max: usize },

    /// VNI wider than the 24-bit Geneve field.
    #[error("VNI {0:#x} does not fit in 24 bits")]
    InvalidVni(u32),

    /// Error related to eBPF/XDP operations.
    #[error("eBPF/XDP error: {0}")]
    Ebpf(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_and_abort_split() {
        assert_eq!(Fault::ExpiredPacket.action(), Action::Drop);
        assert_eq!(Fault::NoBackends.action(), Action::Drop);
        assert_eq!(
            Fault::UnsupportedInner(Unsupported::Protocol(47)).action(),
            Action::Drop
        );
        assert_eq!(
            Fault::ConfigMissing(ConfigSource::Endpoint).action(),
            Action::Abort
        );
        assert_eq!(Fault::MalformedPacket(Stage::Geneve).action(), Action::Abort);
        assert_eq!(
            Fault::InvariantViolation { index: 200, max: 128 }.action(),
            Action::Abort
        );
    }

    #[test]
    fn malformed_codes_carry_stage() {
        assert_eq!(Fault::MalformedPacket(Stage::OuterEth).code(), 0x11);
        assert_eq!(Fault::MalformedPacket(Stage::InnerIpv4).code(), 0x17);
    }

    #[test]
    fn display_names_stage() {
        let msg = Fault::MalformedPacket(Stage::InnerIpv4).to_string();
        assert_eq!(msg, "truncated packet at inner-ipv4 stage");
    }
}
