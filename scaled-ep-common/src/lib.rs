//! Packet-path logic and shared types for the scaled-endpoint transit stage.
//!
//! This crate is used by both the kernel-side XDP program and the userspace
//! manager. Without the `user` feature it is `no_std` and contains only what
//! the packet path needs: the bounds-checked cursor, the parser chain, the
//! endpoint resolver, the backend selector, the rewriter and the dispatcher.

#![cfg_attr(not(any(test, feature = "user")), no_std)]

pub mod checksum;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod hash;
pub mod headers;
pub mod metrics;
pub mod parser;
pub mod provider;
pub mod resolve;
pub mod rewrite;
pub mod types;

#[cfg(feature = "user")]
pub mod config;

#[cfg(any(test, feature = "user"))]
pub mod frame;

pub use dispatch::{process, Decision, Redirect};
pub use error::{ConfigSource, Fault, Stage, Unsupported};
pub use provider::{EndpointProvider, InterfaceProvider};
pub use types::{EndpointKey, InterfaceConfig, ScaledEndpoint, TunnelId, MAX_REMOTES};

#[cfg(feature = "user")]
pub use error::Error;

#[cfg(feature = "user")]
pub type Result<T> = std::result::Result<T, Error>;
