pub mod apply;
pub mod endpoint;
pub mod iface;
pub mod offline;
pub mod xdp;
