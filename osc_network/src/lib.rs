//! Runtime machinery for the OSC model defined in the `osc_proto` crate.
//!
//! This crate provides message dispatch and bundle scheduling on top of the
//! `osc_proto` packet model, along with thin UDP transport wrappers for
//! sending and receiving packets.
//!
//! ## Scope
//!
//! - Routing decoded packets to registered listeners ([`dispatch`]).
//! - Deferring bundle dispatch according to embedded time tags.
//! - Transport over network sockets (currently, UDP only).
//!
//! This crate is intentionally runtime-focused: it does not redefine the
//! protocol itself, but instead implements the dispatch contract and a
//! concrete communication layer for the packet model in `osc_proto`.

pub mod client;
pub mod dispatch;
pub mod server;
pub use osc_proto;

/// Largest datagram a UDP peer can deliver; the receive buffer size.
pub(crate) const MAX_DATAGRAM_SIZE: usize = 65535;

/// Returns `true` if the given I/O error kind represents a timeout condition.
///
/// This treats both `WouldBlock` and `TimedOut` as timeout-equivalent, which
/// is useful when working with non-blocking or socket-based transports.
#[inline(always)]
pub(crate) fn io_err_is_timeout(e: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    [WouldBlock, TimedOut].contains(&e)
}
