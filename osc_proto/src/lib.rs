//! Protocol model and codec for Open Sound Control (OSC) 1.0.
//!
//! This crate defines the packet model ([`Message`], [`Bundle`], [`Packet`],
//! [`Value`], [`TimeTag`]), a bit-exact binary codec for the OSC 1.0 wire
//! format ([`codec`]), and the OSC address-pattern matcher ([`pattern`]).
//!
//! ## Scope
//!
//! - Pure, synchronous, CPU-bound transforms over in-memory buffers.
//! - No I/O, no threads, no clocks beyond [`TimeTag::now`].
//!
//! Runtime machinery (dispatch, scheduling, UDP transport) lives in the
//! `osc_network` crate, which consumes the model defined here.

pub mod codec;
pub mod packet;
pub mod pattern;
mod timetag;

pub use packet::{AddressError, Bundle, Message, Packet, Value};
pub use timetag::TimeTag;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
pub(crate) const SECONDS_FROM_1900_TO_1970: u64 = 2_208_988_800;
