//! Wire types for the pi exec protocol.
//!
//! This crate contains the serde-serializable payloads exchanged with the
//! remote control plane and the codec for the multiplexed stdout/stderr
//! stream carried by non-TTY exec sessions.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization and framing
//! * 1:1 with the wire: Field names match the JSON the service emits
//! * Stable: Changes only when the wire protocol changes
//!
//! Session orchestration is built on top of these types in `pi-rs`.

pub mod paths;
pub mod stdcopy;
pub mod types;

pub use stdcopy::*;
pub use types::*;
