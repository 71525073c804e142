//! Wire types for the qbridge object mirroring protocol.
//!
//! This crate has no I/O and no protocol state. It defines:
//!
//! - [`frame`]: the `"<size> <json>\n"` framing, with an incremental [`FrameDecoder`]
//! - [`message`]: raw [`Message`]s, typed [`Inbound`] commands and [`Outbound`] commands
//! - [`types`]: [`TypeDescriptor`]s and [`ObjectRef`] values

pub mod frame;
pub mod message;
pub mod types;

pub use frame::{FrameDecoder, FrameError, encode};
pub use message::{DecodeError, Inbound, Message, Outbound};
pub use types::{ObjectRef, TypeDescriptor, split_param};
