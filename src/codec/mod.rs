//! Message codec: framing, outbound commands and inbound decoding.
//!
//! Everything here is a pure transform over byte buffers.

mod command;
mod frame;
mod message;

pub use command::Command;
pub use frame::{Frame, HEADER_SIZE, MIN_FRAME_SIZE, checksum};
pub use message::{
    AntMessage, Broadcast, BurstFragment, ChannelEvent, ChannelIdent, ManufacturerInfo,
    ProductInfo, Telemetry,
};
