//! Wire protocol: frames and the messages carried in them

mod frame;
mod messages;

pub use frame::{
    Frame, FrameKind, HEADER_SIZE, MAX_PAYLOAD_SIZE, WireError, read_frame, write_frame,
};
pub use messages::{ChannelHello, DirectoryRequest, DirectoryResponse, PROTOCOL_VERSION};
