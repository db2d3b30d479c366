//! PeerLink message model and wire codec.
//! No I/O: the host (peerlink-net) owns sockets, tasks and locking.

pub mod protocol;
pub mod queue;
pub mod wire;

pub use protocol::{Data, Event, Message, UnknownEvent};
pub use queue::MessageQueue;
pub use wire::{
    decode, decode_frame, encode, encode_frame, DecodeError, EncodeError, FrameDecodeError,
};
