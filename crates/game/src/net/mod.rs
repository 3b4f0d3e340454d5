mod addr;
mod datagram;
mod framing;
mod multiplexer;
mod protocol;
mod transport;

pub use addr::NetAddress;
pub use datagram::{DEFAULT_DATAGRAM_TIMEOUT, DatagramTransport};
pub use framing::{FrameError, FrameReader, LEN_PREFIX_SIZE, MAX_FRAME_LEN, write_frame};
pub use multiplexer::{Multiplexer, NetEvent, TransportId};
pub use protocol::{
    DEFAULT_PORT, EntityId, EntitySnapshot, Input, Message, PlayerInit, ProtocolError,
    WorldSnapshot, decode_message, encode_message,
};
pub use transport::{
    Interest, ListenerTransport, PollRead, StreamTransport, TransportError, TransportState,
};
