pub mod config;
pub mod net;
pub mod session;
pub mod sim;

pub use config::{
    ClientConfig, DEFAULT_BROADCAST_INTERVAL, DEFAULT_INPUT_FLUSH_INTERVAL, DEFAULT_PING_INTERVAL,
    HostConfig,
};
pub use net::{
    DEFAULT_DATAGRAM_TIMEOUT, DEFAULT_PORT, EntityId, EntitySnapshot, Input, Message, Multiplexer,
    NetAddress, NetEvent, PlayerInit, TransportError, TransportId, WorldSnapshot,
};
pub use session::{
    ClientSession, DirectionalInput, HostSession, InterpolationBuffer, InterpolationConfig,
    MessageHandler, route,
};
pub use sim::{Entity, MOVE_SPEED, Pose, TURN_RATE, World};
