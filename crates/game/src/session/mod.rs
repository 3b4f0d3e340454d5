mod client;
mod host;
mod interpolation;
mod router;

pub use client::{ClientSession, DirectionalInput};
pub use host::HostSession;
pub use interpolation::{
    DEFAULT_MISSED_SNAPSHOT_LIMIT, DEFAULT_RENDER_DELAY, DEFAULT_RETENTION, InterpolationBuffer,
    InterpolationConfig,
};
pub use router::{MessageHandler, route};
