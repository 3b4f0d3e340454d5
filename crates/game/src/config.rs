use std::time::Duration;

use glam::DVec2;

use crate::net::DEFAULT_DATAGRAM_TIMEOUT;
use crate::session::InterpolationConfig;

/// Seconds between outbound input batches.
pub const DEFAULT_INPUT_FLUSH_INTERVAL: f64 = 0.02;
/// Seconds between liveness pings.
pub const DEFAULT_PING_INTERVAL: f64 = 1.0;
/// Seconds between authoritative snapshot broadcasts.
pub const DEFAULT_BROADCAST_INTERVAL: f64 = 0.05;

/// Tuning knobs for a [`ClientSession`](crate::session::ClientSession).
/// Where to connect is a call argument, not configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub input_flush_interval: f64,
    pub ping_interval: f64,
    pub datagram_timeout: Duration,
    pub interpolation: InterpolationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            input_flush_interval: DEFAULT_INPUT_FLUSH_INTERVAL,
            ping_interval: DEFAULT_PING_INTERVAL,
            datagram_timeout: DEFAULT_DATAGRAM_TIMEOUT,
            interpolation: InterpolationConfig::default(),
        }
    }
}

/// Tuning knobs for a [`HostSession`](crate::session::HostSession).
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub broadcast_interval: f64,
    pub spawn_position: DVec2,
    pub interpolation: InterpolationConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            spawn_position: DVec2::ZERO,
            interpolation: InterpolationConfig::default(),
        }
    }
}
