use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::CLIENT_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub client_version: u32,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Upper bound on how long the I/O thread blocks in a single read.
    pub read_poll_interval: Duration,
    /// A write stalled this long closes the link.
    pub write_timeout: Duration,
    pub inbound_queue_capacity: usize,
    /// Frames waiting for the writer thread; sends fail once it is full.
    pub outbound_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_version: CLIENT_VERSION,
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            read_poll_interval: Duration::from_millis(50),
            write_timeout: Duration::from_secs(5),
            inbound_queue_capacity: 1024,
            outbound_queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliableConfig {
    pub retry_interval: Duration,
    pub max_retries: u32,
    /// Period of the retry timer.
    pub tick_interval: Duration,
    pub dedup_window: usize,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(500),
            max_retries: 5,
            tick_interval: Duration::from_millis(50),
            dedup_window: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoiConfig {
    pub cell_size: f32,
    pub local_view_distance: f32,
    pub remote_view_distance: f32,
    /// Full observer reconciliation every N ticks; `None` keeps observation
    /// purely move-triggered.
    pub reconcile_every_ticks: Option<u64>,
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            cell_size: 32.0,
            local_view_distance: 24.0,
            remote_view_distance: 24.0,
            reconcile_every_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCheatConfig {
    /// World units per second.
    pub max_speed: f32,
    pub tolerance: f32,
    pub suspicious_threshold: u32,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            max_speed: 8.0,
            tolerance: 0.2,
            suspicious_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationConfig {
    pub buffer_time: Duration,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            buffer_time: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub reliable: ReliableConfig,
    pub reconnect: ReconnectConfig,
    pub aoi: AoiConfig,
    pub anticheat: AntiCheatConfig,
    pub interpolation: InterpolationConfig,
    pub tick: TickConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    pub max_packets_per_tick: usize,
    /// Speeds above this are reported to the server as running.
    pub run_speed_threshold: f32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            max_packets_per_tick: 256,
            run_speed_threshold: 4.0,
        }
    }
}
