pub mod anticheat;
pub mod aoi;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod interpolation;
pub mod net;

pub use anticheat::{AntiCheatRecord, AntiCheatValidator, MovementVerdict, RejectReason};
pub use aoi::{AoiManager, AoiObject, ObjectKind};
pub use client::{ChatTarget, NetworkClient};
pub use config::{
    AntiCheatConfig, AoiConfig, ClientConfig, ConnectionConfig, InterpolationConfig,
    ReconnectConfig, ReliableConfig, TickConfig,
};
pub use entity::{ConnectedEntity, EntityTable, WorldState};
pub use error::{DecodeError, NetError};
pub use event::{ClientEvent, EventQueue, EventSink};
pub use interpolation::{InterpolatorSet, NetworkInterpolator, Pose};
pub use net::{
    ConnectionManager, ConnectionState, DEFAULT_PORT, MemoryTransport, NetworkStats, Packet,
    PacketDispatcher, PacketId, StatsSnapshot, TcpTransport, Transport,
};
