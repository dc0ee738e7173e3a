use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Every frame starts with `{ length: u16, packet_type: u16 }`, little-endian.
pub const HEADER_SIZE: usize = 4;
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;
pub const PROTOCOL_VERSION: u32 = 1;
pub const CLIENT_VERSION: u32 = 0x0001_0300;
pub const DEFAULT_PORT: u16 = 7101;

pub const NAME_LEN: usize = 16;
pub const USERNAME_LEN: usize = 32;
pub const PASSWORD_LEN: usize = 32;
pub const REALM_LEN: usize = 16;
pub const MESSAGE_LEN: usize = 256;
pub const CONNECT_RESERVED_LEN: usize = 12;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Milliseconds since the Unix epoch, truncated to the 32-bit wire width.
pub fn wire_timestamp() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

fn normalize_angle(angle: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let normalized = angle % two_pi;
    if normalized < 0.0 {
        normalized + two_pi
    } else {
        normalized
    }
}

/// Heading in radians to the 16-bit wire direction (full turn = 65536).
pub fn encode_direction(radians: f32) -> u16 {
    let turns = normalize_angle(radians) / std::f32::consts::TAU;
    ((turns * 65536.0).round() as u32 & 0xFFFF) as u16
}

pub fn decode_direction(direction: u16) -> f32 {
    direction as f32 / 65536.0 * std::f32::consts::TAU
}

/// World coordinates travel as unsigned 16-bit tile positions.
pub fn encode_coordinate(value: f32) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, u16::MAX as f32) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PacketId {
    Connect = 0x0001,
    ConnectAck = 0x0002,
    Account = 0x0003,
    UserInfo = 0x0004,
    Walk = 0x0005,
    ItemAction = 0x0006,
    Chat = 0x0007,
    Action = 0x0008,
    PlayerAppear = 0x0009,
    PlayerDisappear = 0x000A,
    Heartbeat = 0x000B,
    HeartbeatAck = 0x000C,
    Reliable = 0x000D,
    Ack = 0x000E,
    Disconnect = 0x000F,
}

impl PacketId {
    pub const ALL: [PacketId; 15] = [
        PacketId::Connect,
        PacketId::ConnectAck,
        PacketId::Account,
        PacketId::UserInfo,
        PacketId::Walk,
        PacketId::ItemAction,
        PacketId::Chat,
        PacketId::Action,
        PacketId::PlayerAppear,
        PacketId::PlayerDisappear,
        PacketId::Heartbeat,
        PacketId::HeartbeatAck,
        PacketId::Reliable,
        PacketId::Ack,
        PacketId::Disconnect,
    ];

    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Packets that only carry meaning once the session is in game.
    pub fn is_game_state(self) -> bool {
        matches!(
            self,
            PacketId::Walk
                | PacketId::ItemAction
                | PacketId::Chat
                | PacketId::Action
                | PacketId::PlayerAppear
                | PacketId::PlayerDisappear
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketId::Connect => "connect",
            PacketId::ConnectAck => "connect-ack",
            PacketId::Account => "account",
            PacketId::UserInfo => "user-info",
            PacketId::Walk => "walk",
            PacketId::ItemAction => "item-action",
            PacketId::Chat => "chat",
            PacketId::Action => "action",
            PacketId::PlayerAppear => "player-appear",
            PacketId::PlayerDisappear => "player-disappear",
            PacketId::Heartbeat => "heartbeat",
            PacketId::HeartbeatAck => "heartbeat-ack",
            PacketId::Reliable => "reliable",
            PacketId::Ack => "ack",
            PacketId::Disconnect => "disconnect",
        }
    }
}

impl TryFrom<u16> for PacketId {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        PacketId::ALL
            .into_iter()
            .find(|id| id.as_u16() == value)
            .ok_or(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub length: u16,
    pub packet_type: u16,
}

impl PacketHeader {
    pub fn new(packet_type: u16, payload_len: usize) -> Self {
        Self {
            length: (HEADER_SIZE + payload_len) as u16,
            packet_type,
        }
    }

    /// Reads the header from the front of `bytes` without validating the rest.
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u16::from_le_bytes([bytes[0], bytes[1]]),
            packet_type: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChatStyle: u8 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const SHOUT = 1 << 2;
        const SYSTEM = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    Graceful,
    AuthenticationFailed,
    Kicked,
    ServerShutdown,
    Timeout,
    Other(u8),
}

impl DisconnectReason {
    pub fn as_u8(self) -> u8 {
        match self {
            DisconnectReason::Graceful => 0,
            DisconnectReason::AuthenticationFailed => 1,
            DisconnectReason::Kicked => 2,
            DisconnectReason::ServerShutdown => 3,
            DisconnectReason::Timeout => 4,
            DisconnectReason::Other(code) => code,
        }
    }

    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => DisconnectReason::Graceful,
            1 => DisconnectReason::AuthenticationFailed,
            2 => DisconnectReason::Kicked,
            3 => DisconnectReason::ServerShutdown,
            4 => DisconnectReason::Timeout,
            other => DisconnectReason::Other(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::AuthenticationFailed => "authentication failed",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::ServerShutdown => "server shutdown",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Other(_) => "unknown reason",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub timestamp: u32,
    pub client_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAck {
    pub result: u8,
    pub server_time: u32,
    pub reason: String,
}

impl ConnectAck {
    pub const RESULT_OK: u8 = 0;

    pub fn is_accepted(&self) -> bool {
        self.result == Self::RESULT_OK
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub realm: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("realm", &self.realm)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub entity_id: u32,
    pub body: u16,
    pub hair: u16,
    pub level: u16,
    pub hp: u32,
    pub max_hp: u32,
    pub mp: u32,
    pub max_mp: u32,
    pub x: u16,
    pub y: u16,
    pub direction: u16,
    pub map_id: u16,
    pub name: String,
}

impl UserInfo {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk {
    pub timestamp: u32,
    pub entity_id: u32,
    pub direction: u16,
    pub x: u16,
    pub y: u16,
    pub mode: u8,
}

impl Walk {
    pub const MODE_WALK: u8 = 0;
    pub const MODE_RUN: u8 = 1;

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }

    pub fn heading(&self) -> f32 {
        decode_direction(self.direction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAction {
    pub timestamp: u32,
    pub action: u16,
    pub item_uid: u64,
    pub params: [u32; 3],
}

impl ItemAction {
    pub const ACTION_USE: u16 = 1;
    pub const ACTION_EQUIP: u16 = 2;
    pub const ACTION_DROP: u16 = 3;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub color: u32,
    pub channel: u32,
    pub style: ChatStyle,
    pub timestamp: u32,
    pub sender_id: u32,
    pub recipient_id: u32,
    pub sender_name: String,
    pub recipient_name: String,
    pub message: String,
}

impl Chat {
    pub const CHANNEL_LOCAL: u32 = 0;
    pub const CHANNEL_WHISPER: u32 = 1;
    pub const CHANNEL_PARTY: u32 = 2;
    pub const CHANNEL_GUILD: u32 = 3;
    pub const CHANNEL_WORLD: u32 = 4;

    pub const DEFAULT_COLOR: u32 = 0xFFFF_FFFF;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub timestamp: u32,
    pub entity_id: u32,
    pub target_id: u32,
    pub x: u16,
    pub y: u16,
    pub direction: u16,
    pub action: u16,
    pub data: u32,
}

impl Action {
    pub const ATTACK: u16 = 1;
    pub const EMOTE: u16 = 2;
    pub const SIT: u16 = 3;
    pub const PICKUP: u16 = 4;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAppear {
    pub entity_id: u32,
    pub x: u16,
    pub y: u16,
    pub direction: u16,
    pub name: String,
}

impl PlayerAppear {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnectAck(ConnectAck),
    Account(Account),
    UserInfo(UserInfo),
    Walk(Walk),
    ItemAction(ItemAction),
    Chat(Chat),
    Action(Action),
    PlayerAppear(PlayerAppear),
    PlayerDisappear { entity_id: u32 },
    Heartbeat { timestamp: u32 },
    HeartbeatAck { timestamp: u32 },
    /// Carries a complete inner frame that must be acknowledged.
    Reliable { sequence: u32, frame: Vec<u8> },
    Ack { sequence: u32 },
    Disconnect { reason: DisconnectReason },
}

impl Packet {
    pub fn id(&self) -> PacketId {
        match self {
            Packet::Connect(_) => PacketId::Connect,
            Packet::ConnectAck(_) => PacketId::ConnectAck,
            Packet::Account(_) => PacketId::Account,
            Packet::UserInfo(_) => PacketId::UserInfo,
            Packet::Walk(_) => PacketId::Walk,
            Packet::ItemAction(_) => PacketId::ItemAction,
            Packet::Chat(_) => PacketId::Chat,
            Packet::Action(_) => PacketId::Action,
            Packet::PlayerAppear(_) => PacketId::PlayerAppear,
            Packet::PlayerDisappear { .. } => PacketId::PlayerDisappear,
            Packet::Heartbeat { .. } => PacketId::Heartbeat,
            Packet::HeartbeatAck { .. } => PacketId::HeartbeatAck,
            Packet::Reliable { .. } => PacketId::Reliable,
            Packet::Ack { .. } => PacketId::Ack,
            Packet::Disconnect { .. } => PacketId::Disconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn test_packet_id_lookup() {
        for id in PacketId::ALL {
            assert_eq!(PacketId::try_from(id.as_u16()), Ok(id));
        }
        assert_eq!(PacketId::try_from(0x7777), Err(0x7777));
    }

    #[test]
    fn test_direction_encoding() {
        assert_eq!(encode_direction(0.0), 0);
        assert_eq!(encode_direction(std::f32::consts::PI), 32768);
        assert_eq!(encode_direction(-std::f32::consts::FRAC_PI_2), 49152);

        let heading = decode_direction(16384);
        assert!((heading - std::f32::consts::FRAC_PI_2).abs() < 0.0001);
    }

    #[test]
    fn test_coordinate_clamping() {
        assert_eq!(encode_coordinate(-5.0), 0);
        assert_eq!(encode_coordinate(12.6), 13);
        assert_eq!(encode_coordinate(1.0e9), u16::MAX);
        assert_eq!(encode_coordinate(f32::NAN), 0);
    }

    #[test]
    fn test_header_counts_itself_in_length() {
        let header = PacketHeader::new(PacketId::Heartbeat.as_u16(), 4);
        assert_eq!(header.length as usize, HEADER_SIZE + 4);
        assert_eq!(header.payload_len(), 4);

        let bytes = Packet::Heartbeat { timestamp: 9 }.encode();
        assert_eq!(PacketHeader::peek(&bytes), Some(header));
    }

    #[test]
    fn test_disconnect_reason_codes() {
        for code in 0..=6u8 {
            assert_eq!(DisconnectReason::from_u8(code).as_u8(), code);
        }
        assert_eq!(
            DisconnectReason::from_u8(1),
            DisconnectReason::AuthenticationFailed
        );
    }
}
