use glam::Vec2;

use crate::anticheat::RejectReason;

/// Everything the core reports to the presentation layer. Collaborators
/// drain these once per tick through [`crate::NetworkClient::poll_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    ConnectionFailed {
        reason: String,
    },
    Disconnected {
        reason: String,
    },
    PlayerLogin {
        id: u32,
        name: String,
        position: Vec2,
        local: bool,
    },
    PlayerLogout {
        id: u32,
    },
    PlayerMoved {
        id: u32,
        position: Vec2,
    },
    ChatMessage {
        sender_id: u32,
        sender: String,
        channel: u32,
        text: String,
    },
    ActionPerformed {
        entity_id: u32,
        target_id: u32,
        action: u16,
        data: u32,
    },
    ItemActionResult {
        action: u16,
        item_uid: u64,
        params: [u32; 3],
    },
    MovementRejected {
        id: u32,
        reason: RejectReason,
    },
    SuspiciousActivity {
        id: u32,
        violations: u32,
    },
    DeliveryLost {
        sequence: u32,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::ConnectionFailed { .. } => "connection-failed",
            Self::Disconnected { .. } => "disconnected",
            Self::PlayerLogin { .. } => "player-login",
            Self::PlayerLogout { .. } => "player-logout",
            Self::PlayerMoved { .. } => "player-moved",
            Self::ChatMessage { .. } => "chat-message",
            Self::ActionPerformed { .. } => "action-performed",
            Self::ItemActionResult { .. } => "item-action-result",
            Self::MovementRejected { .. } => "movement-rejected",
            Self::SuspiciousActivity { .. } => "suspicious-activity",
            Self::DeliveryLost { .. } => "delivery-lost",
        }
    }

    /// Lifecycle events change what the application may call next.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::ConnectionFailed { .. } | Self::Disconnected { .. }
        )
    }
}
