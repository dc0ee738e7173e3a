use std::collections::HashMap;
use std::time::Instant;

use super::connection::{ConnectionManager, ConnectionState};
use super::handlers;
use super::protocol::{Packet, PacketId};
use crate::entity::WorldState;
use crate::event::EventSink;

/// What a handler may touch while it runs on the tick.
pub struct HandlerContext<'a> {
    pub connection: &'a mut ConnectionManager,
    pub world: &'a mut WorldState,
    pub events: &'a EventSink,
    pub now: Instant,
}

pub type PacketHandler = Box<dyn FnMut(&mut HandlerContext<'_>, &Packet) + Send>;

#[derive(Default)]
pub struct PacketDispatcher {
    handlers: HashMap<PacketId, PacketHandler>,
    dispatched: u64,
    dropped: u64,
}

impl std::fmt::Debug for PacketDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.handlers.keys().map(|id| id.name()).collect();
        ids.sort_unstable();
        f.debug_struct("PacketDispatcher")
            .field("handlers", &ids)
            .field("dispatched", &self.dispatched)
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `id`, replacing any existing one. Returns
    /// `true` if a handler was replaced.
    pub fn register<F>(&mut self, id: PacketId, handler: F) -> bool
    where
        F: FnMut(&mut HandlerContext<'_>, &Packet) + Send + 'static,
    {
        self.handlers.insert(id, Box::new(handler)).is_some()
    }

    pub fn unregister(&mut self, id: PacketId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn has_handler(&self, id: PacketId) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Installs the built-in handlers for ids that have none yet.
    pub fn install_builtins(&mut self) {
        let builtins: [(PacketId, fn(&mut HandlerContext<'_>, &Packet)); 9] = [
            (PacketId::ConnectAck, handlers::connect_ack),
            (PacketId::UserInfo, handlers::user_info),
            (PacketId::Walk, handlers::walk),
            (PacketId::Chat, handlers::chat),
            (PacketId::PlayerAppear, handlers::player_appear),
            (PacketId::PlayerDisappear, handlers::player_disappear),
            (PacketId::Action, handlers::action),
            (PacketId::ItemAction, handlers::item_action),
            (PacketId::Disconnect, handlers::disconnect),
        ];
        for (id, handler) in builtins {
            self.handlers
                .entry(id)
                .or_insert_with(|| Box::new(handler) as PacketHandler);
        }
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Returns `true` if a handler ran.
    pub fn dispatch(&mut self, ctx: &mut HandlerContext<'_>, packet: &Packet) -> bool {
        let id = packet.id();
        let state = ctx.connection.state();
        if id.is_game_state() && state != ConnectionState::InGame {
            log::debug!("dropping {} while {state}", id.name());
            self.dropped += 1;
            return false;
        }

        let Some(handler) = self.handlers.get_mut(&id) else {
            log::debug!("no handler for {}", id.name());
            self.dropped += 1;
            return false;
        };
        handler(ctx, packet);
        self.dispatched += 1;
        true
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
