use std::time::{Duration, Instant};

use glam::Vec2;

use crate::config::ClientConfig;
use crate::entity::{ConnectedEntity, WorldState};
use crate::error::NetError;
use crate::event::{ClientEvent, EventQueue, EventSink};
use crate::interpolation::Pose;
use crate::net::{
    Action, Chat, ChatStyle, ConnectionManager, ConnectionState, HandlerContext, ItemAction,
    Packet, PacketDispatcher, StatsSnapshot, TcpTransport, TransformFactory, Transport,
    Walk, encode_coordinate, encode_direction, wire_timestamp,
};

/// Whisper target: recipient id and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub id: u32,
    pub name: String,
}

/// The client-side network core. Owns the connection, the dispatcher and all
/// world-tracking state; everything except the background I/O runs on the
/// caller's thread through [`NetworkClient::tick`].
#[derive(Debug)]
pub struct NetworkClient {
    config: ClientConfig,
    connection: ConnectionManager,
    dispatcher: PacketDispatcher,
    world: WorldState,
    events: EventQueue,
    sink: EventSink,
    ticks: u64,
}

impl NetworkClient {
    pub fn new(config: ClientConfig, transport: Box<dyn Transport>) -> Self {
        let events = EventQueue::new();
        let sink = events.sink();
        Self {
            connection: ConnectionManager::new(&config, transport, sink.clone()),
            dispatcher: PacketDispatcher::new(),
            world: WorldState::new(&config),
            config,
            events,
            sink,
            ticks: 0,
        }
    }

    pub fn with_tcp(config: ClientConfig) -> Self {
        let transport = TcpTransport::new(
            config.connection.read_poll_interval,
            config.connection.write_timeout,
        );
        Self::new(config, Box::new(transport))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_transform(&mut self, factory: TransformFactory) {
        self.connection.set_transform(factory);
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Handlers registered here before `connect` survive it; `disconnect`
    /// clears the whole table.
    pub fn dispatcher_mut(&mut self) -> &mut PacketDispatcher {
        &mut self.dispatcher
    }

    pub fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<(), NetError> {
        self.dispatcher.install_builtins();
        self.connection.connect(host, port, timeout)
    }

    /// `connect` with the configured `connection.connect_timeout`.
    pub fn connect_default(&mut self, host: &str, port: u16) -> Result<(), NetError> {
        let timeout = self.config.connection.connect_timeout;
        self.connect(host, port, timeout)
    }

    pub fn login(&mut self, username: &str, password: &str, realm: &str) -> Result<(), NetError> {
        self.connection.login(username, password, realm)
    }

    /// Idempotent; returns `false` when already disconnected.
    pub fn disconnect(&mut self) -> bool {
        let disconnected = self.connection.disconnect();
        self.dispatcher.clear();
        self.world.clear();
        disconnected
    }

    pub fn reconnect(&mut self) -> Result<(), NetError> {
        self.world.clear();
        self.dispatcher.install_builtins();
        self.connection.reconnect()
    }

    fn require_in_game(&self, operation: &'static str) -> Result<u32, NetError> {
        let state = self.connection.state();
        match self.world.local_id() {
            Some(id) if state == ConnectionState::InGame => Ok(id),
            _ => Err(NetError::invalid_state(operation, state)),
        }
    }

    /// Sends a chat line reliably. Returns the reliable sequence.
    pub fn send_chat(
        &mut self,
        text: &str,
        channel: u32,
        target: Option<ChatTarget>,
    ) -> Result<u32, NetError> {
        let sender_id = self.require_in_game("send_chat")?;
        let sender_name = self
            .world
            .local_entity()
            .map(|e| e.name.clone())
            .unwrap_or_default();
        let (recipient_id, recipient_name) = target.map_or((0, String::new()), |t| (t.id, t.name));

        let chat = Packet::Chat(Chat {
            color: Chat::DEFAULT_COLOR,
            channel,
            style: ChatStyle::empty(),
            timestamp: wire_timestamp(),
            sender_id,
            recipient_id,
            sender_name,
            recipient_name,
            message: text.to_string(),
        });
        self.connection.send_reliable(&chat)
    }

    /// Records the local player's new position and reports it to the server
    /// unreliably; newer reports supersede lost ones.
    pub fn report_local_movement(
        &mut self,
        position: Vec2,
        velocity: Vec2,
        direction: f32,
    ) -> Result<(), NetError> {
        let entity_id = self.require_in_game("report_local_movement")?;
        let now = Instant::now();
        self.world.move_local(position, velocity, direction, now);

        let mode = if velocity.length() > self.config.tick.run_speed_threshold {
            Walk::MODE_RUN
        } else {
            Walk::MODE_WALK
        };
        let walk = Packet::Walk(Walk {
            timestamp: wire_timestamp(),
            entity_id,
            direction: encode_direction(direction),
            x: encode_coordinate(position.x),
            y: encode_coordinate(position.y),
            mode,
        });
        self.connection.send(&walk)
    }

    /// Attacks a known entity. `skill` travels in the action's data field.
    pub fn attack(&mut self, target: u32, skill: Option<u32>) -> Result<u32, NetError> {
        let entity_id = self.require_in_game("attack")?;
        if !self.world.entities.contains(target) {
            return Err(NetError::UnknownEntity { id: target });
        }
        let (position, direction) = self
            .world
            .local_entity()
            .map_or((Vec2::ZERO, 0.0), |e| (e.position, e.direction));

        let action = Packet::Action(Action {
            timestamp: wire_timestamp(),
            entity_id,
            target_id: target,
            x: encode_coordinate(position.x),
            y: encode_coordinate(position.y),
            direction: encode_direction(direction),
            action: Action::ATTACK,
            data: skill.unwrap_or(0),
        });
        self.connection.send_reliable(&action)
    }

    pub fn use_item(
        &mut self,
        item_uid: u64,
        action: u16,
        params: [u32; 3],
    ) -> Result<u32, NetError> {
        self.require_in_game("use_item")?;
        let item = Packet::ItemAction(ItemAction {
            timestamp: wire_timestamp(),
            action,
            item_uid,
            params,
        });
        self.connection.send_reliable(&item)
    }

    /// Runs one simulation step: pending reconnects, then up to
    /// `max_packets_per_tick` inbound packets, then housekeeping. Returns the
    /// number of packets handed to a handler.
    pub fn tick(&mut self) -> usize {
        let now = Instant::now();
        if self.connection.is_reconnect_pending() {
            self.dispatcher.install_builtins();
            self.connection.poll_reconnect(now);
        }

        let was_linked = self.connection.is_linked();
        let packets = self
            .connection
            .drain_inbound(self.config.tick.max_packets_per_tick);

        let mut handled = 0;
        for (index, packet) in packets.iter().enumerate() {
            if !self.connection.is_linked() {
                log::debug!("link closed, dropping {} packets", packets.len() - index);
                break;
            }
            let mut ctx = HandlerContext {
                connection: &mut self.connection,
                world: &mut self.world,
                events: &self.sink,
                now,
            };
            if self.dispatcher.dispatch(&mut ctx, packet) {
                handled += 1;
            }
        }

        if was_linked && !self.connection.is_linked() {
            self.world.clear();
        }

        self.world.interpolators.clean_old_states(now);
        self.ticks += 1;
        if let Some(every) = self.config.aoi.reconcile_every_ticks {
            if every > 0 && self.ticks % every == 0 {
                self.world.aoi.reconcile();
            }
        }
        handled
    }

    pub fn poll_events(&self) -> Vec<ClientEvent> {
        self.events.drain()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: self.connection.state(),
            network: self.connection.network_stats(),
            pending_reliable: self.connection.pending_reliable(),
            inbound_queued: self.connection.inbound_queued(),
            aoi_objects: self.world.aoi.object_count(),
            aoi_cells: self.world.aoi.cell_count(),
            tracked_entities: self.world.entities.len(),
            suspicious: self.world.anticheat.suspicious_counts(),
        }
    }

    pub fn local_entity(&self) -> Option<&ConnectedEntity> {
        self.world.local_entity()
    }

    pub fn entity(&self, id: u32) -> Option<&ConnectedEntity> {
        self.world.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &ConnectedEntity> {
        self.world.entities.iter()
    }

    /// Smoothed render pose of a remote entity at `now`.
    pub fn interpolated_state(&self, id: u32, now: Instant) -> Option<Pose> {
        self.world.interpolators.interpolated_state_at(id, now)
    }

    pub fn observers(&self, id: u32) -> Vec<u32> {
        self.world.aoi.observers(id)
    }
}
