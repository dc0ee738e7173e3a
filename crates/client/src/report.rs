use std::collections::VecDeque;
use std::time::Instant;

use tessera::{ClientEvent, StatsSnapshot};

const SAMPLE_COUNT: usize = 60;

/// Measured tick rate over the last [`SAMPLE_COUNT`] ticks.
pub struct TickStats {
    tick_times: VecDeque<Instant>,
    tick_rate: f32,
}

impl TickStats {
    pub fn new() -> Self {
        Self {
            tick_times: VecDeque::with_capacity(SAMPLE_COUNT),
            tick_rate: 0.0,
        }
    }

    pub fn record_tick(&mut self) {
        let now = Instant::now();

        if self.tick_times.len() >= SAMPLE_COUNT {
            self.tick_times.pop_front();
        }
        self.tick_times.push_back(now);

        if let Some(oldest) = self.tick_times.front() {
            let elapsed = now.duration_since(*oldest).as_secs_f32();
            if elapsed > 0.0 {
                self.tick_rate = (self.tick_times.len() - 1) as f32 / elapsed;
            }
        }
    }

    pub fn tick_rate(&self) -> f32 {
        self.tick_rate
    }
}

pub fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::Connected => log::info!("connected"),
        ClientEvent::ConnectionFailed { reason } => log::error!("connection failed: {reason}"),
        ClientEvent::Disconnected { reason } => log::info!("disconnected: {reason}"),
        ClientEvent::PlayerLogin {
            id,
            name,
            position,
            local,
        } => {
            let who = if *local { "you" } else { "player" };
            log::info!("{who} {name} ({id}) at {position}");
        }
        ClientEvent::PlayerLogout { id } => log::info!("player {id} left"),
        ClientEvent::PlayerMoved { id, position } => log::debug!("{id} moved to {position}"),
        ClientEvent::ChatMessage {
            sender,
            channel,
            text,
            ..
        } => log::info!("[{channel}] {sender}: {text}"),
        ClientEvent::ActionPerformed {
            entity_id,
            target_id,
            action,
            data,
        } => log::info!("{entity_id} -> {target_id}: action {action} ({data})"),
        ClientEvent::ItemActionResult {
            action, item_uid, ..
        } => log::info!("item {item_uid:#x}: action {action}"),
        ClientEvent::MovementRejected { id, reason } => {
            log::warn!("movement of {id} rejected: {reason}")
        }
        ClientEvent::SuspiciousActivity { id, violations } => {
            log::warn!("{id} flagged after {violations} violations")
        }
        ClientEvent::DeliveryLost { sequence } => log::warn!("reliable packet {sequence} lost"),
    }
}

pub fn log_stats(stats: &StatsSnapshot, ticks: Option<&TickStats>) {
    let net = &stats.network;
    log::info!(
        "{} | sent {} ({} B) recv {} ({} B) | lost {} ({:.1}%) retx {} dup {} bad {} | rtt {:.0} ms",
        stats.state,
        net.packets_sent,
        net.bytes_sent,
        net.packets_received,
        net.bytes_received,
        net.packets_lost,
        net.packet_loss_percent(),
        net.retransmissions,
        net.duplicates,
        net.decode_errors,
        net.rtt_ms,
    );
    log::info!(
        "entities {} | aoi {} objects in {} cells | pending {} | queued {}{}",
        stats.tracked_entities,
        stats.aoi_objects,
        stats.aoi_cells,
        stats.pending_reliable,
        stats.inbound_queued,
        ticks.map_or(String::new(), |t| format!(" | {:.1} ticks/s", t.tick_rate())),
    );
    for (id, violations) in &stats.suspicious {
        log::info!("suspicious {id}: {violations}");
    }
}
