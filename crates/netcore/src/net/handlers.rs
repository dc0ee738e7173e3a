//! Built-in packet handlers. Public so that a replacement registered on the
//! dispatcher can wrap and delegate to them.

use super::dispatch::HandlerContext;
use super::protocol::{Packet, decode_direction};
use crate::anticheat::MovementVerdict;
use crate::event::ClientEvent;

pub fn connect_ack(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    if let Packet::ConnectAck(ack) = packet {
        ctx.connection.on_connect_ack(ack);
    }
}

pub fn user_info(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    let Packet::UserInfo(info) = packet else {
        return;
    };
    if !ctx.connection.on_user_info() {
        return;
    }

    ctx.world.spawn_local(info, ctx.now);
    ctx.events.push(ClientEvent::PlayerLogin {
        id: info.entity_id,
        name: info.name.clone(),
        position: info.position(),
        local: true,
    });
}

pub fn player_appear(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    let Packet::PlayerAppear(appear) = packet else {
        return;
    };
    if ctx.world.local_id() == Some(appear.entity_id) {
        log::debug!("ignoring appear for the local player");
        return;
    }

    let position = appear.position();
    let is_new = ctx.world.spawn_remote(
        appear.entity_id,
        &appear.name,
        position,
        decode_direction(appear.direction),
        ctx.now,
    );
    if is_new {
        log::debug!("{} ({}) appeared at {position}", appear.name, appear.entity_id);
        ctx.events.push(ClientEvent::PlayerLogin {
            id: appear.entity_id,
            name: appear.name.clone(),
            position,
            local: false,
        });
    }
}

pub fn player_disappear(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    let Packet::PlayerDisappear { entity_id } = *packet else {
        return;
    };
    if ctx.world.despawn(entity_id).is_some() {
        ctx.events.push(ClientEvent::PlayerLogout { id: entity_id });
    }
}

/// Remote movement goes through the anti-cheat validator; rejected moves
/// leave every local structure untouched.
pub fn walk(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    let Packet::Walk(walk) = packet else {
        return;
    };
    let id = walk.entity_id;
    let position = walk.position();
    let heading = walk.heading();

    if ctx.world.local_id() == Some(id) {
        // Server correction of our own position.
        if ctx.world.move_local(position, glam::Vec2::ZERO, heading, ctx.now) {
            ctx.events.push(ClientEvent::PlayerMoved { id, position });
        }
        return;
    }

    let Some(entity) = ctx.world.entities.get(id) else {
        log::debug!("walk for unknown entity {id}");
        return;
    };
    if !entity.is_newer(walk.timestamp) {
        log::debug!("stale walk for {id} at {}", walk.timestamp);
        return;
    }
    let since_seed = ctx
        .now
        .saturating_duration_since(entity.last_update)
        .as_secs_f32();

    match ctx
        .world
        .anticheat
        .validate_report(id, position, walk.timestamp, since_seed)
    {
        MovementVerdict::Accepted => {
            if let Some(entity) = ctx.world.entities.get_mut(id) {
                entity.apply_move(position, heading, walk.timestamp, ctx.now);
            }
            ctx.world.aoi.update_object_position(id, position);
            ctx.world
                .interpolators
                .add_state_at(id, position, heading, ctx.now);
            ctx.events.push(ClientEvent::PlayerMoved { id, position });
        }
        MovementVerdict::Rejected {
            reason,
            violations,
            suspicious,
        } => {
            log::warn!("rejected move of {id} to {position}: {reason}");
            ctx.events.push(ClientEvent::MovementRejected { id, reason });
            if suspicious {
                ctx.events
                    .push(ClientEvent::SuspiciousActivity { id, violations });
            }
        }
    }
}

pub fn chat(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    let Packet::Chat(chat) = packet else {
        return;
    };
    ctx.events.push(ClientEvent::ChatMessage {
        sender_id: chat.sender_id,
        sender: chat.sender_name.clone(),
        channel: chat.channel,
        text: chat.message.clone(),
    });
}

pub fn action(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    let Packet::Action(action) = packet else {
        return;
    };
    ctx.events.push(ClientEvent::ActionPerformed {
        entity_id: action.entity_id,
        target_id: action.target_id,
        action: action.action,
        data: action.data,
    });
}

pub fn item_action(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    let Packet::ItemAction(item) = packet else {
        return;
    };
    ctx.events.push(ClientEvent::ItemActionResult {
        action: item.action,
        item_uid: item.item_uid,
        params: item.params,
    });
}

pub fn disconnect(ctx: &mut HandlerContext<'_>, packet: &Packet) {
    if let Packet::Disconnect { reason } = *packet {
        ctx.connection.on_server_disconnect(reason);
    }
}
