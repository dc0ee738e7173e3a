use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::connection::ConnectionState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub retransmissions: u64,
    pub duplicates: u64,
    pub decode_errors: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn packet_loss_percent(&self) -> f32 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_lost as f32 / self.packets_sent as f32 * 100.0
    }
}

/// Read-only view handed to reporting collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub state: ConnectionState,
    pub network: NetworkStats,
    pub pending_reliable: usize,
    pub inbound_queued: usize,
    pub aoi_objects: usize,
    pub aoi_cells: usize,
    pub tracked_entities: usize,
    pub suspicious: HashMap<u32, u32>,
}
