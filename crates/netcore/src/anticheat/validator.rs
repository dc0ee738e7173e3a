use std::collections::HashMap;
use std::fmt;

use glam::Vec2;

use crate::config::AntiCheatConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    TooFast { distance: f32, allowed: f32 },
    NonFinite,
    NegativeInterval,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooFast { distance, allowed } => {
                write!(f, "moved {distance:.2} units, at most {allowed:.2} allowed")
            }
            RejectReason::NonFinite => f.write_str("non-finite movement input"),
            RejectReason::NegativeInterval => f.write_str("movement timestamp went backwards"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MovementVerdict {
    Accepted,
    Rejected {
        reason: RejectReason,
        violations: u32,
        /// Set on the rejection that reaches the suspicious threshold.
        suspicious: bool,
    },
}

impl MovementVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MovementVerdict::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AntiCheatRecord {
    pub entity_id: u32,
    pub last_position: Vec2,
    /// Wire timestamp (ms) of the last accepted report.
    pub last_timestamp: Option<u32>,
    pub violations: u32,
}

impl AntiCheatRecord {
    fn new(entity_id: u32, position: Vec2) -> Self {
        Self {
            entity_id,
            last_position: position,
            last_timestamp: None,
            violations: 0,
        }
    }
}

/// Speed-based plausibility check for remote movement. Only observes:
/// it never mutates game state and never talks to the network.
#[derive(Debug)]
pub struct AntiCheatValidator {
    config: AntiCheatConfig,
    records: HashMap<u32, AntiCheatRecord>,
}

impl AntiCheatValidator {
    pub fn new(config: AntiCheatConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AntiCheatConfig {
        &self.config
    }

    pub fn max_distance(&self, dt: f32) -> f32 {
        self.config.max_speed * dt * (1.0 + self.config.tolerance)
    }

    /// Starts tracking `entity_id` at `position`, keeping any violations.
    pub fn seed(&mut self, entity_id: u32, position: Vec2, timestamp: Option<u32>) {
        let record = self
            .records
            .entry(entity_id)
            .or_insert_with(|| AntiCheatRecord::new(entity_id, position));
        record.last_position = position;
        record.last_timestamp = timestamp;
    }

    /// `dt` is in seconds.
    pub fn validate_movement(
        &mut self,
        entity_id: u32,
        old: Vec2,
        new: Vec2,
        dt: f32,
    ) -> MovementVerdict {
        let allowed = self.max_distance(dt);
        let record = self
            .records
            .entry(entity_id)
            .or_insert_with(|| AntiCheatRecord::new(entity_id, old));

        let reason = if !old.is_finite() || !new.is_finite() || !dt.is_finite() {
            Some(RejectReason::NonFinite)
        } else if dt < 0.0 {
            Some(RejectReason::NegativeInterval)
        } else {
            let distance = old.distance(new);
            (distance > allowed).then_some(RejectReason::TooFast { distance, allowed })
        };

        let Some(reason) = reason else {
            record.last_position = new;
            return MovementVerdict::Accepted;
        };

        record.violations = record.violations.saturating_add(1);
        let suspicious = record.violations == self.config.suspicious_threshold;
        if suspicious {
            log::warn!(
                "entity {entity_id} flagged after {} movement violations",
                record.violations
            );
        }

        MovementVerdict::Rejected {
            reason,
            violations: record.violations,
            suspicious,
        }
    }

    /// Checks a timestamped position report against the last accepted one.
    /// A record seeded without a timestamp is checked against `since_seed`,
    /// the arrival-time interval in seconds since it was seeded. An entity
    /// with no record at all is only seeded.
    pub fn validate_report(
        &mut self,
        entity_id: u32,
        position: Vec2,
        timestamp: u32,
        since_seed: f32,
    ) -> MovementVerdict {
        let Some(record) = self.records.get(&entity_id) else {
            if !position.is_finite() {
                return self.validate_movement(entity_id, position, position, 0.0);
            }
            self.seed(entity_id, position, Some(timestamp));
            return MovementVerdict::Accepted;
        };

        let last_position = record.last_position;
        let dt = match record.last_timestamp {
            // Wrap-aware signed difference.
            Some(last) => timestamp.wrapping_sub(last) as i32 as f32 / 1000.0,
            None => since_seed,
        };

        let verdict = self.validate_movement(entity_id, last_position, position, dt);
        if verdict.is_accepted() {
            if let Some(record) = self.records.get_mut(&entity_id) {
                record.last_timestamp = Some(timestamp);
            }
        }
        verdict
    }

    pub fn forget(&mut self, entity_id: u32) -> Option<AntiCheatRecord> {
        self.records.remove(&entity_id)
    }

    pub fn record(&self, entity_id: u32) -> Option<&AntiCheatRecord> {
        self.records.get(&entity_id)
    }

    /// Violation counts of every entity with at least one violation.
    pub fn suspicious_counts(&self) -> HashMap<u32, u32> {
        self.records
            .values()
            .filter(|r| r.violations > 0)
            .map(|r| (r.entity_id, r.violations))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
