//! HVAC command reconciliation (C8).
//!
//! The gateway only acknowledges HVAC commands by re-broadcasting zone
//! status, and writes may silently drop under BLE write-without-response.
//! [`HvacReconciler`] solves three problems at once: stale echoes from
//! prior commands must not clobber freshly issued state, setpoint writes
//! must be retried until a matching echo confirms them, and a richer
//! capability set than the gateway's own metadata must be inferred from
//! observed status bytes.

use std::time::{Duration, Instant};

use bitflags::bitflags;

use crate::event::HvacZone;

bitflags! {
    /// Capability bits inferred from observed `HvacZone` status bytes,
    /// independent of what the gateway's metadata advertises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HvacCapability: u8 {
        const GAS = 0x01;
        const AC = 0x02;
        const HEAT_PUMP = 0x04;
        const MULTI_SPEED_FAN = 0x08;
    }
}

const SETPOINT_TOLERANCE_F: i16 = 1;
const WINDOW_BASE: Duration = Duration::from_secs(8);
const WINDOW_SETPOINT: Duration = Duration::from_secs(20);
const WINDOW_PRESET: Duration = Duration::from_secs(70);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RETRIES: u8 = 3;

/// A command whose echo has not yet been confirmed (or disconfirmed).
#[derive(Debug, Clone, Copy)]
pub struct PendingHvacCommand {
    pub table_id: u8,
    pub device_id: u8,
    pub heat_mode: u8,
    pub heat_source: u8,
    pub fan_mode: u8,
    pub low_trip_f: u8,
    pub high_trip_f: u8,
    pub is_setpoint_change: bool,
    pub is_preset_change: bool,
    pub sent_at: Instant,
    pub retry_count: u8,
}

impl PendingHvacCommand {
    fn window(&self) -> Duration {
        if self.is_preset_change {
            WINDOW_PRESET
        } else if self.is_setpoint_change {
            WINDOW_SETPOINT
        } else {
            WINDOW_BASE
        }
    }

    fn matches(&self, zone: &HvacZone) -> bool {
        self.heat_mode == zone.heat_mode
            && self.heat_source == zone.heat_source
            && self.fan_mode == zone.fan_mode
            && (self.low_trip_f as i16 - zone.low_trip_f as i16).abs() <= SETPOINT_TOLERANCE_F
            && (self.high_trip_f as i16 - zone.high_trip_f as i16).abs() <= SETPOINT_TOLERANCE_F
    }
}

/// Outcome of applying an incoming `HvacZone` event through the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// No pending command for this zone (or it had already expired); the
    /// event should be applied to inventory normally.
    Apply,
    /// The event is a stale echo and must not touch inventory.
    Suppress,
    /// The event matched the pending command; it should be applied and the
    /// pending entry is now resolved (already removed internally).
    Confirmed,
}

/// Action the setpoint retry timer should take on firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Re-send the exact pending command and reschedule.
    Resend,
    /// Give up: retries exhausted, pending entry cleared.
    GiveUp,
    /// Nothing to do — no pending entry, or it was already confirmed.
    NoOp,
}

/// Owns per-zone pending-command guards and accumulated capability bits.
#[derive(Debug, Default)]
pub struct HvacReconciler {
    pending: std::collections::HashMap<(u8, u8), PendingHvacCommand>,
    capability: std::collections::HashMap<(u8, u8), HvacCapability>,
}

impl HvacReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly sent command as pending for its zone, replacing any
    /// prior pending entry (serialized per zone: one pending at a time).
    pub fn record_sent(&mut self, cmd: PendingHvacCommand) {
        self.pending.insert((cmd.table_id, cmd.device_id), cmd);
    }

    pub fn pending_for(&self, key: (u8, u8)) -> Option<&PendingHvacCommand> {
        self.pending.get(&key)
    }

    pub fn capability_for(&self, key: (u8, u8)) -> HvacCapability {
        self.capability.get(&key).copied().unwrap_or_default()
    }

    /// Accumulates capability bits from an observed zone status. Sticky:
    /// union with whatever was previously observed (P10 monotonicity).
    fn accumulate_capability(&mut self, zone: &HvacZone) {
        let key = (zone.table_id, zone.device_id);
        let mut bits = self.capability_for(key);

        match zone.zone_status & 0x0F {
            2 => bits |= HvacCapability::AC,
            3 => bits |= HvacCapability::HEAT_PUMP | HvacCapability::AC,
            5 | 6 => bits |= HvacCapability::GAS,
            _ => {}
        }
        if matches!(zone.heat_mode, 1 | 3) {
            bits |= match zone.heat_source {
                0 => HvacCapability::GAS,
                1 => HvacCapability::HEAT_PUMP,
                _ => HvacCapability::empty(),
            };
        }
        if matches!(zone.heat_mode, 2 | 3) {
            bits |= HvacCapability::AC;
        }
        if zone.fan_mode == 2 {
            bits |= HvacCapability::MULTI_SPEED_FAN;
        }

        self.capability.insert(key, bits);
    }

    /// Applies the pending-command guard (§4.4) to an incoming zone event.
    /// Capability bits are accumulated unconditionally, before the guard
    /// decision, per spec.
    pub fn process_zone(&mut self, zone: &HvacZone, now: Instant) -> GuardOutcome {
        self.accumulate_capability(zone);

        let key = (zone.table_id, zone.device_id);
        let Some(pending) = self.pending.get(&key) else {
            return GuardOutcome::Apply;
        };

        if now.duration_since(pending.sent_at) > pending.window() {
            self.pending.remove(&key);
            return GuardOutcome::Apply;
        }

        if !pending.matches(zone) {
            return GuardOutcome::Suppress;
        }

        if pending.is_preset_change {
            // Preset echoes can flicker; leave pending until the window
            // expires naturally instead of clearing on first match.
            return GuardOutcome::Confirmed;
        }

        self.pending.remove(&key);
        GuardOutcome::Confirmed
    }

    /// Called when a per-zone retry timer fires. The caller is responsible
    /// for actually re-transmitting on [`RetryAction::Resend`] and must
    /// then call [`Self::note_retry_sent`] to bump the bookkeeping.
    pub fn retry_due(&self, key: (u8, u8)) -> RetryAction {
        match self.pending.get(&key) {
            Some(p) if p.is_setpoint_change => {
                if p.retry_count >= MAX_RETRIES {
                    RetryAction::GiveUp
                } else {
                    RetryAction::Resend
                }
            }
            _ => RetryAction::NoOp,
        }
    }

    /// Applies [`RetryAction::GiveUp`]: drops the pending entry.
    pub fn give_up(&mut self, key: (u8, u8)) {
        self.pending.remove(&key);
    }

    /// Applies [`RetryAction::Resend`]: bumps `retry_count` and `sent_at`
    /// without re-merging with any newer current state, matching the
    /// "never re-merge with current state" rule.
    pub fn note_retry_sent(&mut self, key: (u8, u8), now: Instant) {
        if let Some(p) = self.pending.get_mut(&key) {
            p.retry_count += 1;
            p.sent_at = now;
        }
    }

    pub fn retry_interval() -> Duration {
        RETRY_INTERVAL
    }
}
