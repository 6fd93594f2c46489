//! Device inventory and event fan-out (C12, C13).
//!
//! [`Inventory::apply`] folds a parsed [`Event`] into per-device state and
//! returns zero or more [`SideEffect`]s for the dispatcher to act on.
//! [`EventBus`] is the subscriber registry events are broadcast through
//! after inventory has been updated.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::event::{
    CoverStatus, DeviceOnline, Event, GatewayInformation, GeneratorStatus, HourMeter, HvacZone,
    LockStatus, RealTimeClock, RelayStatus, RgbLight, RvStatus, TankLevel,
};
use crate::event::DimmableLight;
use crate::hvac::{GuardOutcome, HvacReconciler};
use crate::registry::FunctionNameRegistry;

type DeviceKey = (u8, u8);

/// A side effect of applying an event, for the dispatcher to act on
/// (e.g. emitting a platform notification). Open for future variants.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SideEffect {
    DtcFault { key: DeviceKey, name: String, code: u16 },
}

/// Mutable, per-session device state (§3 Data model).
#[derive(Debug, Default)]
pub struct Inventory {
    pub gateway_info: Option<GatewayInformation>,
    pub rv_status: Option<RvStatus>,
    pub rtc: Option<RealTimeClock>,
    pub system_lockout_level: Option<u8>,

    pub relays: HashMap<DeviceKey, RelayStatus>,
    pub dimmable_lights: HashMap<DeviceKey, DimmableLight>,
    pub rgb_lights: HashMap<DeviceKey, RgbLight>,
    pub hvac_zones: HashMap<DeviceKey, HvacZone>,
    pub tanks: HashMap<DeviceKey, TankLevel>,
    pub device_online: HashMap<DeviceKey, DeviceOnline>,
    pub device_locks: HashMap<DeviceKey, bool>,
    pub generators: HashMap<DeviceKey, GeneratorStatus>,
    pub hour_meters: HashMap<DeviceKey, HourMeter>,
    pub covers: HashMap<DeviceKey, CoverStatus>,

    pub device_names: HashMap<DeviceKey, String>,
    pub last_known_dimmable_brightness: HashMap<DeviceKey, u8>,
    pub last_dtc_codes: HashMap<DeviceKey, u16>,

    pub hvac: HvacReconciler,
    registry: FunctionNameRegistry,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_name(&self, key: DeviceKey, function_name: u16, instance: u8) -> String {
        self.device_names
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.registry.resolve(function_name, instance))
    }

    fn apply_relay(&mut self, status: RelayStatus) -> Vec<SideEffect> {
        let key = (status.table_id, status.device_id);
        let mut effects = Vec::new();

        let previous_dtc = self.last_dtc_codes.get(&key).copied().unwrap_or(0);
        if let Some(code) = status.dtc_code {
            if code != previous_dtc {
                let name = self
                    .device_names
                    .get(&key)
                    .cloned()
                    .unwrap_or_default();
                if name.to_lowercase().contains("gas") {
                    effects.push(SideEffect::DtcFault { key, name, code });
                }
            }
            self.last_dtc_codes.insert(key, code);
        } else {
            self.last_dtc_codes.insert(key, 0);
        }

        self.relays.insert(key, status);
        effects
    }

    fn apply_dimmable(&mut self, light: DimmableLight) {
        let key = (light.table_id, light.device_id);
        if light.brightness > 0 {
            self.last_known_dimmable_brightness
                .insert(key, light.brightness);
        }
        self.dimmable_lights.insert(key, light);
    }

    fn apply_hvac_zones(&mut self, zones: Vec<HvacZone>, now: Instant) {
        for zone in zones {
            let key = (zone.table_id, zone.device_id);
            match self.hvac.process_zone(&zone, now) {
                GuardOutcome::Suppress => {}
                GuardOutcome::Apply | GuardOutcome::Confirmed => {
                    self.hvac_zones.insert(key, zone);
                }
            }
        }
    }

    /// Folds `event` into inventory state, returning any side effects for
    /// the caller to act on. `now` drives the HVAC pending-command window.
    pub fn apply(&mut self, event: &Event, now: Instant) -> Vec<SideEffect> {
        match event.clone() {
            Event::GatewayInformation(info) => {
                self.gateway_info = Some(info);
                Vec::new()
            }
            Event::RvStatus(status) => {
                self.rv_status = Some(status);
                Vec::new()
            }
            Event::RelayStatus(status) => self.apply_relay(status),
            Event::DeviceOnline(online) => {
                self.device_online.insert((online.table_id, online.device_id), online);
                Vec::new()
            }
            Event::DeviceLockStatus(lock) => {
                match lock {
                    LockStatus::System { lockout_level, .. } => {
                        self.system_lockout_level = Some(lockout_level);
                    }
                    LockStatus::Device {
                        table_id,
                        device_id,
                        is_locked,
                    } => {
                        self.device_locks.insert((table_id, device_id), is_locked);
                    }
                }
                Vec::new()
            }
            Event::TankLevels(levels) => {
                for t in levels {
                    self.tanks.insert((t.table_id, t.device_id), t);
                }
                Vec::new()
            }
            Event::TankLevel(t) => {
                self.tanks.insert((t.table_id, t.device_id), t);
                Vec::new()
            }
            Event::DimmableLight(light) => {
                self.apply_dimmable(light);
                Vec::new()
            }
            Event::RgbLight(light) => {
                self.rgb_lights.insert((light.table_id, light.device_id), light);
                Vec::new()
            }
            Event::HvacZones(zones) => {
                self.apply_hvac_zones(zones, now);
                Vec::new()
            }
            Event::GeneratorStatus(status) => {
                self.generators
                    .insert((status.table_id, status.device_id), status);
                Vec::new()
            }
            Event::HourMeter(meter) => {
                self.hour_meters.insert((meter.table_id, meter.device_id), meter);
                Vec::new()
            }
            Event::RealTimeClock(rtc) => {
                self.rtc = Some(rtc);
                Vec::new()
            }
            Event::CoverStatus(cover) => {
                self.covers.insert((cover.table_id, cover.device_id), cover);
                Vec::new()
            }
            Event::DeviceCommandResponse(_) | Event::Raw { .. } => Vec::new(),
        }
    }

    /// Tables with no cached metadata yet, as observed from status events
    /// bearing an unrecognized `table_id` (§4.11 on-demand request path).
    pub fn unknown_table_from_event(&self, event: &Event) -> Option<u8> {
        let table_id = match event {
            Event::RelayStatus(s) => s.table_id,
            Event::DimmableLight(d) => d.table_id,
            Event::HvacZones(zones) => zones.first()?.table_id,
            Event::TankLevels(tanks) => tanks.first()?.table_id,
            Event::TankLevel(t) => t.table_id,
            Event::GeneratorStatus(g) => g.table_id,
            Event::HourMeter(h) => h.table_id,
            _ => return None,
        };
        (table_id != 0).then_some(table_id)
    }
}

type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

/// Subscriber registry (C13): invoked synchronously, in receive order, for
/// every parsed event. A panicking subscriber is caught and logged; it
/// never prevents other subscribers from running.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    pub fn publish(&self, event: &Event) {
        for subscriber in &self.subscribers {
            let result = catch_unwind(AssertUnwindSafe(|| subscriber(event)));
            if let Err(panic) = result {
                log::error!("subscriber panicked while handling event: {panic:?}");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscribers.len())
            .finish()
    }
}
