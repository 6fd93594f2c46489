//! Opcode-dispatched event decoding (C5).
//!
//! [`parse_event`] takes a decoded COBS payload (event type in byte 0) and
//! returns a typed [`Event`], or `None` for malformed/under-length input.
//! Every decoder here is total: it never panics on short input, mirroring
//! [`crate::bytes::ByteReader`]'s contract.

use crate::bytes::ByteReader;

/// Device key: `(table_id, device_id)`.
pub type DeviceKey = (u8, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventType {
    GatewayInformation = 0x01,
    DeviceCommand = 0x02,
    DeviceOnlineStatus = 0x03,
    DeviceLockStatus = 0x04,
    RelayBasicLatching1 = 0x05,
    RelayBasicLatching2 = 0x06,
    RvStatus = 0x07,
    DimmableLight = 0x08,
    RgbLight = 0x09,
    GeneratorGenie = 0x0A,
    HvacStatus = 0x0B,
    TankSensor = 0x0C,
    HBridge1 = 0x0D,
    HBridge2 = 0x0E,
    HourMeter = 0x0F,
    Leveler = 0x10,
    SessionStatus = 0x1A,
    TankSensorV2 = 0x1B,
    RealTimeClock = 0x20,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayInformation {
    pub protocol_version: u8,
    pub options: u8,
    pub device_count: u8,
    pub table_id: u8,
    pub device_table_crc: u32,
    pub device_metadata_table_crc: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RvStatus {
    pub voltage: Option<f32>,
    pub temperature: Option<f32>,
    pub feature_flags: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayStatus {
    pub table_id: u8,
    pub device_id: u8,
    pub is_on: bool,
    pub status_byte: u8,
    pub dtc_code: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DimmableMode {
    Off = 0,
    On = 1,
    Blink = 2,
    Swell = 3,
}

impl DimmableMode {
    fn from_u8(v: u8) -> Self {
        match v & 0x03 {
            0 => DimmableMode::Off,
            1 => DimmableMode::On,
            2 => DimmableMode::Blink,
            _ => DimmableMode::Swell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimmableLight {
    pub table_id: u8,
    pub device_id: u8,
    pub brightness: u8,
    pub mode: DimmableMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbLight {
    pub table_id: u8,
    pub device_id: u8,
    pub mode: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub brightness: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HvacZone {
    pub table_id: u8,
    pub device_id: u8,
    pub heat_mode: u8,
    pub heat_source: u8,
    pub fan_mode: u8,
    pub low_trip_f: u8,
    pub high_trip_f: u8,
    pub zone_status: u8,
    pub indoor_f: Option<f32>,
    pub outdoor_f: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverStatus {
    pub table_id: u8,
    pub device_id: u8,
    pub status_byte: u8,
    pub position: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankLevel {
    pub table_id: u8,
    pub device_id: u8,
    pub level_pct: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceOnline {
    pub table_id: u8,
    pub device_id: u8,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockStatus {
    System {
        lockout_level: u8,
        table_id: u8,
        device_count: u8,
        per_device_locked: Vec<bool>,
    },
    Device {
        table_id: u8,
        device_id: u8,
        is_locked: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorStatus {
    pub table_id: u8,
    pub device_id: u8,
    pub is_running: bool,
    pub battery_voltage: Option<f32>,
    pub temperature_c: Option<f32>,
    pub state_name: &'static str,
    pub quiet_hours: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourMeter {
    pub table_id: u8,
    pub device_id: u8,
    pub hours: f32,
    pub maintenance_due: bool,
    pub maintenance_past_due: bool,
    pub error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealTimeClock {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceMetadataEntry {
    pub table_id: u8,
    pub device_id: u8,
    pub function_name: u16,
    pub function_instance: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MetadataResponseKind {
    SuccessMulti,
    SuccessComplete,
    Fail(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommandResponse {
    pub command_id: u16,
    pub kind: MetadataResponseKind,
    pub table_id: u8,
    pub start_id: u8,
    pub count: u8,
    pub table_crc: Option<u32>,
    pub entries: Vec<DeviceMetadataEntry>,
}

/// A single parsed wire event. `Raw` carries any event type this crate does
/// not (yet) interpret, including `SessionStatus (0x1A)` (§9 Open Questions
/// in the source spec — its payload is undocumented upstream).
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Event {
    GatewayInformation(GatewayInformation),
    RvStatus(RvStatus),
    RelayStatus(RelayStatus),
    DeviceOnline(DeviceOnline),
    DeviceLockStatus(LockStatus),
    TankLevels(Vec<TankLevel>),
    TankLevel(TankLevel),
    DimmableLight(DimmableLight),
    RgbLight(RgbLight),
    HvacZones(Vec<HvacZone>),
    CoverStatus(CoverStatus),
    GeneratorStatus(GeneratorStatus),
    HourMeter(HourMeter),
    RealTimeClock(RealTimeClock),
    DeviceCommandResponse(DeviceCommandResponse),
    Raw { event_type: u8, data: Vec<u8> },
}

fn decode_temp_88(raw: u16) -> Option<f32> {
    if matches!(raw, 0x8000 | 0x2FF0 | 0xFFFF) {
        return None;
    }
    let signed = if raw >= 0x8000 {
        raw as i32 - 0x1_0000
    } else {
        raw as i32
    };
    Some(signed as f32 / 256.0)
}

fn parse_gateway_information(data: &[u8]) -> Option<Event> {
    if data.len() < 5 {
        return None;
    }
    let mut crc_reader = ByteReader::new(&data[5..]);
    let device_table_crc = crc_reader.read_u32_le().unwrap_or(0);
    let device_metadata_table_crc = crc_reader.read_u32_le().unwrap_or(0);
    Some(Event::GatewayInformation(GatewayInformation {
        protocol_version: data[1],
        options: data[2],
        device_count: data[3],
        table_id: data[4],
        device_table_crc,
        device_metadata_table_crc,
    }))
}

fn parse_rv_status(data: &[u8]) -> Option<Event> {
    if data.len() < 6 {
        return None;
    }
    let v_raw = u16::from_be_bytes([data[1], data[2]]);
    let t_raw = u16::from_be_bytes([data[3], data[4]]);
    let voltage = if v_raw == 0xFFFF {
        None
    } else {
        Some(v_raw as f32 / 256.0)
    };
    let temperature = if matches!(t_raw, 0xFFFF | 0x7FFF) {
        None
    } else {
        Some(t_raw as f32 / 256.0)
    };
    Some(Event::RvStatus(RvStatus {
        voltage,
        temperature,
        feature_flags: data[5],
    }))
}

fn parse_relay_status(data: &[u8]) -> Option<Event> {
    if data.len() < 5 {
        return None;
    }
    let status_byte = data[3];
    let is_on = (status_byte & 0x0F) == 0x01;
    let dtc_code = if data.len() >= 9 {
        let code = u16::from_be_bytes([data[5], data[6]]);
        (code != 0).then_some(code)
    } else {
        None
    };
    Some(Event::RelayStatus(RelayStatus {
        table_id: data[1],
        device_id: data[2],
        is_on,
        status_byte,
        dtc_code,
    }))
}

fn parse_device_online(data: &[u8]) -> Option<Event> {
    if data.len() < 4 {
        return None;
    }
    Some(Event::DeviceOnline(DeviceOnline {
        table_id: data[1],
        device_id: data[2],
        is_online: data[3] != 0,
    }))
}

fn parse_device_lock_status(data: &[u8]) -> Option<Event> {
    if data.len() >= 8 {
        let table_id = data[6];
        let device_count = data[7];
        let bitfield_len = (device_count as usize).div_ceil(8);
        let bitfield = data.get(8..8 + bitfield_len).unwrap_or(&[]);
        let per_device_locked = (0..device_count as usize)
            .map(|i| bitfield.get(i / 8).map(|b| (b >> (i % 8)) & 1 != 0).unwrap_or(false))
            .collect();
        return Some(Event::DeviceLockStatus(LockStatus::System {
            lockout_level: data[1],
            table_id,
            device_count,
            per_device_locked,
        }));
    }
    if data.len() < 4 {
        return None;
    }
    Some(Event::DeviceLockStatus(LockStatus::Device {
        table_id: data[1],
        device_id: data[2],
        is_locked: data[3] != 0,
    }))
}

fn parse_tank_status(data: &[u8]) -> Option<Event> {
    if data.len() < 4 {
        return None;
    }
    let table_id = data[1];
    let mut tanks = Vec::new();
    let mut idx = 2;
    while idx + 1 < data.len() {
        tanks.push(TankLevel {
            table_id,
            device_id: data[idx],
            level_pct: data[idx + 1],
        });
        idx += 2;
    }
    Some(Event::TankLevels(tanks))
}

fn parse_tank_status_v2(data: &[u8]) -> Option<Event> {
    if data.len() < 4 {
        return None;
    }
    Some(Event::TankLevel(TankLevel {
        table_id: data[1],
        device_id: data[2],
        level_pct: data[3],
    }))
}

fn parse_dimmable_light(data: &[u8]) -> Option<Event> {
    if data.len() < 5 {
        return None;
    }
    let mode = data[3];
    let brightness = if data.len() >= 7 { data[6] } else { data[4] };
    Some(Event::DimmableLight(DimmableLight {
        table_id: data[1],
        device_id: data[2],
        brightness,
        mode: DimmableMode::from_u8(mode),
    }))
}

fn parse_rgb_light(data: &[u8]) -> Option<Event> {
    if data.len() < 4 {
        return None;
    }
    let mode = data[3];
    let (r, g, b, brightness) = if data.len() >= 8 {
        (data[4], data[5], data[6], data[7])
    } else {
        (0, 0, 0, 0)
    };
    Some(Event::RgbLight(RgbLight {
        table_id: data[1],
        device_id: data[2],
        mode,
        r,
        g,
        b,
        brightness,
    }))
}

const HVAC_ZONE_BYTES: usize = 11;

fn parse_hvac_status(data: &[u8]) -> Option<Event> {
    if data.len() < 4 {
        return None;
    }
    let table_id = data[1];
    let mut zones = Vec::new();
    let mut offset = 2;
    while offset + HVAC_ZONE_BYTES <= data.len() {
        let device_id = data[offset];
        let cmd = data[offset + 1];
        let low_f = data[offset + 2];
        let high_f = data[offset + 3];
        let status = data[offset + 4] & 0x8F;
        let indoor_raw = u16::from_be_bytes([data[offset + 5], data[offset + 6]]);
        let outdoor_raw = u16::from_be_bytes([data[offset + 7], data[offset + 8]]);

        zones.push(HvacZone {
            table_id,
            device_id,
            heat_mode: cmd & 0x07,
            heat_source: (cmd >> 4) & 0x03,
            fan_mode: (cmd >> 6) & 0x03,
            low_trip_f: low_f,
            high_trip_f: high_f,
            zone_status: status,
            indoor_f: decode_temp_88(indoor_raw),
            outdoor_f: decode_temp_88(outdoor_raw),
        });
        offset += HVAC_ZONE_BYTES;
    }
    Some(Event::HvacZones(zones))
}

fn parse_cover_status(data: &[u8]) -> Option<Event> {
    if data.len() < 4 {
        return None;
    }
    let position = data.get(4).copied().filter(|&p| p != 0xFF);
    Some(Event::CoverStatus(CoverStatus {
        table_id: data[1],
        device_id: data[2],
        status_byte: data[3],
        position,
    }))
}

fn generator_state_name(code: u8) -> &'static str {
    match code {
        0x00 => "Off",
        0x01 => "Starting",
        0x02 => "Running",
        0x03 => "Stopping",
        0x04 => "Fault",
        0x05 => "Cooldown",
        _ => "Unknown",
    }
}

/// `0x0A GeneratorGenie`: `[type, table_id, device_id, status, battery_BE16,
/// temp_BE16, state, flags]`. `battery`/`temp` use the same 8.8 fixed-point
/// encoding and sentinels as `RvStatus` (§4.5).
fn parse_generator_status(data: &[u8]) -> Option<Event> {
    if data.len() < 9 {
        return None;
    }
    let status = data[3];
    let battery_raw = u16::from_be_bytes([data[4], data[5]]);
    let temp_raw = u16::from_be_bytes([data[6], data[7]]);
    let battery_voltage = (battery_raw != 0xFFFF).then(|| battery_raw as f32 / 256.0);
    Some(Event::GeneratorStatus(GeneratorStatus {
        table_id: data[1],
        device_id: data[2],
        is_running: status & 0x01 != 0,
        battery_voltage,
        temperature_c: decode_temp_88(temp_raw),
        state_name: generator_state_name(data[8]),
        quiet_hours: data.get(9).copied().unwrap_or(0) & 0x01 != 0,
    }))
}

/// `0x0F HourMeter`: `[type, table_id, device_id, hours_LE16, flags]`.
/// `hours_LE16` is at 0.1 h resolution; `flags` bit 0 = maintenance due,
/// bit 1 = maintenance past due, bit 2 = error.
fn parse_hour_meter(data: &[u8]) -> Option<Event> {
    if data.len() < 6 {
        return None;
    }
    let raw = u16::from_le_bytes([data[3], data[4]]);
    let flags = data[5];
    Some(Event::HourMeter(HourMeter {
        table_id: data[1],
        device_id: data[2],
        hours: raw as f32 / 10.0,
        maintenance_due: flags & 0x01 != 0,
        maintenance_past_due: flags & 0x02 != 0,
        error: flags & 0x04 != 0,
    }))
}

/// `0x20 RealTimeClock`: `[type, year_since_2000, month, day, hour, minute,
/// second, weekday]`. Gateway-wide, carries no table/device id.
fn parse_real_time_clock(data: &[u8]) -> Option<Event> {
    if data.len() < 8 {
        return None;
    }
    Some(Event::RealTimeClock(RealTimeClock {
        year: 2000 + data[1] as u16,
        month: data[2],
        day: data[3],
        hour: data[4],
        minute: data[5],
        second: data[6],
        weekday: data[7],
    }))
}

/// `command_id` and `response_type` directly follow the event type byte —
/// there is no echoed-opcode byte on the wire. `SuccessComplete` (`0x81`)
/// carries only the metadata table CRC; the table this response belongs to
/// is resolved by the caller from the pending-command-id map
/// ([`crate::metadata::MetadataTracker`]), never from this frame.
/// `SuccessMulti` (`0x01`) is the only kind that carries per-device
/// metadata entries, addressed by `table_id`/`start_id` within this frame.
fn parse_device_command_response(data: &[u8]) -> Option<Event> {
    let mut r = ByteReader::new(data);
    r.read_u8()?; // event type, already known
    let command_id = r.read_u16_le()?;
    let response_type = r.read_u8()?;

    let kind = match response_type {
        0x01 => MetadataResponseKind::SuccessMulti,
        0x81 => MetadataResponseKind::SuccessComplete,
        0x02 | 0x82 => MetadataResponseKind::Fail(r.read_u8().unwrap_or(0)),
        other => MetadataResponseKind::Fail(other),
    };

    let mut table_id = 0;
    let mut start_id = 0;
    let mut count = 0;
    let mut table_crc = None;
    let mut entries = Vec::new();

    match kind {
        MetadataResponseKind::SuccessComplete => {
            table_crc = r.read_u32_le();
        }
        MetadataResponseKind::SuccessMulti => {
            table_id = r.read_u8()?;
            start_id = r.read_u8()?;
            count = r.read_u8()?;

            let mut index: u8 = 0;
            while let Some(protocol) = r.read_u8() {
                let Some(payload_size) = r.read_u8() else {
                    break;
                };
                let Some(payload) = r.read_slice(payload_size as usize) else {
                    break;
                };
                if (protocol == 1 || protocol == 2) && payload_size == 17 {
                    let function_name = u16::from_be_bytes([payload[0], payload[1]]);
                    entries.push(DeviceMetadataEntry {
                        table_id,
                        device_id: start_id.wrapping_add(index),
                        function_name,
                        function_instance: payload[2],
                    });
                }
                index = index.wrapping_add(1);
            }
        }
        MetadataResponseKind::Fail(_) => {}
    }

    Some(Event::DeviceCommandResponse(DeviceCommandResponse {
        command_id,
        kind,
        table_id,
        start_id,
        count,
        table_crc,
        entries,
    }))
}

/// Parses a decoded COBS frame into a typed [`Event`]. Returns `None` only
/// for an empty frame — unknown or under-length event types still parse,
/// the former as [`Event::Raw`] and the latter returning `None` from their
/// dedicated parser (never propagated as an error).
pub fn parse_event(data: &[u8]) -> Option<Event> {
    let event_type = *data.first()?;

    match event_type {
        0x01 => parse_gateway_information(data),
        0x02 => parse_device_command_response(data),
        0x03 => parse_device_online(data),
        0x04 => parse_device_lock_status(data),
        0x05 | 0x06 => parse_relay_status(data),
        0x07 => parse_rv_status(data),
        0x08 => parse_dimmable_light(data),
        0x09 => parse_rgb_light(data),
        0x0A => parse_generator_status(data),
        0x0B => parse_hvac_status(data),
        0x0C => parse_tank_status(data),
        0x0D | 0x0E => parse_cover_status(data),
        0x0F => parse_hour_meter(data),
        0x1B => parse_tank_status_v2(data),
        0x20 => parse_real_time_clock(data),
        _ => Some(Event::Raw {
            event_type,
            data: data.to_vec(),
        }),
    }
}
