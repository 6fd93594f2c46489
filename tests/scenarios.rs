//! End-to-end scenarios driving [`GatewaySession`] against the
//! deterministic [`NullTransport`] fake: auth, COBS-framed event decode,
//! metadata CRC gating, HVAC echo reconciliation, setpoint retry
//! exhaustion, and reconnect backoff.

use std::sync::Arc;
use std::time::Duration;

use onecontrol_gateway::adapters::null::NullTransport;
use onecontrol_gateway::cobs::{cobs_encode, CobsDecoder, CobsEncodeOptions};
use onecontrol_gateway::session::{GatewaySession, HvacCommandFlags};
use onecontrol_gateway::transport::{CharacteristicId, GatewayConfig, NullBondingAgent};

fn new_session() -> (GatewaySession, Arc<NullTransport>) {
    let transport = Arc::new(NullTransport::new());
    let session = GatewaySession::new(
        transport.clone(),
        Arc::new(NullBondingAgent),
        GatewayConfig::new("AA:BB:CC:DD:EE:FF"),
    );
    (session, transport)
}

/// Decodes a single self-contained COBS+CRC8 frame (as produced by one
/// `write_char` call) back to its plaintext payload.
fn decode_frame(frame: &[u8]) -> Vec<u8> {
    let mut dec = CobsDecoder::new(true);
    for &b in frame {
        if let Some(payload) = dec.decode_byte(b) {
            return payload;
        }
    }
    panic!("frame never terminated: {frame:?}");
}

fn encode_event(plaintext: &[u8]) -> Vec<u8> {
    cobs_encode(plaintext, CobsEncodeOptions::default())
}

/// Connects with `UNLOCK_STATUS` already reading "unlocked" (Step 1
/// short-circuits) and drives the SEED round-trip, leaving the session
/// `Authenticated`.
async fn connect_authenticated(session: &GatewaySession, transport: &Arc<NullTransport>) {
    transport
        .set_characteristic(CharacteristicId::UnlockStatus, b"unlocked".to_vec())
        .await;

    let session_clone = session.clone();
    let connect_fut = tokio::spawn(async move { session_clone.connect().await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    transport.notify(CharacteristicId::Seed, &[0, 0, 0, 1]).await;

    connect_fut.await.unwrap().unwrap();
}

/// Scenario 1: auth happy path (spec.md §8.1). UNLOCK_STATUS starts as the
/// raw 4-byte challenge, not the "unlocked" marker, exercising the full
/// Step 1 key computation and write, then the Step 2 SEED round-trip.
#[tokio::test]
async fn scenario_1_auth_happy_path() {
    let (session, transport) = new_session();
    transport
        .set_characteristic(CharacteristicId::UnlockStatus, vec![0x12, 0x34, 0x56, 0x78])
        .await;
    transport.set_unlock_after_key_write(true).await;

    let session_clone = session.clone();
    let transport_clone = transport.clone();
    let connect_fut = tokio::spawn(async move { session_clone.connect().await });

    // Step 1 takes ~700ms (500ms verify delay + 200ms notify-enable delay)
    // before the SEED subscriber is registered.
    tokio::time::sleep(Duration::from_millis(800)).await;
    transport_clone
        .notify(CharacteristicId::Seed, &[0x78, 0x56, 0x34, 0x12])
        .await;

    connect_fut.await.unwrap().unwrap();

    // Step 2 overwrites Step 1's 4-byte write with its own 16-byte key.
    let key_write = transport.last_write(CharacteristicId::Key).await.unwrap();
    assert_eq!(key_write.len(), 16);
    assert_eq!(&key_write[4..10], b"090336");
    assert_eq!(&key_write[10..16], &[0u8; 6]);

    assert_eq!(
        session.auth_state(),
        onecontrol_gateway::auth::AuthState::Authenticated
    );
}

/// Scenario 2: COBS-framed `RvStatus` (spec.md §8.2).
#[tokio::test]
async fn scenario_2_cobs_framed_rv_status() {
    let (session, transport) = new_session();
    connect_authenticated(&session, &transport).await;

    let plaintext = [0x07, 0x0C, 0x10, 0x18, 0x80, 0x00];
    let framed = encode_event(&plaintext);
    transport.notify(CharacteristicId::DataRead, &framed).await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = session.rv_status().expect("RvStatus applied to inventory");
    assert!((status.voltage.unwrap() - 12.063).abs() < 0.01);
    assert!((status.temperature.unwrap() - 24.5).abs() < 0.01);
}

fn gateway_information_frame(table_id: u8, meta_crc: u32) -> Vec<u8> {
    let mut data = vec![0x01, 1, 0, 1, table_id];
    data.extend(0x1111_1111u32.to_le_bytes()); // device_table_crc, unused here
    data.extend(meta_crc.to_le_bytes());
    data
}

fn device_metadata_multi_frame(command_id: u16, table_id: u8) -> Vec<u8> {
    let mut data = vec![0x02];
    data.extend(command_id.to_le_bytes());
    data.push(0x01); // SuccessMulti
    data.push(table_id);
    data.push(0x00); // start_id
    data.push(0x01); // count
    data.push(1); // protocol = Host
    data.push(17); // payload size
    let mut payload = vec![0u8; 17];
    payload[0..2].copy_from_slice(&0x1234u16.to_be_bytes());
    payload[2] = 0x05;
    data.extend(payload);
    data
}

fn device_metadata_complete_frame(command_id: u16, table_crc: u32) -> Vec<u8> {
    let mut data = vec![0x02];
    data.extend(command_id.to_le_bytes());
    data.push(0x81); // SuccessComplete
    data.extend(table_crc.to_le_bytes());
    data
}

fn opcode_writes(history: &[Vec<u8>], opcode: u8) -> usize {
    history
        .iter()
        .filter(|frame| decode_frame(frame).get(2) == Some(&opcode))
        .count()
}

/// Scenario 3: metadata CRC gating (spec.md §8.3).
#[tokio::test]
async fn scenario_3_metadata_crc_gating() {
    const CMD_GET_DEVICES_METADATA: u8 = 0x02;
    const META_CRC: u32 = 0xAABB_CCDD;
    const TABLE_ID: u8 = 0x07;

    let (session, transport) = new_session();
    connect_authenticated(&session, &transport).await;

    transport
        .notify(
            CharacteristicId::DataRead,
            &encode_event(&gateway_information_frame(TABLE_ID, META_CRC)),
        )
        .await;

    // The request fires 500ms after GatewayInformation.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let history = transport.write_history(CharacteristicId::DataWrite).await;
    assert_eq!(opcode_writes(&history, CMD_GET_DEVICES_METADATA), 1);

    let request_frame = history
        .iter()
        .map(|f| decode_frame(f))
        .find(|p| p.get(2) == Some(&CMD_GET_DEVICES_METADATA))
        .unwrap();
    let command_id = u16::from_le_bytes([request_frame[0], request_frame[1]]);

    transport
        .notify(
            CharacteristicId::DataRead,
            &encode_event(&device_metadata_multi_frame(command_id, TABLE_ID)),
        )
        .await;
    transport
        .notify(
            CharacteristicId::DataRead,
            &encode_event(&device_metadata_complete_frame(command_id, META_CRC)),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        session.device_name(TABLE_ID, 0x00).as_deref(),
        Some("function_0x1234_inst_5")
    );

    // Reconnect: same meta_crc must not trigger a second request.
    session.disconnect().await.unwrap();
    connect_authenticated(&session, &transport).await;
    transport
        .notify(
            CharacteristicId::DataRead,
            &encode_event(&gateway_information_frame(TABLE_ID, META_CRC)),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let history = transport.write_history(CharacteristicId::DataWrite).await;
    assert_eq!(
        opcode_writes(&history, CMD_GET_DEVICES_METADATA),
        1,
        "unchanged CRC must not re-request metadata on reconnect"
    );
}

fn hvac_zone_frame(table_id: u8, device_id: u8, heat: u8, source: u8, fan: u8, low: u8, high: u8) -> Vec<u8> {
    let cmd = (heat & 0x07) | ((source & 0x03) << 4) | ((fan & 0x03) << 6);
    let mut data = vec![0x0B, table_id];
    data.push(device_id);
    data.push(cmd);
    data.push(low);
    data.push(high);
    data.push(0x00); // status
    data.extend([0xFF, 0xFF]); // indoor: sentinel, no reading
    data.extend([0xFF, 0xFF]); // outdoor: sentinel, no reading
    data.extend([0x00, 0x00]); // reserved, not consumed by the parser
    data
}

/// Scenario 4: HVAC stale-echo suppression (spec.md §8.4).
#[tokio::test]
async fn scenario_4_hvac_stale_echo_suppression() {
    let (session, transport) = new_session();
    connect_authenticated(&session, &transport).await;

    session
        .send_hvac(
            1,
            1,
            1,
            0,
            0,
            68,
            78,
            HvacCommandFlags {
                is_setpoint_change: true,
                is_preset_change: false,
            },
        )
        .await
        .unwrap();

    // Stale echo: differs outside tolerance, must be suppressed.
    transport
        .notify(
            CharacteristicId::DataRead,
            &encode_event(&hvac_zone_frame(1, 1, 2, 0, 0, 60, 75)),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.hvac_zone(1, 1).is_none(), "stale echo must not apply");

    // Matching echo, high_trip_f off by 1 (within tolerance): confirms.
    transport
        .notify(
            CharacteristicId::DataRead,
            &encode_event(&hvac_zone_frame(1, 1, 1, 0, 0, 68, 79)),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let zone = session.hvac_zone(1, 1).expect("matching echo applies");
    assert_eq!(zone.low_trip_f, 68);
    assert_eq!(zone.high_trip_f, 79);
}

const CMD_ACTION_HVAC: u8 = 0x45;

/// Scenario 5: setpoint retry exhaustion (spec.md §8.5). Under infinite
/// suppression (no matching echo ever arrives), a setpoint command
/// produces exactly 1 original + 3 retries, then gives up.
#[tokio::test(start_paused = true)]
async fn scenario_5_setpoint_retry_exhaustion() {
    let (session, transport) = new_session();
    connect_authenticated(&session, &transport).await;

    session
        .send_hvac(
            1,
            1,
            1,
            0,
            0,
            68,
            78,
            HvacCommandFlags {
                is_setpoint_change: true,
                is_preset_change: false,
            },
        )
        .await
        .unwrap();

    // Retries fire every 5s; after 3 (at t=5,10,15) the 4th check at t=20
    // gives up without resending. Advance well past that boundary.
    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
    }

    let history = transport.write_history(CharacteristicId::DataWrite).await;
    assert_eq!(opcode_writes(&history, CMD_ACTION_HVAC), 4);
}

/// Scenario 6: reconnect backoff (spec.md §8.6). An unsolicited disconnect
/// schedules the next reconnect attempt `reconnect_backoff(0) == 5s`
/// later; the formula for the next three consecutive failures (10, 20,
/// 40s, capped thereafter) is exercised directly, since reproducing four
/// consecutive *failed* reconnects end-to-end would also be compounded by
/// `connect()`'s own internal per-attempt retry delays (a different,
/// already-covered mechanism).
#[tokio::test(start_paused = true)]
async fn scenario_6_reconnect_backoff() {
    let (session, transport) = new_session();
    connect_authenticated(&session, &transport).await;

    // Keeps the post-backoff reconnect attempt's own SEED wait satisfied,
    // since `try_connect_once` re-subscribes to SEED on every attempt.
    let transport_for_seed = transport.clone();
    let seed_pump = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            transport_for_seed.notify(CharacteristicId::Seed, &[0, 0, 0, 1]).await;
        }
    });

    let before = tokio::time::Instant::now();
    transport.trigger_disconnect().await;
    // `on_disconnected` does its state transition inside a spawned task;
    // give it a chance to run before observing the intermediate state.
    tokio::task::yield_now().await;
    assert_eq!(session.auth_state(), onecontrol_gateway::auth::AuthState::Disconnected);

    loop {
        tokio::time::advance(Duration::from_millis(100)).await;
        if matches!(
            session.auth_state(),
            onecontrol_gateway::auth::AuthState::Authenticated
        ) {
            break;
        }
    }
    seed_pump.abort();

    let elapsed = before.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));

    assert_eq!(
        onecontrol_gateway::session::reconnect_backoff(1),
        Duration::from_secs(10)
    );
    assert_eq!(
        onecontrol_gateway::session::reconnect_backoff(2),
        Duration::from_secs(20)
    );
    assert_eq!(
        onecontrol_gateway::session::reconnect_backoff(3),
        Duration::from_secs(40)
    );
}
