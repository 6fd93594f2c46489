//! Gateway session and dispatcher (C10) plus the reconnect supervisor
//! (C11): connection lifecycle, notification demux, command transmission,
//! heartbeat, and exponential-backoff reconnect.
//!
//! Everything here runs on a single cooperative context per session, per
//! spec.md §5: `connect()` serializes via [`tokio::sync::Mutex`], held only
//! across the state check and released before any `.await` that could
//! block indefinitely; all other mutable state lives behind one
//! `std::sync::Mutex<SessionState>` mutated synchronously from the
//! notification-processing task, the only place bytes are demultiplexed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::auth::{run_step1, run_step2, AuthState};
use crate::cobs::{cobs_encode, CobsDecoder, CobsEncodeOptions};
use crate::command::{CommandBuilder, DimmableEffect, RgbMode};
use crate::error::{GatewayError, TransportError};
use crate::event::{parse_event, DeviceCommandResponse, Event, MetadataResponseKind};
use crate::hvac::{HvacCapability, PendingHvacCommand, RetryAction};
use crate::inventory::{EventBus, Inventory, SideEffect};
use crate::metadata::{MetadataAction, MetadataTracker};
use crate::transport::{BondingAgent, CharacteristicId, GatewayConfig, PairingMethod, Transport};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const STALE_EVENT_TIMEOUT: Duration = Duration::from_secs(300);
const LOCKOUT_THROTTLE: Duration = Duration::from_secs(5);
const LOCKOUT_STEP_DELAY: Duration = Duration::from_millis(100);
const CONNECT_RETRIES: u32 = 3;
const RECONNECT_BACKOFF_BASE: Duration = Duration::from_secs(5);
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(120);
const NOTIFY_ENABLE_DELAY: Duration = Duration::from_millis(200);
const SEED_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Flags distinguishing an HVAC command's retry/suppression window (§4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct HvacCommandFlags {
    pub is_setpoint_change: bool,
    pub is_preset_change: bool,
}

/// The exponential backoff delay for the `n`th consecutive reconnect
/// failure (§4.10): `min(5s * 2^n, 120s)`.
pub fn reconnect_backoff(consecutive_failures: u32) -> Duration {
    let scaled = RECONNECT_BACKOFF_BASE.saturating_mul(1u32 << consecutive_failures.min(24));
    scaled.min(RECONNECT_BACKOFF_CAP)
}

struct SessionState {
    decoder: CobsDecoder,
    inventory: Inventory,
    metadata: MetadataTracker,
    commands: CommandBuilder,
    bus: EventBus,
    last_event_time: Instant,
    can_write: Option<CharacteristicId>,
    last_lockout_clear: Option<Instant>,
    auth: AuthState,
}

impl SessionState {
    fn new() -> Self {
        Self {
            decoder: CobsDecoder::new(true),
            inventory: Inventory::new(),
            metadata: MetadataTracker::new(),
            commands: CommandBuilder::new(),
            bus: EventBus::new(),
            last_event_time: Instant::now(),
            can_write: None,
            last_lockout_clear: None,
            auth: AuthState::Disconnected,
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    bonding: Arc<dyn BondingAgent>,
    config: GatewayConfig,
    state: StdMutex<SessionState>,
    connect_lock: AsyncMutex<()>,
    consecutive_failures: std::sync::atomic::AtomicU32,
    tasks: AsyncMutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    hvac_retry: HashMap<(u8, u8), JoinHandle<()>>,
}

/// Owns the live connection, the auth state machine, the device inventory,
/// and every timer the spec names (C10).
#[derive(Clone)]
pub struct GatewaySession {
    inner: Arc<Inner>,
}

impl GatewaySession {
    pub fn new(
        transport: Arc<dyn Transport>,
        bonding: Arc<dyn BondingAgent>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                bonding,
                config,
                state: StdMutex::new(SessionState::new()),
                connect_lock: AsyncMutex::new(()),
                consecutive_failures: std::sync::atomic::AtomicU32::new(0),
                tasks: AsyncMutex::new(Tasks::default()),
            }),
        }
    }

    /// Registers an event callback, invoked synchronously in receive order
    /// for every parsed event (C13).
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.state.lock().unwrap().bus.subscribe(callback);
    }

    pub fn auth_state(&self) -> AuthState {
        self.inner.state.lock().unwrap().auth.clone()
    }

    /// Idempotent connect: serializes via `connect_lock`, runs the full
    /// two-step handshake (§4.7), and on success starts the heartbeat.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let _guard = self.inner.connect_lock.lock().await;

        if matches!(self.auth_state(), AuthState::Authenticated) {
            return Ok(());
        }

        self.set_auth(AuthState::Connecting);
        let result = self.connect_with_retries().await;

        match result {
            Ok(()) => {
                self.inner
                    .consecutive_failures
                    .store(0, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.set_auth(AuthState::Failed(crate::auth::AuthFailureKind::Transport));
                Err(e)
            }
        }
    }

    async fn connect_with_retries(&self) -> Result<(), GatewayError> {
        let mut last_err = None;
        for attempt in 1..=CONNECT_RETRIES {
            match self.try_connect_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(3) * attempt).await;
                }
            }
        }

        if self.inner.config.pairing_method == PairingMethod::Pin {
            self.inner.bonding.remove_bond(&self.inner.config.address).await;
            if self.try_connect_once().await.is_ok() {
                return Ok(());
            }
        }

        let adapters = self.inner.transport.adapter_count();
        for _ in 1..adapters {
            if self.try_connect_once().await.is_ok() {
                return Ok(());
            }
        }

        Err(last_err.unwrap_or(GatewayError::Transport(TransportError::ConnectFailed(
            "retries exhausted".into(),
        ))))
    }

    async fn try_connect_once(&self) -> Result<(), GatewayError> {
        let session = self.clone();
        self.inner
            .transport
            .connect(Box::new(move || session.on_disconnected()))
            .await?;

        self.set_auth(AuthState::Unlocking);
        run_step1(self.inner.transport.as_ref()).await?;
        self.set_auth(AuthState::Unlocked);

        let (seed_tx, seed_rx) = oneshot::channel::<Vec<u8>>();
        let seed_tx = StdMutex::new(Some(seed_tx));
        self.inner
            .transport
            .start_notify(
                CharacteristicId::Seed,
                Box::new(move |bytes| {
                    if let Some(tx) = seed_tx.lock().unwrap().take() {
                        let _ = tx.send(bytes);
                    }
                }),
            )
            .await?;

        let (byte_tx, byte_rx) = mpsc::unbounded_channel::<u8>();
        self.inner
            .transport
            .start_notify(
                CharacteristicId::DataRead,
                Box::new(move |bytes| {
                    for b in bytes {
                        let _ = byte_tx.send(b);
                    }
                }),
            )
            .await?;

        tokio::time::sleep(NOTIFY_ENABLE_DELAY).await;
        self.set_auth(AuthState::AwaitingSeed);

        let seed = tokio::time::timeout(SEED_WAIT_TIMEOUT, seed_rx)
            .await
            .map_err(|_| {
                GatewayError::Auth(crate::error::AuthFailure::SeedTimeout(SEED_WAIT_TIMEOUT))
            })?
            .map_err(|_| {
                GatewayError::Auth(crate::error::AuthFailure::SeedTimeout(SEED_WAIT_TIMEOUT))
            })?;

        run_step2(
            self.inner.transport.as_ref(),
            &seed,
            &self.inner.config.gateway_pin_str(),
        )
        .await?;
        self.set_auth(AuthState::Authenticated);

        if let Ok(chars) = self.inner.transport.enumerate_characteristics().await {
            if chars.contains(&CharacteristicId::CanWrite) {
                self.inner.state.lock().unwrap().can_write = Some(CharacteristicId::CanWrite);
            }
        }

        {
            let mut st = self.inner.state.lock().unwrap();
            st.last_event_time = Instant::now();
        }

        let session_frames = self.clone();
        let frame_task = tokio::spawn(async move {
            session_frames.run_frame_loop(byte_rx).await;
        });

        let session_hb = self.clone();
        let heartbeat_task = tokio::spawn(async move {
            session_hb.run_heartbeat().await;
        });

        let mut tasks = self.inner.tasks.lock().await;
        tasks.heartbeat = Some(heartbeat_task);
        drop(frame_task); // detached: lives until the decoder channel closes

        Ok(())
    }

    async fn run_frame_loop(&self, mut rx: mpsc::UnboundedReceiver<u8>) {
        while let Some(byte) = rx.recv().await {
            let frame = {
                let mut st = self.inner.state.lock().unwrap();
                st.decoder.decode_byte(byte)
            };
            if let Some(frame) = frame {
                self.handle_frame(&frame).await;
            }
        }
    }

    async fn handle_frame(&self, frame: &[u8]) {
        {
            let mut st = self.inner.state.lock().unwrap();
            st.last_event_time = Instant::now();
        }

        let Some(event) = parse_event(frame) else {
            return;
        };

        if let Event::DeviceCommandResponse(ref resp) = event {
            self.handle_metadata_response(resp);
            self.inner.state.lock().unwrap().bus.publish(&event);
            return;
        }

        let (effects, on_demand_table, crc_gate) = {
            let mut st = self.inner.state.lock().unwrap();
            let now = Instant::now();
            let effects = st.inventory.apply(&event, now);

            if let Event::GatewayInformation(ref info) = event {
                let table_id = info.table_id;
                let action = st
                    .metadata
                    .on_gateway_information(table_id, info.device_metadata_table_crc);
                let gate = match action {
                    MetadataAction::RequestAfter(delay) => Some((table_id, delay)),
                    _ => None,
                };
                (effects, None, gate)
            } else {
                let on_demand = st.inventory.unknown_table_from_event(&event).filter(|&t| {
                    st.metadata.needs_on_demand_request(t)
                });
                (effects, on_demand, None)
            }
        };

        for effect in effects {
            match effect {
                SideEffect::DtcFault { .. } => {
                    // Logged and fanned out via the event bus below; no
                    // separate side channel in this crate.
                    log::warn!("dtc fault side effect: {effect:?}");
                }
            }
        }

        self.inner.state.lock().unwrap().bus.publish(&event);

        if let Some((table_id, delay)) = crc_gate {
            self.schedule_metadata_request(table_id, delay);
        }
        if let Some(table_id) = on_demand_table {
            self.schedule_metadata_request(table_id, Duration::ZERO);
        }
    }

    /// Feeds a `DeviceCommand` echo into the metadata tracker (CRC gating,
    /// `0x0F` permanent rejection) and resolves any returned function-name
    /// entries into `Inventory::device_names`.
    fn handle_metadata_response(&self, resp: &DeviceCommandResponse) {
        let mut st = self.inner.state.lock().unwrap();
        match resp.kind {
            MetadataResponseKind::SuccessComplete => {
                let expected_crc = st
                    .inventory
                    .gateway_info
                    .as_ref()
                    .map(|g| g.device_metadata_table_crc)
                    .unwrap_or_else(|| resp.table_crc.unwrap_or(0));
                st.metadata
                    .on_success_complete(resp.command_id, resp.table_crc.unwrap_or(0), expected_crc);
            }
            MetadataResponseKind::Fail(code) => {
                st.metadata.on_fail(resp.command_id, code);
            }
            MetadataResponseKind::SuccessMulti => {}
        }

        for entry in &resp.entries {
            let key = (entry.table_id, entry.device_id);
            let name = st
                .inventory
                .resolve_name(key, entry.function_name, entry.function_instance);
            st.inventory.device_names.insert(key, name);
        }
    }

    fn schedule_metadata_request(&self, table_id: u8, delay: Duration) {
        let session = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let (cmd_id, frame) = {
                let mut st = session.inner.state.lock().unwrap();
                let (cmd_id, payload) = st.commands.build_get_devices_metadata(table_id, 0, 0xFF);
                st.metadata.record_request(cmd_id, table_id);
                (cmd_id, payload)
            };
            let _ = session.write_command(frame).await;
            let _ = cmd_id;
        });
    }

    async fn write_command(&self, payload: Vec<u8>) -> Result<(), GatewayError> {
        if !matches!(self.auth_state(), AuthState::Authenticated) {
            return Err(GatewayError::Disconnected);
        }
        let framed = cobs_encode(&payload, CobsEncodeOptions::default());
        self.inner
            .transport
            .write_char(CharacteristicId::DataWrite, &framed, false)
            .await
            .map_err(GatewayError::from)
    }

    pub async fn send_switch(&self, table_id: u8, device_id: u8, state: bool) -> Result<(), GatewayError> {
        let (_, frame) = self
            .inner
            .state
            .lock()
            .unwrap()
            .commands
            .build_action_switch(table_id, state, &[device_id]);
        self.write_command(frame).await
    }

    pub async fn send_dimmable(
        &self,
        table_id: u8,
        device_id: u8,
        brightness: u8,
    ) -> Result<(), GatewayError> {
        let (_, frame) = self
            .inner
            .state
            .lock()
            .unwrap()
            .commands
            .build_action_dimmable(table_id, device_id, brightness);
        self.write_command(frame).await
    }

    pub async fn send_dimmable_effect(
        &self,
        table_id: u8,
        device_id: u8,
        effect: DimmableEffect,
    ) -> Result<(), GatewayError> {
        let (_, frame) = self
            .inner
            .state
            .lock()
            .unwrap()
            .commands
            .build_action_dimmable_effect(table_id, device_id, effect);
        self.write_command(frame).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send_rgb(
        &self,
        table_id: u8,
        device_id: u8,
        mode: RgbMode,
        rgb: (u8, u8, u8),
        auto_off: u8,
        blink_interval: (u8, u8),
        transition_interval_ms: u16,
    ) -> Result<(), GatewayError> {
        let (_, frame) = self.inner.state.lock().unwrap().commands.build_action_rgb(
            table_id,
            device_id,
            mode,
            rgb,
            auto_off,
            blink_interval,
            transition_interval_ms,
        );
        self.write_command(frame).await
    }

    pub async fn send_generator(&self, table_id: u8, device_id: u8, run: bool) -> Result<(), GatewayError> {
        let (_, frame) = self
            .inner
            .state
            .lock()
            .unwrap()
            .commands
            .build_action_generator(table_id, device_id, run);
        self.write_command(frame).await
    }

    /// Sends an HVAC command and registers the pending-command guard
    /// (§4.4). Setpoint changes schedule a 5s retry timer.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_hvac(
        &self,
        table_id: u8,
        device_id: u8,
        heat_mode: u8,
        heat_source: u8,
        fan_mode: u8,
        low_trip_f: u8,
        high_trip_f: u8,
        flags: HvacCommandFlags,
    ) -> Result<(), GatewayError> {
        let key = (table_id, device_id);
        let (_, frame) = {
            let mut st = self.inner.state.lock().unwrap();
            st.commands.build_action_hvac(
                table_id, device_id, heat_mode, heat_source, fan_mode, low_trip_f, high_trip_f,
            )
        };

        self.write_command(frame).await?;

        {
            let mut st = self.inner.state.lock().unwrap();
            st.inventory.hvac.record_sent(PendingHvacCommand {
                table_id,
                device_id,
                heat_mode,
                heat_source,
                fan_mode,
                low_trip_f,
                high_trip_f,
                is_setpoint_change: flags.is_setpoint_change,
                is_preset_change: flags.is_preset_change,
                sent_at: Instant::now(),
                retry_count: 0,
            });
        }

        if flags.is_setpoint_change {
            self.schedule_hvac_retry(key).await;
        }

        Ok(())
    }

    /// Spawns the retry loop for one zone's pending setpoint command
    /// (§4.4): sleeps a retry interval, resends on [`RetryAction::Resend`],
    /// and keeps looping until the pending entry is confirmed, dropped on
    /// window expiry, or retries are exhausted.
    async fn schedule_hvac_retry(&self, key: (u8, u8)) {
        let session = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(crate::hvac::HvacReconciler::retry_interval()).await;

                let action = session.inner.state.lock().unwrap().inventory.hvac.retry_due(key);
                match action {
                    RetryAction::NoOp => break,
                    RetryAction::GiveUp => {
                        session.inner.state.lock().unwrap().inventory.hvac.give_up(key);
                        log::warn!("HVAC setpoint retries exhausted for {key:?}");
                        break;
                    }
                    RetryAction::Resend => {
                        let frame = {
                            let mut st = session.inner.state.lock().unwrap();
                            let pending =
                                *st.inventory.hvac.pending_for(key).expect("checked by retry_due");
                            st.commands
                                .build_action_hvac(
                                    pending.table_id,
                                    pending.device_id,
                                    pending.heat_mode,
                                    pending.heat_source,
                                    pending.fan_mode,
                                    pending.low_trip_f,
                                    pending.high_trip_f,
                                )
                                .1
                        };
                        let _ = session.write_command(frame).await;
                        session
                            .inner
                            .state
                            .lock()
                            .unwrap()
                            .inventory
                            .hvac
                            .note_retry_sent(key, Instant::now());
                    }
                }
            }
        });

        let mut tasks = self.inner.tasks.lock().await;
        if let Some(old) = tasks.hvac_retry.insert(key, handle) {
            old.abort();
        }
    }

    pub fn hvac_capability(&self, table_id: u8, device_id: u8) -> HvacCapability {
        self.inner
            .state
            .lock()
            .unwrap()
            .inventory
            .hvac
            .capability_for((table_id, device_id))
    }

    /// Resolved function name for a device, once metadata has populated it.
    pub fn device_name(&self, table_id: u8, device_id: u8) -> Option<String> {
        self.inner
            .state
            .lock()
            .unwrap()
            .inventory
            .device_names
            .get(&(table_id, device_id))
            .cloned()
    }

    /// Most recently received `RvStatus` event, if any.
    pub fn rv_status(&self) -> Option<crate::event::RvStatus> {
        self.inner.state.lock().unwrap().inventory.rv_status
    }

    /// Current reconciled state of one HVAC zone, if any has been applied.
    pub fn hvac_zone(&self, table_id: u8, device_id: u8) -> Option<crate::event::HvacZone> {
        self.inner
            .state
            .lock()
            .unwrap()
            .inventory
            .hvac_zones
            .get(&(table_id, device_id))
            .copied()
    }

    /// Clears a system-wide lockout: writes `0x55` then, after 100 ms,
    /// `0xAA`. Prefers a raw write to `CAN_WRITE` if discovered during GATT
    /// enumeration, else COBS-encodes each byte to `DATA_WRITE`.
    /// Throttled to one invocation per 5 s.
    pub async fn clear_lockout(&self) -> Result<(), GatewayError> {
        {
            let mut st = self.inner.state.lock().unwrap();
            let now = Instant::now();
            if let Some(last) = st.last_lockout_clear {
                if now.duration_since(last) < LOCKOUT_THROTTLE {
                    return Ok(());
                }
            }
            st.last_lockout_clear = Some(now);
        }

        self.write_lockout_byte(0x55).await?;
        tokio::time::sleep(LOCKOUT_STEP_DELAY).await;
        self.write_lockout_byte(0xAA).await
    }

    async fn write_lockout_byte(&self, byte: u8) -> Result<(), GatewayError> {
        let can_write = self.inner.state.lock().unwrap().can_write;
        if let Some(id) = can_write {
            self.inner
                .transport
                .write_char(id, &[byte], false)
                .await
                .map_err(GatewayError::from)
        } else {
            let framed = cobs_encode(&[byte], CobsEncodeOptions::default());
            self.inner
                .transport
                .write_char(CharacteristicId::DataWrite, &framed, false)
                .await
                .map_err(GatewayError::from)
        }
    }

    /// Resets all per-table metadata state and requests metadata for every
    /// known table again (§4.9).
    pub async fn refresh_metadata(&self) -> Result<(), GatewayError> {
        let tables: Vec<u8> = {
            let mut st = self.inner.state.lock().unwrap();
            st.metadata.reset();
            let mut tables: Vec<u8> = st
                .inventory
                .device_names
                .keys()
                .map(|&(t, _)| t)
                .collect();
            if let Some(info) = &st.inventory.gateway_info {
                tables.push(info.table_id);
            }
            tables.sort_unstable();
            tables.dedup();
            tables
        };
        for table_id in tables {
            self.schedule_metadata_request(table_id, Duration::ZERO);
        }
        Ok(())
    }

    async fn run_heartbeat(&self) {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            if !matches!(self.auth_state(), AuthState::Authenticated) {
                return;
            }

            let stale = {
                let st = self.inner.state.lock().unwrap();
                Instant::now().duration_since(st.last_event_time) > STALE_EVENT_TIMEOUT
            };
            if stale {
                log::warn!("no events for over {STALE_EVENT_TIMEOUT:?}, forcing reconnect");
                let _ = self.inner.transport.disconnect().await;
                self.on_disconnected();
                return;
            }

            let table_id = self
                .inner
                .state
                .lock()
                .unwrap()
                .inventory
                .gateway_info
                .as_ref()
                .map(|g| g.table_id)
                .unwrap_or(0);
            let (_, frame) = self.inner.state.lock().unwrap().commands.build_get_devices(table_id);
            let _ = self.write_command(frame).await;
        }
    }

    fn set_auth(&self, state: AuthState) {
        self.inner.state.lock().unwrap().auth = state;
    }

    /// Explicit disconnect: cancels every timer and tears down transport.
    pub async fn disconnect(&self) -> Result<(), GatewayError> {
        self.cancel_timers().await;
        self.inner.transport.disconnect().await?;
        self.set_auth(AuthState::Disconnected);
        self.reset_transient_state();
        Ok(())
    }

    async fn cancel_timers(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if let Some(h) = tasks.heartbeat.take() {
            h.abort();
        }
        if let Some(h) = tasks.reconnect.take() {
            h.abort();
        }
        for (_, h) in tasks.hvac_retry.drain() {
            h.abort();
        }
    }

    fn reset_transient_state(&self) {
        let mut st = self.inner.state.lock().unwrap();
        st.decoder.reset();
        st.can_write = None;
        st.metadata.pending_metadata.clear();
    }

    /// Invoked by the transport on an unsolicited disconnect. Schedules a
    /// reconnect attempt with exponential backoff (§4.10).
    fn on_disconnected(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            session.reset_transient_state();
            session.set_auth(AuthState::Disconnected);

            let failures = session
                .inner
                .consecutive_failures
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let delay = reconnect_backoff(failures);

            let mut tasks = session.inner.tasks.lock().await;
            if let Some(old) = tasks.reconnect.take() {
                old.abort();
            }
            let retry_session = session.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if retry_session.inner.config.pairing_method == PairingMethod::Pin {
                    let n = retry_session
                        .inner
                        .consecutive_failures
                        .load(std::sync::atomic::Ordering::SeqCst);
                    if n != 0 && n.is_multiple_of(3) {
                        retry_session
                            .inner
                            .bonding
                            .remove_bond(&retry_session.inner.config.address)
                            .await;
                    }
                }
                let _ = retry_session.connect().await;
            });
            tasks.reconnect = Some(handle);
        });
    }
}
