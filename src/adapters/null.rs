//! Deterministic in-memory fake [`Transport`], used by the session's own
//! test suite and the end-to-end scenario tests in `tests/`. Not a real
//! BLE backend — see `DESIGN.md` for the intended production adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::{CharacteristicId, DisconnectCallback, NotifyCallback, Transport};

#[derive(Default)]
struct State {
    characteristics: HashMap<CharacteristicId, Vec<u8>>,
    last_write: HashMap<CharacteristicId, Vec<u8>>,
    write_history: HashMap<CharacteristicId, Vec<Vec<u8>>>,
    notify_subs: HashMap<CharacteristicId, Vec<NotifyCallback>>,
    on_disconnect: Option<DisconnectCallback>,
    unlock_after_key_write: bool,
    connected: bool,
    fail_connect: bool,
    adapter_count: usize,
}

/// A fake [`Transport`] backed entirely by in-memory state, for tests.
pub struct NullTransport {
    state: Mutex<State>,
}

impl NullTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                adapter_count: 1,
                ..State::default()
            }),
        }
    }

    pub async fn set_characteristic(&self, id: CharacteristicId, value: Vec<u8>) {
        self.state.lock().unwrap().characteristics.insert(id, value);
    }

    pub async fn last_write(&self, id: CharacteristicId) -> Option<Vec<u8>> {
        self.state.lock().unwrap().last_write.get(&id).cloned()
    }

    /// Every write ever made to `id`, in order, for assertions that care
    /// about how many times a command was sent rather than just the last
    /// one (e.g. metadata CRC gating's "no request issued on reconnect").
    pub async fn write_history(&self, id: CharacteristicId) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_history.get(&id).cloned().unwrap_or_default()
    }

    /// When set, writing to `Key` flips `UnlockStatus` to `"unlocked"`,
    /// simulating the gateway accepting the Step 1 key.
    pub async fn set_unlock_after_key_write(&self, enabled: bool) {
        self.state.lock().unwrap().unlock_after_key_write = enabled;
    }

    pub async fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub async fn set_adapter_count(&self, count: usize) {
        self.state.lock().unwrap().adapter_count = count;
    }

    /// Delivers `bytes` to every subscriber of `id`'s notifications as a
    /// single notification value, matching real GATT semantics: one
    /// callback invocation per notification, carrying whatever the
    /// peripheral packed into it. It is the subscriber's job (as
    /// [`crate::session::GatewaySession`] does for `DATA_READ`) to split a
    /// multi-byte payload into individual bytes for a stateful decoder.
    pub async fn notify(&self, id: CharacteristicId, bytes: &[u8]) {
        let state = self.state.lock().unwrap();
        if let Some(subs) = state.notify_subs.get(&id) {
            for cb in subs {
                cb(bytes.to_vec());
            }
        }
    }

    /// Simulates an unsolicited link-layer disconnect: marks the transport
    /// disconnected and invokes the callback `connect()` registered, the
    /// same way a real adapter would report a dropped BLE link.
    pub async fn trigger_disconnect(&self) {
        let cb = {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            state.on_disconnect.take()
        };
        if let Some(cb) = cb {
            cb();
        }
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn read_char(&self, id: CharacteristicId) -> Result<Vec<u8>, TransportError> {
        self.state
            .lock()
            .unwrap()
            .characteristics
            .get(&id)
            .cloned()
            .ok_or_else(|| TransportError::ReadFailed(format!("{id:?} not set")))
    }

    async fn write_char(
        &self,
        id: CharacteristicId,
        data: &[u8],
        _with_response: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.last_write.insert(id, data.to_vec());
        state.write_history.entry(id).or_default().push(data.to_vec());
        if id == CharacteristicId::Key && state.unlock_after_key_write {
            state
                .characteristics
                .insert(CharacteristicId::UnlockStatus, b"unlocked".to_vec());
        }
        Ok(())
    }

    async fn start_notify(
        &self,
        id: CharacteristicId,
        cb: NotifyCallback,
    ) -> Result<(), TransportError> {
        self.state.lock().unwrap().notify_subs.entry(id).or_default().push(cb);
        Ok(())
    }

    async fn connect(&self, on_disconnect: DisconnectCallback) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            return Err(TransportError::ConnectFailed("simulated failure".into()));
        }
        state.connected = true;
        state.on_disconnect = Some(on_disconnect);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state.lock().unwrap().connected = false;
        Ok(())
    }

    async fn enumerate_characteristics(&self) -> Result<Vec<CharacteristicId>, TransportError> {
        Ok(self.state.lock().unwrap().characteristics.keys().copied().collect())
    }

    async fn pair(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn adapter_count(&self) -> usize {
        self.state.lock().unwrap().adapter_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_unset_characteristic_fails() {
        let t = NullTransport::new();
        assert!(t.read_char(CharacteristicId::Seed).await.is_err());
    }

    #[tokio::test]
    async fn write_then_read_back_via_last_write() {
        let t = NullTransport::new();
        t.write_char(CharacteristicId::DataWrite, &[1, 2, 3], true)
            .await
            .unwrap();
        assert_eq!(
            t.last_write(CharacteristicId::DataWrite).await,
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn notify_delivers_one_callback_per_notification() {
        let t = NullTransport::new();
        let calls = std::sync::Arc::new(Mutex::new(Vec::new()));
        let c = calls.clone();
        t.start_notify(
            CharacteristicId::DataRead,
            Box::new(move |bytes| c.lock().unwrap().push(bytes)),
        )
        .await
        .unwrap();

        t.notify(CharacteristicId::DataRead, &[0xAA, 0xBB]).await;
        assert_eq!(*calls.lock().unwrap(), vec![vec![0xAA, 0xBB]]);
    }

    #[tokio::test]
    async fn connect_respects_fail_flag() {
        let t = NullTransport::new();
        t.set_fail_connect(true).await;
        assert!(t.connect(Box::new(|| {})).await.is_err());
    }

    #[tokio::test]
    async fn trigger_disconnect_invokes_registered_callback_once() {
        let t = NullTransport::new();
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let c = calls.clone();
        t.connect(Box::new(move || {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }))
        .await
        .unwrap();

        t.trigger_disconnect().await;
        t.trigger_disconnect().await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
