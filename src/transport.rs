//! External collaborators (§6): the abstract BLE transport and OS-level
//! bonding agent, plus the session's configuration surface.
//!
//! This crate owns none of the actual I/O. `Transport` is the seam a real
//! backend (e.g. a `btleplug` adapter, not shipped here — see DESIGN.md)
//! plugs into; [`crate::adapters::null`] provides a deterministic fake for
//! tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// The six BLE characteristics this protocol touches. Concrete UUIDs are a
/// transport-adapter concern and stay outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicId {
    UnlockStatus,
    Key,
    Seed,
    DataRead,
    DataWrite,
    CanWrite,
}

pub type NotifyCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;
pub type DisconnectCallback = Box<dyn Fn() + Send + Sync>;

/// Abstract BLE transport collaborator (§6 "Transport collaborator").
#[async_trait]
pub trait Transport: Send + Sync {
    async fn read_char(&self, id: CharacteristicId) -> Result<Vec<u8>, TransportError>;
    async fn write_char(
        &self,
        id: CharacteristicId,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError>;
    async fn start_notify(
        &self,
        id: CharacteristicId,
        cb: NotifyCallback,
    ) -> Result<(), TransportError>;
    async fn connect(&self, on_disconnect: DisconnectCallback) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
    async fn enumerate_characteristics(&self) -> Result<Vec<CharacteristicId>, TransportError>;
    async fn pair(&self) -> Result<(), TransportError>;
    /// Number of local adapters this transport can enumerate, for the
    /// multi-adapter reconnect fallback (§4.10). Backends with a single
    /// adapter (or none) return `1`.
    fn adapter_count(&self) -> usize {
        1
    }
}

/// Abstract OS-level pairing/bonding collaborator (§6 "Bonding-agent
/// collaborator"). On hosts without OS-level bonding, a no-op
/// implementation returning success is appropriate (§9 Design Notes).
#[async_trait]
pub trait BondingAgent: Send + Sync {
    async fn pair_pushbutton(&self, address: &str, timeout: Duration) -> bool;
    async fn pair_pin(&self, address: &str, pin: &str, timeout: Duration) -> bool;
    async fn remove_bond(&self, address: &str) -> bool;
}

/// No-op bonding agent for hosts without OS-level bonding support.
#[derive(Debug, Default)]
pub struct NullBondingAgent;

#[async_trait]
impl BondingAgent for NullBondingAgent {
    async fn pair_pushbutton(&self, _address: &str, _timeout: Duration) -> bool {
        true
    }

    async fn pair_pin(&self, _address: &str, _pin: &str, _timeout: Duration) -> bool {
        true
    }

    async fn remove_bond(&self, _address: &str) -> bool {
        true
    }
}

/// How the gateway expects to be bonded at the OS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMethod {
    PushButton,
    Pin,
}

/// Session configuration surface (§6 "Configuration surface").
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub address: String,
    pub gateway_pin: [u8; 6],
    pub bluetooth_pin: Option<[u8; 6]>,
    pub pairing_method: PairingMethod,
}

impl GatewayConfig {
    pub const DEFAULT_GATEWAY_PIN: [u8; 6] = *b"090336";

    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            gateway_pin: Self::DEFAULT_GATEWAY_PIN,
            bluetooth_pin: None,
            pairing_method: PairingMethod::PushButton,
        }
    }

    /// The Bluetooth-level PIN used during OS bonding, defaulting to the
    /// gateway PIN when not set separately.
    pub fn bluetooth_pin(&self) -> [u8; 6] {
        self.bluetooth_pin.unwrap_or(self.gateway_pin)
    }

    pub fn gateway_pin_str(&self) -> String {
        String::from_utf8_lossy(&self.gateway_pin).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bluetooth_pin_defaults_to_gateway_pin() {
        let cfg = GatewayConfig::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(cfg.bluetooth_pin(), cfg.gateway_pin);
        assert_eq!(cfg.gateway_pin, GatewayConfig::DEFAULT_GATEWAY_PIN);
    }

    #[test]
    fn explicit_bluetooth_pin_overrides_default() {
        let mut cfg = GatewayConfig::new("AA:BB:CC:DD:EE:FF");
        cfg.bluetooth_pin = Some(*b"111111");
        assert_eq!(cfg.bluetooth_pin(), *b"111111");
    }

    #[tokio::test]
    async fn null_bonding_agent_always_succeeds() {
        let agent = NullBondingAgent;
        assert!(agent.pair_pushbutton("addr", Duration::from_secs(1)).await);
        assert!(agent.pair_pin("addr", "123456", Duration::from_secs(1)).await);
        assert!(agent.remove_bond("addr").await);
    }
}
