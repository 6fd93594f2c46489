//! A driver for the Lippert MyRvLink gateway's proprietary BLE protocol.
//!
//! The gateway exposes a handful of GATT characteristics carrying a
//! COBS-framed, CRC8-checked byte stream. Once authenticated via a
//! two-step TEA challenge/response, the stream carries status events for
//! every device on the RV's network (relays, dimmable/RGB lighting, HVAC
//! zones, tanks, generators, and more) and accepts a small set of action
//! commands back.
//!
//! [`transport::Transport`] and [`transport::BondingAgent`] are the seams
//! a real BLE backend plugs into; this crate does not talk to hardware
//! itself. [`session::GatewaySession`] ties everything together: the
//! auth state machine, the COBS decoder, the device inventory, and the
//! reconnect supervisor.

pub mod adapters;
pub mod advertisement;
pub mod auth;
pub mod bytes;
pub mod cobs;
pub mod command;
pub mod crc8;
pub mod error;
pub mod event;
pub mod hvac;
pub mod inventory;
pub mod metadata;
pub mod registry;
pub mod session;
mod tea;
pub mod transport;

pub use error::GatewayError;
pub use session::GatewaySession;
