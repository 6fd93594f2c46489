//! Transport adapters (C14).
//!
//! The BLE transport/pairing shim itself is an external collaborator
//! (spec.md §1 "out of scope"); this crate carries only the trait seam
//! (§[`crate::transport`]) and one reference fake for tests. A production
//! adapter (e.g. over `btleplug`) is deliberately not shipped here — see
//! DESIGN.md.

pub mod null;
