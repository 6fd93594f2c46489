//! Advertisement parser (C15): gateway capability bits carried in
//! Lippert's manufacturer-specific data, visible before any connection
//! exists.

use crate::transport::PairingMethod;

/// Lippert Components' Bluetooth SIG company identifier.
pub const LIPPERT_MANUFACTURER_ID: u16 = 0x0499;

/// Capabilities decoded from a gateway's advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayCapabilities {
    pub pairing_method: PairingMethod,
    pub supports_push_to_pair: bool,
    /// `true` while the gateway's physical Connect button is pressed.
    pub pairing_enabled: bool,
}

/// Parses Lippert manufacturer-specific data (`manufacturer_id ==
/// LIPPERT_MANUFACTURER_ID`) into [`GatewayCapabilities`].
///
/// The first payload byte is the `PairingInfo` bitfield: bit 0 signals a
/// push-to-pair button on the bus, bit 1 signals the button is currently
/// pressed. Absent or empty data defaults to push-button pairing, the
/// newer-gateway assumption.
pub fn parse_advertisement(manufacturer_data: Option<(u16, &[u8])>) -> GatewayCapabilities {
    let Some((LIPPERT_MANUFACTURER_ID, data)) = manufacturer_data else {
        return GatewayCapabilities {
            pairing_method: PairingMethod::PushButton,
            supports_push_to_pair: true,
            pairing_enabled: false,
        };
    };

    let Some(&pairing_info) = data.first() else {
        return GatewayCapabilities {
            pairing_method: PairingMethod::PushButton,
            supports_push_to_pair: true,
            pairing_enabled: false,
        };
    };

    let has_push_button = pairing_info & 0x01 != 0;
    let pairing_active = pairing_info & 0x02 != 0;

    GatewayCapabilities {
        pairing_method: if has_push_button {
            PairingMethod::PushButton
        } else {
            PairingMethod::Pin
        },
        supports_push_to_pair: has_push_button,
        pairing_enabled: pairing_active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_defaults_to_push_button() {
        let caps = parse_advertisement(None);
        assert_eq!(caps.pairing_method, PairingMethod::PushButton);
        assert!(caps.supports_push_to_pair);
        assert!(!caps.pairing_enabled);
    }

    #[test]
    fn pin_only_gateway_decodes_as_pin() {
        let caps = parse_advertisement(Some((LIPPERT_MANUFACTURER_ID, &[0x00])));
        assert_eq!(caps.pairing_method, PairingMethod::Pin);
        assert!(!caps.supports_push_to_pair);
    }

    #[test]
    fn push_button_pressed_sets_pairing_enabled() {
        let caps = parse_advertisement(Some((LIPPERT_MANUFACTURER_ID, &[0x03])));
        assert_eq!(caps.pairing_method, PairingMethod::PushButton);
        assert!(caps.pairing_enabled);
    }

    #[test]
    fn other_manufacturer_id_is_ignored() {
        let caps = parse_advertisement(Some((0x1234, &[0x00])));
        assert_eq!(caps.pairing_method, PairingMethod::PushButton);
    }
}
