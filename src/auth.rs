//! Authentication state machine (C7): the two-step challenge/response
//! handshake against the gateway's Auth and Data services.
//!
//! This supersedes the notion of a connection state implicit in method
//! calls the way a Link Layer connection object might track it; here it is
//! an explicit named-state machine, generalized over the abstract
//! [`crate::transport::Transport`] collaborator the way a hardware trait
//! is threaded through a pluggable driver.

use std::time::Duration;

use crate::error::AuthFailure;
use crate::tea::{calculate_step1_key, calculate_step2_key};
use crate::transport::{CharacteristicId, Transport};

/// How long to wait after writing the Step 1 key before re-reading
/// `UNLOCK_STATUS` to verify the unlock took effect.
pub const UNLOCK_VERIFY_DELAY: Duration = Duration::from_millis(500);

/// Named states of the authentication handshake (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Disconnected,
    Connecting,
    Unlocking,
    Unlocked,
    AwaitingSeed,
    Authenticated,
    Failed(AuthFailureKind),
}

/// `AuthFailure` without the `Transport` variant's non-`Eq` payload, for
/// state comparisons; the full error still propagates via `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    NotReady,
    VerifyFailed,
    UnexpectedLength,
    Transport,
}

const UNLOCKED_MARKER: &[u8] = b"unlocked";

fn is_unlocked(value: &[u8]) -> bool {
    value
        .windows(UNLOCKED_MARKER.len())
        .any(|w| w.eq_ignore_ascii_case(UNLOCKED_MARKER))
}

/// Runs Step 1 (Data Service challenge/response) against `transport`.
///
/// Reads the 4-byte `UNLOCK_STATUS` characteristic; if already unlocked,
/// returns immediately. Otherwise computes and writes the Step 1 key, waits
/// [`UNLOCK_VERIFY_DELAY`], and re-reads to verify.
pub async fn run_step1<T: Transport + ?Sized>(transport: &T) -> Result<(), AuthFailure> {
    let challenge = transport.read_char(CharacteristicId::UnlockStatus).await?;

    if is_unlocked(&challenge) {
        return Ok(());
    }
    if challenge.len() != 4 {
        return Err(AuthFailure::UnexpectedLength {
            expected: 4,
            actual: challenge.len(),
        });
    }
    if challenge.iter().all(|&b| b == 0) {
        return Err(AuthFailure::NotReady);
    }

    let key = calculate_step1_key([challenge[0], challenge[1], challenge[2], challenge[3]]);
    transport
        .write_char(CharacteristicId::Key, &key, true)
        .await?;

    tokio::time::sleep(UNLOCK_VERIFY_DELAY).await;

    let verify = transport.read_char(CharacteristicId::UnlockStatus).await?;
    if is_unlocked(&verify) {
        Ok(())
    } else {
        Err(AuthFailure::VerifyFailed)
    }
}

/// Runs Step 2 (Auth Service challenge/response) given a 4-byte `SEED`
/// notification payload and the configured gateway PIN.
pub async fn run_step2<T: Transport + ?Sized>(
    transport: &T,
    seed: &[u8],
    pin: &str,
) -> Result<(), AuthFailure> {
    if seed.len() != 4 {
        return Err(AuthFailure::UnexpectedLength {
            expected: 4,
            actual: seed.len(),
        });
    }
    let key = calculate_step2_key([seed[0], seed[1], seed[2], seed[3]], pin);
    transport
        .write_char(CharacteristicId::Key, &key, true)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::null::NullTransport;

    #[test]
    fn unlocked_marker_is_case_insensitive_and_substring() {
        assert!(is_unlocked(b"unlocked"));
        assert!(is_unlocked(b"UNLOCKED"));
        assert!(!is_unlocked(b"locked"));
    }

    #[tokio::test]
    async fn step1_short_circuits_when_already_unlocked() {
        let transport = NullTransport::new();
        transport
            .set_characteristic(CharacteristicId::UnlockStatus, b"unlk".to_vec())
            .await;
        // "unlk" isn't literally "unlocked" but exactly 4 bytes and not the
        // all-zero sentinel, so it proceeds to the write+verify path;
        // exercise the true short-circuit instead with an 8-byte value.
        transport
            .set_characteristic(CharacteristicId::UnlockStatus, b"unlocked".to_vec())
            .await;
        assert!(run_step1(&transport).await.is_ok());
    }

    #[tokio::test]
    async fn step1_rejects_all_zero_challenge() {
        let transport = NullTransport::new();
        transport
            .set_characteristic(CharacteristicId::UnlockStatus, vec![0, 0, 0, 0])
            .await;
        let err = run_step1(&transport).await.unwrap_err();
        assert!(matches!(err, AuthFailure::NotReady));
    }

    #[tokio::test]
    async fn step1_verifies_after_writing_key() {
        let transport = NullTransport::new();
        transport
            .set_characteristic(CharacteristicId::UnlockStatus, vec![0x12, 0x34, 0x56, 0x78])
            .await;
        transport.set_unlock_after_key_write(true).await;

        assert!(run_step1(&transport).await.is_ok());
        let written = transport.last_write(CharacteristicId::Key).await.unwrap();
        let expected = calculate_step1_key([0x12, 0x34, 0x56, 0x78]);
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn step2_writes_pin_embedded_key() {
        let transport = NullTransport::new();
        run_step2(&transport, &[0x78, 0x56, 0x34, 0x12], "090336")
            .await
            .unwrap();
        let written = transport.last_write(CharacteristicId::Key).await.unwrap();
        assert_eq!(&written[4..10], b"090336");
    }
}
