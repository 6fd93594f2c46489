//! Consistent Overhead Byte Stuffing framing with an optional trailing
//! CRC8, used on the `DATA_READ`/`DATA_WRITE` characteristics (C2).
//!
//! [`CobsDecoder`] is stateful and byte-at-a-time, built to be fed directly
//! from BLE notification callbacks. [`cobs_encode`] is a one-shot, pure
//! function used when building outbound frames.

use crate::crc8::{self, crc8_update};

/// Frame delimiter.
const FRAME_BYTE: u8 = 0x00;
/// Largest run of non-zero data bytes a single code block can describe.
const MAX_DATA_BYTES: u16 = 63;
/// Code value that, once consumed, stands for a single implicit zero byte.
const FRAME_BYTE_COUNT_LSB: u16 = 64;
/// Largest run of zero bytes a single compressed code block can describe.
const MAX_COMPRESSED_FRAME_BYTES: u16 = 192;
/// Decoder scratch buffer cap; frames larger than this are never produced
/// by the gateway, so this also bounds a single decode to O(1) memory.
const MAX_BUFFER: usize = 382;

/// Options for [`cobs_encode`].
#[derive(Debug, Clone, Copy)]
pub struct CobsEncodeOptions {
    pub prepend_start: bool,
    pub use_crc: bool,
}

impl Default for CobsEncodeOptions {
    fn default() -> Self {
        Self {
            prepend_start: true,
            use_crc: true,
        }
    }
}

/// Stateful byte-by-byte COBS decoder with optional CRC8 verification.
///
/// Frames with invalid CRC or broken framing are silently dropped: the
/// decoder resets and returns `None`, so it can never desynchronize on
/// arbitrary garbage bytes.
pub struct CobsDecoder {
    use_crc: bool,
    buf: Vec<u8>,
    code: i32,
}

impl CobsDecoder {
    pub fn new(use_crc: bool) -> Self {
        Self {
            use_crc,
            buf: Vec::with_capacity(MAX_BUFFER),
            code: 0,
        }
    }

    /// Discards any partially-decoded frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.code = 0;
    }

    /// Feeds a single byte. Returns `Some(payload)` once a complete,
    /// well-formed frame has been decoded.
    pub fn decode_byte(&mut self, b: u8) -> Option<Vec<u8>> {
        if b == FRAME_BYTE {
            if self.code != 0 {
                log::debug!("cobs: frame terminator mid-code-block, resetting");
                self.reset();
                return None;
            }
            // A zero-length buffer here is the leading start delimiter
            // (or two terminators back-to-back), not a real empty frame --
            // a genuine empty payload with CRC still carries the one CRC
            // byte, so `buf` is never actually empty for it.
            if self.buf.is_empty() {
                self.reset();
                return None;
            }

            if self.use_crc {
                let received = *self.buf.last().unwrap();
                let payload_len = self.buf.len() - 1;
                let calculated = crc8::crc8(&self.buf[..payload_len], crc8::INIT);
                if calculated != received {
                    log::debug!("cobs: CRC mismatch, dropping frame");
                    self.reset();
                    return None;
                }
                let result = self.buf[..payload_len].to_vec();
                self.reset();
                return Some(result);
            }

            let result = self.buf.clone();
            self.reset();
            return Some(result);
        }

        if self.code <= 0 {
            self.code = b as i32;
        } else {
            self.code -= 1;
            if self.buf.len() < MAX_BUFFER {
                self.buf.push(b);
            }
        }

        // Once a code block is fully consumed, `code`'s low bits encode how
        // many implicit zero bytes to insert before the next block starts.
        if (self.code as u32 & MAX_DATA_BYTES as u32) == 0 {
            while self.code > 0 {
                if self.buf.len() < MAX_BUFFER {
                    self.buf.push(FRAME_BYTE);
                }
                self.code -= FRAME_BYTE_COUNT_LSB as i32;
            }
        }

        None
    }
}

/// COBS-encodes `payload` according to `opts`, returning the full wire
/// frame (including the leading/trailing `0x00` delimiters).
///
/// Pure function: the same inputs always produce the same output (P3).
pub fn cobs_encode(payload: &[u8], opts: CobsEncodeOptions) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 63 + 4);

    if opts.prepend_start {
        out.push(FRAME_BYTE);
    }

    let src_len = payload.len();
    let total = src_len + if opts.use_crc { 1 } else { 0 };
    let mut crc_val = crc8::INIT;
    let mut src_idx = 0usize;

    let byte_at = |idx: usize, crc_val: u8| -> u8 {
        if idx < src_len {
            payload[idx]
        } else {
            crc_val
        }
    };

    while src_idx < total {
        let code_idx = out.len();
        out.push(0xFF); // placeholder, patched below
        let mut code: u16 = 0;

        // Run of non-zero bytes.
        while src_idx < total {
            let bval = byte_at(src_idx, crc_val);
            if bval == FRAME_BYTE {
                break;
            }
            if src_idx < src_len {
                crc_val = crc8_update(crc_val, bval);
            }
            src_idx += 1;
            out.push(bval);
            code += 1;
            if code >= MAX_DATA_BYTES {
                break;
            }
        }

        // Run of zero bytes, compressed into the code byte itself.
        while src_idx < total {
            let bval = byte_at(src_idx, crc_val);
            if bval != FRAME_BYTE {
                break;
            }
            if src_idx < src_len {
                crc_val = crc8_update(crc_val, FRAME_BYTE);
            }
            src_idx += 1;
            code += FRAME_BYTE_COUNT_LSB;
            if code >= MAX_COMPRESSED_FRAME_BYTES {
                break;
            }
        }

        out[code_idx] = (code & 0xFF) as u8;
    }

    out.push(FRAME_BYTE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut CobsDecoder, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes.iter().filter_map(|&b| decoder.decode_byte(b)).collect()
    }

    #[test]
    fn empty_frame_yields_no_payload() {
        let mut dec = CobsDecoder::new(true);
        assert_eq!(dec.decode_byte(0x00), None);
        assert_eq!(dec.decode_byte(0x00), None);
    }

    #[test]
    fn round_trips_with_crc() {
        let original = [0x07, 0x0C, 0x80, 0x1A, 0x00];
        let encoded = cobs_encode(&original, CobsEncodeOptions::default());

        let mut dec = CobsDecoder::new(true);
        let frames = decode_all(&mut dec, &encoded);
        assert_eq!(frames, vec![original.to_vec()]);
    }

    #[test]
    fn round_trips_without_crc() {
        let original = [0x01, 0x02, 0x03];
        let opts = CobsEncodeOptions {
            prepend_start: true,
            use_crc: false,
        };
        let encoded = cobs_encode(&original, opts);

        let mut dec = CobsDecoder::new(false);
        let frames = decode_all(&mut dec, &encoded);
        assert_eq!(frames, vec![original.to_vec()]);
    }

    #[test]
    fn handles_multiple_consecutive_frames() {
        let mut dec = CobsDecoder::new(true);
        let mut frames = Vec::new();
        for payload in [&[0x01, 0x02][..], &[0x03, 0x04][..], &[0x05, 0x06][..]] {
            let encoded = cobs_encode(payload, CobsEncodeOptions::default());
            frames.extend(decode_all(&mut dec, &encoded));
        }
        assert_eq!(
            frames,
            vec![vec![0x01, 0x02], vec![0x03, 0x04], vec![0x05, 0x06]]
        );
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut dec = CobsDecoder::new(true);
        dec.decode_byte(0x03);
        dec.decode_byte(0x01);
        dec.reset();

        let encoded = cobs_encode(&[0xAA], CobsEncodeOptions::default());
        let frames = decode_all(&mut dec, &encoded);
        assert_eq!(frames, vec![vec![0xAA]]);
    }

    #[test]
    fn corrupted_crc_is_dropped() {
        let original = [0x01, 0x02, 0x03];
        let mut encoded = cobs_encode(&original, CobsEncodeOptions::default());
        let mid = encoded.len() / 2;
        encoded[mid] ^= 0xFF;

        let mut dec = CobsDecoder::new(true);
        let frames = decode_all(&mut dec, &encoded);
        assert!(frames.is_empty());
    }

    #[test]
    fn encoder_frame_shape() {
        let encoded = cobs_encode(&[0x01], CobsEncodeOptions::default());
        assert_eq!(encoded[0], 0x00);
        assert_eq!(*encoded.last().unwrap(), 0x00);

        let encoded = cobs_encode(
            &[0x01],
            CobsEncodeOptions {
                prepend_start: false,
                use_crc: true,
            },
        );
        assert_ne!(encoded[0], 0x00);
        assert_eq!(*encoded.last().unwrap(), 0x00);

        // Empty payload with CRC still carries one code block for the lone
        // CRC byte (crc8 over zero bytes starting from INIT is just INIT).
        assert_eq!(
            cobs_encode(&[], CobsEncodeOptions::default()),
            vec![0x00, 0x01, crc8::INIT, 0x00]
        );
    }

    /// Indices of bytes in `encoded` (excluding the leading/trailing `0x00`
    /// delimiters) that the decoder treats as payload content rather than a
    /// COBS length-prefix byte, replaying the same run-length bookkeeping
    /// `CobsDecoder::decode_byte` uses.
    fn non_code_byte_positions(encoded: &[u8]) -> Vec<usize> {
        let mut positions = Vec::new();
        let mut code: i32 = 0;
        for (i, &b) in encoded.iter().enumerate().skip(1).take(encoded.len().saturating_sub(2)) {
            if code <= 0 {
                code = b as i32;
            } else {
                code -= 1;
                positions.push(i);
            }
            if (code as u32 & MAX_DATA_BYTES as u32) == 0 {
                while code > 0 {
                    code -= FRAME_BYTE_COUNT_LSB as i32;
                }
            }
        }
        positions
    }

    proptest::proptest! {
        // P1: decoding cobs_encode(b) byte-by-byte yields exactly b, with no
        // intermediate frame before the terminator.
        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..320)) {
            let encoded = cobs_encode(&payload, CobsEncodeOptions::default());
            let mut dec = CobsDecoder::new(true);
            let mut frames = Vec::new();
            for (i, &b) in encoded.iter().enumerate() {
                if let Some(f) = dec.decode_byte(b) {
                    // Only the final terminator byte may yield a frame.
                    assert_eq!(i, encoded.len() - 1);
                    frames.push(f);
                }
            }
            assert_eq!(frames, vec![payload]);
        }

        // P2: flipping any one bit in a data/CRC byte of the encoded frame
        // (as opposed to one of COBS's own length-prefix bytes) causes the
        // decoder to yield no frame. A length-prefix byte is excluded: COBS's
        // compressed-zero-run encoding means corrupting one can shift the
        // decoder's run-length bookkeeping by a multiple of 64 bytes without
        // otherwise touching the payload, which — combined with this CRC's
        // append-own-checksum-yields-zero residue property — can coincide
        // with a still-valid-looking frame. That's a framing-level edge
        // case, not a failure to detect payload corruption.
        #[test]
        fn prop_bit_flip_is_rejected(
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            flip_idx in 0usize..1000,
            flip_bit in 0u8..8,
        ) {
            let encoded = cobs_encode(&payload, CobsEncodeOptions::default());
            let data_positions = non_code_byte_positions(&encoded);
            if !data_positions.is_empty() {
                let idx = data_positions[flip_idx % data_positions.len()];
                let mut corrupted = encoded.clone();
                corrupted[idx] ^= 1 << flip_bit;
                if corrupted[idx] != 0x00 {
                    let mut dec = CobsDecoder::new(true);
                    let frames: Vec<Vec<u8>> =
                        corrupted.iter().filter_map(|&b| dec.decode_byte(b)).collect();
                    assert!(frames.is_empty());
                }
            }
        }

        // P3: cobs_encode is a pure function of its inputs.
        #[test]
        fn prop_encoder_is_deterministic(payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..320)) {
            let a = cobs_encode(&payload, CobsEncodeOptions::default());
            let b = cobs_encode(&payload, CobsEncodeOptions::default());
            assert_eq!(a, b);
        }
    }
}
