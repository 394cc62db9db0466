//! Link-layer framing: encapsulate an IP packet into a frame, parse a frame
//! back into its payload, and locate a frame's sync field inside a packed
//! bit stream.
//!
//! Frame layout: `SYNC_BYTE × SYNC_LEN, length (big-endian u16), payload,
//! CRC-16-CCITT (big-endian u16)`. The CRC covers the length field and the
//! payload, not the sync field — a single-bit flip in the sync field is
//! therefore not detected by CRC, by design (§8 boundary behaviour).

use crate::crc::crc16_ccitt;
use crate::error::{AcousticIpError, Result};
use crate::{CRC_BYTES, FRAME_HEADER_LEN, MAX_FRAME_PAYLOAD, SYNC_BYTE, SYNC_LEN};

/// Encapsulates `payload` into a frame: `7E 7E len_hi len_lo payload… crc_hi
/// crc_lo`. Rejects payloads outside `1..=MAX_FRAME_PAYLOAD`.
pub fn encapsulate(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_FRAME_PAYLOAD {
        return Err(AcousticIpError::InvalidPayloadLength(payload.len()));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len() + CRC_BYTES);
    frame.extend_from_slice(&[SYNC_BYTE; SYNC_LEN]);
    let len = payload.len() as u16;
    frame.push((len >> 8) as u8);
    frame.push(len as u8);
    frame.extend_from_slice(payload);

    let crc = crc16_ccitt(&frame[SYNC_LEN..]);
    frame.push((crc >> 8) as u8);
    frame.push(crc as u8);

    Ok(frame)
}

/// Parses a complete frame (sync already verified by the caller's sync
/// search) and returns its payload. Fails on a bad length field, a frame
/// shorter than the length field promises, or a CRC mismatch. The sync
/// field itself is not re-checked here.
pub fn decapsulate(frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < FRAME_HEADER_LEN + CRC_BYTES {
        return Err(AcousticIpError::TruncatedFrame);
    }

    let len = ((frame[SYNC_LEN] as usize) << 8) | (frame[SYNC_LEN + 1] as usize);
    if len == 0 || len > MAX_FRAME_PAYLOAD {
        return Err(AcousticIpError::InvalidLengthField);
    }
    if frame.len() < FRAME_HEADER_LEN + len + CRC_BYTES {
        return Err(AcousticIpError::TruncatedFrame);
    }

    let crc_covered = &frame[SYNC_LEN..FRAME_HEADER_LEN + len];
    let computed = crc16_ccitt(crc_covered);
    let stored = ((frame[FRAME_HEADER_LEN + len] as u16) << 8)
        | frame[FRAME_HEADER_LEN + len + 1] as u16;
    if computed != stored {
        return Err(AcousticIpError::CrcMismatch);
    }

    Ok(frame[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec())
}

/// Searches `bits` (holding `bit_count` valid leading bits) for two
/// consecutive `SYNC_BYTE` bytes at any bit alignment, and returns the bit
/// index of the first hit. Returning a bit index rather than a byte index
/// matters: after acoustic transit, the first valid bit need not land on a
/// byte boundary in the receiver's buffer.
pub fn find_sync(bits: &[u8], bit_count: usize) -> Option<usize> {
    let need_bits = SYNC_LEN * 8;
    if bit_count < need_bits {
        return None;
    }

    'candidate: for start in 0..=(bit_count - need_bits) {
        for sync_byte_idx in 0..SYNC_LEN {
            let mut byte = 0u8;
            for b in 0..8 {
                let bit_idx = start + sync_byte_idx * 8 + b;
                let byte_in_bits = bits[bit_idx / 8];
                let bit = (byte_in_bits >> (7 - bit_idx % 8)) & 1;
                byte = (byte << 1) | bit;
            }
            if byte != SYNC_BYTE {
                continue 'candidate;
            }
        }
        return Some(start);
    }
    None
}
