//! Acoustic IP modem core: carries IP packets across a speaker/microphone
//! link using continuous-phase binary FSK and a byte-oriented framer.
//!
//! No error correction, no retransmission, no security. The channel is a
//! best-effort datagram pipe; loss is expected and handled by discarding,
//! never by retrying.

pub mod bits;
pub mod crc;
pub mod error;
pub mod framing;
pub mod fsk;
pub mod pipeline;

pub use bits::{append, bits_to_bytes, bytes_to_bits, extract_bytes, remove_prefix};
pub use crc::crc16_ccitt;
pub use error::{AcousticIpError, Result};
pub use framing::{decapsulate, encapsulate, find_sync};
pub use fsk::{FskDemodulator, FskModulator};
pub use pipeline::{AudioSink, AudioSource, RxWorker, TunDevice, TxWorker};

/// Audio sample rate, Hz. Must match the sound device's configured rate;
/// FSK carrier frequencies must stay well below half of it.
pub const SAMPLE_RATE: usize = 44_100;

/// Samples read from / written to the sound device per blocking call.
pub const AUDIO_FRAMES_PER_BUFFER: usize = 1024;

/// Carrier frequency for bit 0, Hz.
pub const FSK_FREQ_0: f32 = 1200.0;

/// Carrier frequency for bit 1, Hz.
pub const FSK_FREQ_1: f32 = 2400.0;

/// Line rate, bits per second.
pub const BAUD_RATE: usize = 1200;

/// Samples per transmitted bit. Integer division of `SAMPLE_RATE / BAUD_RATE`
/// truncates 44100/1200 = 36.75 down to 36, which drifts 0.75 samples per bit
/// relative to a true 1200 baud clock. This is deliberate: it matches the
/// reference implementation exactly and is self-consistent end-to-end since
/// the same constant is used by both the modulator and the demodulator. Do
/// not "fix" this without also changing the wire behaviour it reproduces.
pub const SAMPLES_PER_BIT: usize = SAMPLE_RATE / BAUD_RATE;

/// Transmit amplitude, to avoid clipping after system mixing.
pub const TX_AMPLITUDE: f32 = 0.3;

/// Sync field byte value (HDLC-style flag), repeated `SYNC_LEN` times.
pub const SYNC_BYTE: u8 = 0x7E;

/// Number of sync bytes at the start of every frame.
pub const SYNC_LEN: usize = 2;

/// Length field width, bytes.
pub const LEN_FIELD_BYTES: usize = 2;

/// CRC field width, bytes.
pub const CRC_BYTES: usize = 2;

/// Sync + length, the part of the header before the payload.
pub const FRAME_HEADER_LEN: usize = SYNC_LEN + LEN_FIELD_BYTES;

/// Largest IP packet this link will carry, matching the TUN MTU.
pub const MAX_FRAME_PAYLOAD: usize = 1500;

/// Largest possible on-wire frame: header + payload + CRC.
pub const MAX_FRAME_LEN: usize = FRAME_HEADER_LEN + MAX_FRAME_PAYLOAD + CRC_BYTES;

/// Capacity of the receive-side resync buffer, in bytes of packed bits.
/// Must hold several frames' worth of bits so a slow sync search never
/// starves on a buffer that's too small to contain one full frame.
pub const RX_BIT_BUFFER_BYTES: usize = MAX_FRAME_LEN * 4;

/// Capacity of the receive-side resync buffer, in bits.
pub const RX_BIT_BUFFER_BITS: usize = RX_BIT_BUFFER_BYTES * 8;
