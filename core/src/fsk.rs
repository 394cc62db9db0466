//! Continuous-phase binary FSK physical layer.
//!
//! Bit 0 is carried on a 1200 Hz tone, bit 1 on a 2400 Hz tone. Each
//! modulator instance keeps one phase accumulator per carrier so the
//! waveform stays continuous across bit boundaries of the same symbol — a
//! 0→1 transition starts the 1-carrier from wherever its own phase last
//! left off, not from the 0-carrier's end phase. The demodulator is a
//! deliberately crude, symbol-synchronous zero-crossing counter: it assumes
//! the caller's blocks line up with bit boundaries and makes no attempt at
//! timing recovery.

use crate::{FSK_FREQ_0, FSK_FREQ_1, SAMPLES_PER_BIT, SAMPLE_RATE, TX_AMPLITUDE};
use std::f64::consts::PI;

/// Stateful CPFSK modulator. One instance per transmit worker; the two
/// carrier phases are owned exclusively by it, so no synchronization is
/// needed on the handle itself.
pub struct FskModulator {
    phase0: f64,
    phase1: f64,
}

impl FskModulator {
    pub fn new() -> Self {
        Self { phase0: 0.0, phase1: 0.0 }
    }

    /// Modulates `nbits` bits (packed MSB-first in `bits`, starting at bit
    /// index 0) into exactly `nbits * SAMPLES_PER_BIT` audio samples.
    pub fn modulate(&mut self, bits: &[u8], nbits: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(nbits * SAMPLES_PER_BIT);
        for bit_idx in 0..nbits {
            let byte = bits[bit_idx / 8];
            let bit = (byte >> (7 - bit_idx % 8)) & 1;
            if bit == 1 {
                Self::gen_sine(FSK_FREQ_1, &mut self.phase1, &mut out);
            } else {
                Self::gen_sine(FSK_FREQ_0, &mut self.phase0, &mut out);
            }
        }
        out
    }

    fn gen_sine(freq: f32, phase: &mut f64, out: &mut Vec<f32>) {
        let step = 2.0 * PI * freq as f64 / SAMPLE_RATE as f64;
        for _ in 0..SAMPLES_PER_BIT {
            out.push((TX_AMPLITUDE as f64 * phase.sin()) as f32);
            *phase += step;
        }
        // Normalise into [0, 2π) to keep floating-point error from
        // accumulating across a long transmission.
        *phase = phase.rem_euclid(2.0 * PI);
    }
}

impl Default for FskModulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless (beyond a reserved, unused scratch slot) per-window bit
/// detector. Decisions are local to each `SAMPLES_PER_BIT` window: count
/// zero crossings and compare against `window_len / 4`. The 2400 Hz carrier
/// crosses zero roughly twice as often as the 1200 Hz carrier in the same
/// window, so this simple midpoint threshold separates the two populations
/// with no training, no averaging, and no adaptation.
pub struct FskDemodulator {
    // Reserved for a residual-sample carry across calls, to support callers
    // whose blocks don't land on bit boundaries. Not used: the pipeline
    // guarantees (approximately) aligned blocks, and the spec this follows
    // does not exercise this path either.
    #[allow(dead_code)]
    residual: Vec<f32>,
}

impl FskDemodulator {
    pub fn new() -> Self {
        Self { residual: Vec::new() }
    }

    /// Consumes `samples` in non-overlapping `SAMPLES_PER_BIT` windows,
    /// writing one decided bit per window into `bits_out` (packed MSB-first)
    /// until either the remaining tail is shorter than a window or
    /// `max_bits` decisions have been written. Returns the number of bits
    /// written. If `samples.len() < SAMPLES_PER_BIT`, returns 0.
    pub fn demodulate(&mut self, samples: &[f32], bits_out: &mut [u8], max_bits: usize) -> usize {
        if samples.len() < SAMPLES_PER_BIT || max_bits == 0 {
            return 0;
        }

        let mut nbits = 0;
        let mut pos = 0;
        while pos + SAMPLES_PER_BIT <= samples.len() && nbits < max_bits {
            let bit = Self::decide_bit(&samples[pos..pos + SAMPLES_PER_BIT]);
            let byte_idx = nbits / 8;
            let bit_in_byte = 7 - nbits % 8;
            if bit {
                bits_out[byte_idx] |= 1 << bit_in_byte;
            } else {
                bits_out[byte_idx] &= !(1 << bit_in_byte);
            }
            nbits += 1;
            pos += SAMPLES_PER_BIT;
        }
        nbits
    }

    fn decide_bit(window: &[f32]) -> bool {
        let mut crossings = 0usize;
        let mut avg_abs = 0.0f32;
        for i in 1..window.len() {
            if (window[i - 1] >= 0.0) != (window[i] >= 0.0) {
                crossings += 1;
            }
            avg_abs += window[i].abs();
        }
        // Computed for diagnostic purposes only; it does not affect the
        // decision (per spec: the crude zero-crossing threshold alone
        // separates the two carrier populations).
        let _mean_abs = avg_abs / window.len() as f32;
        crossings > window.len() / 4
    }
}

impl Default for FskDemodulator {
    fn default() -> Self {
        Self::new()
    }
}
