//! The duplex pipeline: a transmit worker (TUN → frame → bits → audio) and
//! a receive worker (audio → bits → frame → TUN), each an independent loop
//! over a small trait pair so the state machine can be exercised with
//! in-memory fakes instead of a real TUN device and sound card.
//!
//! Per-packet order is preserved within each worker; there is no ordering
//! relation between the two directions. Shutdown is cooperative: both
//! workers poll a shared `AtomicBool` and exit at their next loop head or
//! between audio chunks.

use crate::bits::{append, bytes_to_bits, extract_bytes, remove_prefix};
use crate::framing::{decapsulate, encapsulate, find_sync};
use crate::fsk::{FskDemodulator, FskModulator};
use crate::{
    AUDIO_FRAMES_PER_BUFFER, CRC_BYTES, FRAME_HEADER_LEN, MAX_FRAME_LEN, MAX_FRAME_PAYLOAD,
    RX_BIT_BUFFER_BITS, RX_BIT_BUFFER_BYTES, SYNC_LEN,
};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};

/// A blocking, packet-oriented virtual network interface: one IP packet per
/// `read_packet`/`write_packet` call.
pub trait TunDevice {
    fn read_packet(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn write_packet(&mut self, buf: &[u8]) -> std::io::Result<usize>;
}

/// A blocking, monaural sample source (the microphone side of the audio
/// device).
pub trait AudioSource {
    fn read(&mut self, buf: &mut [f32]) -> std::io::Result<usize>;
}

/// A blocking, monaural sample sink (the speaker side of the audio device).
pub trait AudioSink {
    fn write(&mut self, buf: &[f32]) -> std::io::Result<()>;
}

/// Transmit worker: reads IP packets from TUN, encapsulates, modulates, and
/// writes audio in bounded chunks so the termination flag gets a chance to
/// take effect between writes.
pub struct TxWorker<T, S> {
    tun: T,
    sink: S,
    modulator: FskModulator,
    ip_buf: Vec<u8>,
}

impl<T: TunDevice, S: AudioSink> TxWorker<T, S> {
    pub fn new(tun: T, sink: S) -> Self {
        Self {
            tun,
            sink,
            modulator: FskModulator::new(),
            ip_buf: vec![0u8; MAX_FRAME_PAYLOAD],
        }
    }

    /// Runs until `running` is cleared. A TUN read failure or an
    /// encapsulation rejection (e.g. an oversize packet) is silently
    /// dropped and the loop continues.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            self.step(running);
        }
    }

    /// One iteration of the transmit loop; exposed separately so tests can
    /// drive the state machine deterministically.
    pub fn step(&mut self, running: &AtomicBool) {
        let n = match self.tun.read_packet(&mut self.ip_buf) {
            Ok(n) if n > 0 => n,
            Ok(_) => return,
            Err(err) => {
                trace!("tx: tun read failed: {err}");
                return;
            }
        };

        let frame = match encapsulate(&self.ip_buf[..n]) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("tx: encapsulation rejected {n}-byte packet: {err}");
                return;
            }
        };

        let (frame_bits, frame_nbits) = bytes_to_bits(&frame);
        let samples = self.modulator.modulate(&frame_bits, frame_nbits);

        for chunk in samples.chunks(AUDIO_FRAMES_PER_BUFFER) {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            if let Err(err) = self.sink.write(chunk) {
                warn!("tx: audio write failed, dropping rest of frame: {err}");
                break;
            }
        }
    }
}

/// Fixed-capacity packed-bit resync buffer. Holds the bits demodulated so
/// far that haven't yet been consumed by a located frame. When appending
/// would overflow capacity, the oldest half is discarded first — a lossy
/// back-pressure policy that may truncate a partially-received frame, which
/// is an accepted trade-off on a best-effort channel.
struct RxBitBuffer {
    data: Vec<u8>,
    bit_count: usize,
}

impl RxBitBuffer {
    fn new() -> Self {
        Self { data: vec![0u8; RX_BIT_BUFFER_BYTES], bit_count: 0 }
    }

    fn append_bits(&mut self, bits: &[u8], n: usize) {
        if self.bit_count + n > RX_BIT_BUFFER_BITS {
            let half = self.bit_count / 2;
            remove_prefix(&mut self.data, &mut self.bit_count, 0, half);
        }
        self.bit_count = append(&mut self.data, self.bit_count, bits, n);
    }

    /// Discards everything from the start of the buffer up to bit `upto`,
    /// inclusive of any bits before it that were never part of a located
    /// frame. This is always relative to bit 0: the receive worker never
    /// needs to preserve a prefix once it has decided to move past it.
    fn discard_through(&mut self, upto: usize) {
        remove_prefix(&mut self.data, &mut self.bit_count, 0, upto);
    }
}

/// Receive worker: demodulates audio into the resync buffer, searches for
/// sync, and on a complete valid-length candidate decapsulates and delivers
/// to TUN. All link-layer failures (no sync, bad length, CRC mismatch,
/// short frame, TUN write error) are logged at most and recovered from by
/// advancing the bit buffer — nothing is retried.
pub struct RxWorker<T, A> {
    tun: T,
    source: A,
    demodulator: FskDemodulator,
    rx_buf: RxBitBuffer,
    audio_buf: Vec<f32>,
    demod_buf: Vec<u8>,
    frame_buf: Vec<u8>,
}

impl<T: TunDevice, A: AudioSource> RxWorker<T, A> {
    pub fn new(tun: T, source: A) -> Self {
        Self {
            tun,
            source,
            demodulator: FskDemodulator::new(),
            rx_buf: RxBitBuffer::new(),
            audio_buf: vec![0f32; AUDIO_FRAMES_PER_BUFFER],
            demod_buf: vec![0u8; RX_BIT_BUFFER_BYTES],
            frame_buf: vec![0u8; MAX_FRAME_LEN],
        }
    }

    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            self.step();
        }
    }

    /// One iteration of the receive loop; exposed separately so tests can
    /// drive the state machine deterministically.
    pub fn step(&mut self) {
        let nread = match self.source.read(&mut self.audio_buf) {
            Ok(n) if n > 0 => n,
            Ok(_) => return,
            Err(err) => {
                trace!("rx: audio read failed: {err}");
                return;
            }
        };

        let nbits =
            self.demodulator.demodulate(&self.audio_buf[..nread], &mut self.demod_buf, RX_BIT_BUFFER_BITS);
        if nbits == 0 {
            return;
        }
        self.rx_buf.append_bits(&self.demod_buf, nbits);

        let sync_pos = match find_sync(&self.rx_buf.data, self.rx_buf.bit_count) {
            Some(pos) => pos,
            None => return, // searching
        };

        if sync_pos + FRAME_HEADER_LEN * 8 > self.rx_buf.bit_count {
            return; // header-pending: wait for more audio
        }

        extract_bytes(&self.rx_buf.data, sync_pos, FRAME_HEADER_LEN, &mut self.frame_buf);
        let len = ((self.frame_buf[SYNC_LEN] as usize) << 8) | self.frame_buf[SYNC_LEN + 1] as usize;
        if len == 0 || len > MAX_FRAME_PAYLOAD {
            trace!("rx: invalid length field at sync {sync_pos}, skipping past sync");
            self.rx_buf.discard_through(sync_pos + SYNC_LEN * 8);
            return;
        }

        let frame_len_bits = (FRAME_HEADER_LEN + len + CRC_BYTES) * 8;
        if sync_pos + frame_len_bits > self.rx_buf.bit_count {
            return; // body-pending: wait for more audio, don't consume
        }

        let frame_len_bytes = FRAME_HEADER_LEN + len + CRC_BYTES;
        extract_bytes(&self.rx_buf.data, sync_pos, frame_len_bytes, &mut self.frame_buf);
        match decapsulate(&self.frame_buf[..frame_len_bytes]) {
            Ok(payload) => {
                if let Err(err) = self.tun.write_packet(&payload) {
                    warn!("rx: tun write failed: {err}");
                }
            }
            Err(err) => {
                trace!("rx: frame at sync {sync_pos} rejected: {err}");
            }
        }

        self.rx_buf.discard_through(sync_pos + frame_len_bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16_ccitt;
    use std::collections::VecDeque;
    use std::io;

    struct VecTun {
        to_send: VecDeque<Vec<u8>>,
        received: Vec<Vec<u8>>,
    }

    impl VecTun {
        fn with_outbound(packets: Vec<Vec<u8>>) -> Self {
            Self { to_send: packets.into(), received: Vec::new() }
        }

        fn sink_only() -> Self {
            Self { to_send: VecDeque::new(), received: Vec::new() }
        }
    }

    impl TunDevice for VecTun {
        fn read_packet(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.to_send.pop_front() {
                Some(pkt) => {
                    buf[..pkt.len()].copy_from_slice(&pkt);
                    Ok(pkt.len())
                }
                None => Ok(0),
            }
        }

        fn write_packet(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.received.push(buf.to_vec());
            Ok(buf.len())
        }
    }

    struct VecSink {
        samples: Vec<f32>,
    }

    impl AudioSink for VecSink {
        fn write(&mut self, buf: &[f32]) -> io::Result<()> {
            self.samples.extend_from_slice(buf);
            Ok(())
        }
    }

    struct VecSource {
        samples: Vec<f32>,
        pos: usize,
    }

    impl VecSource {
        fn new(samples: Vec<f32>) -> Self {
            Self { samples, pos: 0 }
        }
    }

    impl AudioSource for VecSource {
        fn read(&mut self, buf: &mut [f32]) -> io::Result<usize> {
            let remaining = self.samples.len() - self.pos;
            if remaining == 0 {
                return Ok(0);
            }
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn tx_worker_modulates_one_packet_per_step() {
        let running = AtomicBool::new(true);
        let packet = vec![0xAAu8; 10];
        let tun = VecTun::with_outbound(vec![packet.clone()]);
        let sink = VecSink { samples: Vec::new() };
        let mut worker = TxWorker::new(tun, sink);

        worker.step(&running);

        let frame = encapsulate(&packet).unwrap();
        let (frame_bits, frame_nbits) = bytes_to_bits(&frame);
        let mut expected_modulator = FskModulator::new();
        let expected = expected_modulator.modulate(&frame_bits, frame_nbits);

        assert_eq!(worker.sink.samples, expected);
    }

    #[test]
    fn tx_worker_drops_oversize_packet_and_keeps_running() {
        let running = AtomicBool::new(true);
        let oversize = vec![0u8; 1501];
        let tun = VecTun::with_outbound(vec![oversize]);
        let sink = VecSink { samples: Vec::new() };
        let mut worker = TxWorker::new(tun, sink);

        worker.step(&running);

        assert!(worker.sink.samples.is_empty());
    }

    fn run_rx_until_drained(worker: &mut RxWorker<VecTun, VecSource>, max_steps: usize) {
        for _ in 0..max_steps {
            worker.step();
        }
    }

    #[test]
    fn end_to_end_round_trip_through_modem_and_framer() {
        let running = AtomicBool::new(true);
        let payload = vec![0x42u8; 100];

        let tx_tun = VecTun::with_outbound(vec![payload.clone()]);
        let sink = VecSink { samples: Vec::new() };
        let mut tx = TxWorker::new(tx_tun, sink);
        tx.step(&running);

        let rx_tun = VecTun::sink_only();
        let source = VecSource::new(tx.sink.samples.clone());
        let mut rx = RxWorker::new(rx_tun, source);

        let steps = tx.sink.samples.len() / AUDIO_FRAMES_PER_BUFFER + 2;
        run_rx_until_drained(&mut rx, steps);

        assert_eq!(rx.tun.received, vec![payload]);
    }

    #[test]
    fn spurious_sync_eventually_recovers_the_real_frame() {
        // A bogus candidate frame (valid sync + valid length, wrong CRC)
        // precedes the real frame in the bit stream. The receiver must
        // lock onto the bogus one first, fail its CRC, discard exactly
        // that many bits, and then find and deliver the real frame.
        let mut spurious = vec![0x7Eu8, 0x7E, 0x00, 0x03, 0xDE, 0xAD, 0xBE, 0xFF, 0xFF];
        // Corrupt the trailing "CRC" so it provably doesn't match.
        let real_crc = crc16_ccitt(&spurious[2..7]);
        spurious[7] = !((real_crc >> 8) as u8);
        spurious[8] = !(real_crc as u8);

        let payload = b"hello over sound".to_vec();
        let real_frame = encapsulate(&payload).unwrap();

        let mut wire = spurious;
        wire.extend_from_slice(&real_frame);
        let (wire_bits, wire_nbits) = bytes_to_bits(&wire);

        let mut modulator = FskModulator::new();
        let samples = modulator.modulate(&wire_bits, wire_nbits);

        let tun = VecTun::sink_only();
        let source = VecSource::new(samples.clone());
        let mut rx = RxWorker::new(tun, source);

        let steps = samples.len() / AUDIO_FRAMES_PER_BUFFER + 2;
        run_rx_until_drained(&mut rx, steps);

        assert_eq!(rx.tun.received, vec![payload]);
    }

    #[test]
    fn rx_buffer_discards_oldest_half_on_overflow() {
        let mut buf = RxBitBuffer::new();
        // Fill to just under capacity with an arbitrary repeating pattern.
        let filler_len = RX_BIT_BUFFER_BITS - 8;
        let filler_bytes = vec![0b1010_1010u8; filler_len.div_ceil(8)];
        buf.append_bits(&filler_bytes, filler_len);
        assert_eq!(buf.bit_count, filler_len);

        // Appending more than the remaining headroom forces a discard of
        // the oldest half before the new bits land.
        let extra = vec![0xFFu8; 2];
        buf.append_bits(&extra, 16);

        assert_eq!(buf.bit_count, filler_len / 2 + 16);
    }

    #[test]
    fn header_pending_state_does_not_consume_bits() {
        // Sync plus only 1 byte of the length field: not enough to read
        // the length, so the worker must wait without consuming.
        let tun = VecTun::sink_only();
        let partial = vec![0x7Eu8, 0x7E, 0x00];
        let (bits, nbits) = bytes_to_bits(&partial);
        let source = VecSource::new({
            let mut m = FskModulator::new();
            m.modulate(&bits, nbits)
        });
        let mut rx = RxWorker::new(tun, source);

        let steps = AUDIO_FRAMES_PER_BUFFER.div_ceil(crate::SAMPLES_PER_BIT) + 1;
        for _ in 0..steps {
            rx.step();
        }

        assert!(rx.rx_buf.bit_count > 0, "header-pending bits must remain buffered");
        assert!(rx.tun.received.is_empty());
    }
}
