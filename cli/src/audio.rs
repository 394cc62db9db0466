//! Duplex sound-card adapter: bridges cpal's callback-driven input/output
//! streams into the blocking read/write contract `acoustic_ip_core`'s
//! `AudioSource`/`AudioSink` traits require, via an `rb` ring buffer on each
//! direction. The audio callbacks themselves never block; blocking happens
//! only on the worker threads that call `read`/`write`.

use acoustic_ip_core::{AcousticIpError, AudioSink, AudioSource, Result, SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, warn};
use rb::{RbConsumer, RbProducer, SpscRb, RB};

const RING_CAPACITY_SAMPLES: usize = 16 * 1024;

/// Opens the default input device's microphone stream and exposes it as a
/// blocking mono `f32` sample source at [`SAMPLE_RATE`].
///
/// `cpal::Stream` is not `Send` on every backend, so it is handed back
/// separately from the adapter: the caller keeps it alive on whichever
/// thread opened it (typically `main`) for as long as samples should keep
/// flowing, while the `Send`-safe ring-buffer consumer is the only part
/// that travels to the worker thread.
pub struct CpalAudioSource {
    consumer: rb::Consumer<f32>,
}

impl CpalAudioSource {
    pub fn open() -> Result<(Self, cpal::Stream)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AcousticIpError::DeviceOpen("no default input device".into()))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE as u32),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = SpscRb::<f32>::new(RING_CAPACITY_SAMPLES);
        let (producer, consumer) = (ring.producer(), ring.consumer());

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Best-effort: if the ring is full the oldest unread
                    // samples are simply dropped, matching the receive
                    // pipeline's own "never block on a full buffer" policy.
                    let _ = producer.write(data);
                },
                |err| error!("input stream error: {err}"),
            )
            .map_err(|err| AcousticIpError::DeviceOpen(format!("build input stream: {err}")))?;

        stream
            .play()
            .map_err(|err| AcousticIpError::DeviceOpen(format!("play input stream: {err}")))?;

        Ok((Self { consumer }, stream))
    }
}

impl AudioSource for CpalAudioSource {
    fn read(&mut self, buf: &mut [f32]) -> std::io::Result<usize> {
        match self.consumer.read_blocking(buf) {
            Some(n) => Ok(n),
            None => Ok(0), // producer dropped: stream closed
        }
    }
}

/// Opens the default output device's speaker stream and exposes it as a
/// blocking mono `f32` sample sink at [`SAMPLE_RATE`]. See
/// [`CpalAudioSource::open`] for why the `cpal::Stream` is returned
/// separately.
pub struct CpalAudioSink {
    producer: rb::Producer<f32>,
}

impl CpalAudioSink {
    pub fn open() -> Result<(Self, cpal::Stream)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AcousticIpError::DeviceOpen("no default output device".into()))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE as u32),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = SpscRb::<f32>::new(RING_CAPACITY_SAMPLES);
        let (producer, consumer) = (ring.producer(), ring.consumer());

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let written = consumer.read(data).unwrap_or(0);
                    data[written..].iter_mut().for_each(|s| *s = 0.0);
                },
                |err| error!("output stream error: {err}"),
            )
            .map_err(|err| AcousticIpError::DeviceOpen(format!("build output stream: {err}")))?;

        stream
            .play()
            .map_err(|err| AcousticIpError::DeviceOpen(format!("play output stream: {err}")))?;

        Ok((Self { producer }, stream))
    }
}

impl AudioSink for CpalAudioSink {
    fn write(&mut self, buf: &[f32]) -> std::io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.producer.write_blocking(&buf[written..]) {
                Some(n) => written += n,
                None => {
                    warn!("output ring buffer consumer gone, dropping remaining samples");
                    break;
                }
            }
        }
        Ok(())
    }
}
