//! Audio playback through the default output device using cpal.
//!
//! Samples reach the audio callback through a lock-free ring buffer. The
//! callback counts what it consumes, which gives the reader a playback position
//! without blocking the event loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use tracing::{debug, info, warn};

use super::decode::decode;
use super::resampler::resample;
use super::util::{find_best_config, get_device_name};
use crate::client::AudioOutput;
use crate::error::PlaybackError;

/// Ring buffer size in samples (~87 seconds at 48kHz, well above one chunk)
const PLAYBACK_RING_SIZE: usize = 1 << 22;

/// Longest wait for the callback to acknowledge a flush.
const FLUSH_TIMEOUT: Duration = Duration::from_millis(200);

/// Output device player for one chunk at a time.
pub struct Player {
    _stream: Stream,                         // Kept alive to keep the stream running
    device_sample_rate: u32,                 // Rate samples are resampled to
    producer: Mutex<ringbuf::HeapProd<f32>>, // Feeds the callback
    played: Arc<AtomicUsize>,                // Samples consumed from the current chunk
    queued: AtomicUsize,                     // Samples queued for the current chunk
    flush: Arc<AtomicBool>,                  // Callback drops buffered samples when set
}

impl Player {
    /// Open the default output device.
    ///
    /// # Errors
    /// Returns an error if no output device or F32 configuration is available,
    /// or the stream cannot be started.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().context("No output device available")?;

        info!("Using output device: {}", get_device_name(&device));

        let preferred_rate = device.default_output_config().map(|c| c.sample_rate()).unwrap_or(48000);
        let supported_configs = device.supported_output_configs().context("Failed to get supported output configs")?;
        let config = find_best_config(supported_configs, preferred_rate)?;
        let device_sample_rate = config.sample_rate();

        debug!("Audio playback config: {} Hz, {} channels, {:?}", device_sample_rate, config.channels(), config.sample_format());

        let ring = HeapRb::<f32>::new(PLAYBACK_RING_SIZE);
        let (producer, mut consumer) = ring.split();

        let played = Arc::new(AtomicUsize::new(0));
        let flush = Arc::new(AtomicBool::new(false));
        let played_clone = played.clone();
        let flush_clone = flush.clone();

        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if flush_clone.load(Ordering::Acquire) {
                    consumer.clear();
                    flush_clone.store(false, Ordering::Release);
                }

                let mut consumed = 0;
                for frame in data.chunks_mut(channels) {
                    let sample = match consumer.try_pop() {
                        Some(sample) => {
                            consumed += 1;
                            sample
                        }
                        None => 0.0,
                    };
                    frame.fill(sample);
                }

                if consumed > 0 {
                    played_clone.fetch_add(consumed, Ordering::Relaxed);
                }
            },
            |err| tracing::error!("Audio playback error: {}", err),
            None,
        )?;

        stream.play().context("Failed to start playback stream")?;
        info!("Audio playback ready at {} Hz", device_sample_rate);

        Ok(Self {
            _stream: stream,
            device_sample_rate,
            producer: Mutex::new(producer),
            played,
            queued: AtomicUsize::new(0),
            flush,
        })
    }

    /// Ask the callback to drop buffered samples and wait until it has.
    fn flush(&self) {
        self.flush.store(true, Ordering::Release);
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        while self.flush.load(Ordering::Acquire) {
            if Instant::now() > deadline {
                warn!("Audio callback did not acknowledge flush");
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.queued.store(0, Ordering::SeqCst);
        self.played.store(0, Ordering::SeqCst);
    }

    /// Replace the current chunk with mono `samples` at `sample_rate`.
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        let samples = resample(samples, sample_rate, self.device_sample_rate)?;

        self.flush();

        let written = self.producer.lock().push_slice(&samples);
        if written < samples.len() {
            warn!("Playback buffer overflow, dropped {} samples", samples.len() - written);
        }
        self.queued.store(written, Ordering::SeqCst);

        debug!("Playing {} samples at {} Hz", written, self.device_sample_rate);
        Ok(())
    }
}

impl AudioOutput for Player {
    fn start(&mut self, audio: &[u8], mime_type: &str) -> Result<(), PlaybackError> {
        let decoded = decode(audio.to_vec(), mime_type)?;
        debug!("Decoded {:.2}s of audio at {} Hz", decoded.duration_seconds(), decoded.sample_rate);
        self.play(&decoded.samples, decoded.sample_rate).map_err(|e| PlaybackError::Output(e.to_string()))
    }

    fn position(&self) -> f64 {
        self.played.load(Ordering::Relaxed) as f64 / self.device_sample_rate as f64
    }

    fn is_finished(&self) -> bool {
        self.played.load(Ordering::Relaxed) >= self.queued.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.flush();
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.flush.store(true, Ordering::SeqCst);
    }
}
