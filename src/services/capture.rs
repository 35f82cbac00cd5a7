//! Microphone capture session: permission, buffering, live levels, and the
//! hand-off of one finished WAV clip.
//!
//! The controller is a small state machine driven from the UI thread. The
//! platform backend delivers samples from its own callback thread through a
//! [`CaptureSink`], which carries a session generation so a callback that
//! outlives its session writes nothing.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use uuid::Uuid;

use crate::gateway::types::AudioClip;

pub const LEVEL_WINDOW: usize = 256;
pub const LEVEL_BARS: usize = 20;
pub const CLIP_CONTENT_TYPE: &str = "audio/wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    RequestingPermission,
    Recording,
    Stopping,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to encode clip: {0}")]
    Encode(String),

    #[error("no capture in progress")]
    NotRecording,
}

/// Where a backend delivers captured mono samples.
///
/// Cheap to clone into an audio callback. Pushes from a sink created for an
/// earlier session are dropped, which is what makes backend teardown safe
/// against a callback already in flight.
#[derive(Clone)]
pub struct CaptureSink {
    generation: u64,
    shared: Arc<SinkShared>,
}

impl CaptureSink {
    pub fn push(&self, samples: &[i16]) {
        if self.shared.generation.load(Ordering::Acquire) != self.generation {
            return;
        }
        lock_samples(&self.shared).extend_from_slice(samples);
    }
}

#[derive(Default)]
struct SinkShared {
    generation: AtomicU64,
    samples: Mutex<Vec<i16>>,
}

fn lock_samples(shared: &SinkShared) -> MutexGuard<'_, Vec<i16>> {
    shared
        .samples
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A platform microphone.
///
/// `start` covers the permission request and stream start in one step and
/// reports the stream's sample rate; `stop` must release the underlying
/// device. Not `Send`: the controller lives on the UI thread, only the sink
/// crosses into the audio callback.
pub trait MicBackend {
    fn start(&mut self, sink: CaptureSink) -> Result<u32, CaptureError>;
    fn stop(&mut self);
}

/// Rolling amplitude bars for the live waveform. Advisory only: feeding it
/// never blocks the capture, and an idle meter reads as silence.
#[derive(Default)]
pub struct LevelMeter {
    bars: VecDeque<f32>,
}

impl LevelMeter {
    fn push_window(&mut self, samples: &[i16]) {
        let window = &samples[samples.len().saturating_sub(LEVEL_WINDOW)..];
        if window.is_empty() {
            return;
        }
        let energy: f64 = window
            .iter()
            .map(|&s| {
                let normalized = f64::from(s) / f64::from(i16::MAX);
                normalized * normalized
            })
            .sum();
        let rms = (energy / window.len() as f64).sqrt() as f32;
        if self.bars.len() == LEVEL_BARS {
            self.bars.pop_front();
        }
        self.bars.push_back(rms.min(1.0));
    }

    fn bars(&self) -> [f32; LEVEL_BARS] {
        let mut out = [0.0; LEVEL_BARS];
        let offset = LEVEL_BARS - self.bars.len();
        for (slot, bar) in out[offset..].iter_mut().zip(self.bars.iter()) {
            *slot = *bar;
        }
        out
    }

    fn reset(&mut self) {
        self.bars.clear();
    }
}

/// One microphone session from start to released resources.
pub struct CaptureController<B: MicBackend> {
    backend: B,
    state: CaptureState,
    shared: Arc<SinkShared>,
    meter: LevelMeter,
    sample_rate_hz: u32,
}

impl<B: MicBackend> CaptureController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: CaptureState::Idle,
            shared: Arc::new(SinkShared::default()),
            meter: LevelMeter::default(),
            sample_rate_hz: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// Request permission and start recording. Ignored while a session is
    /// already running; a denied permission leaves no side effects.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            tracing::debug!("capture already in progress, ignoring start");
            return Ok(());
        }
        self.state = CaptureState::RequestingPermission;
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        lock_samples(&self.shared).clear();
        self.meter.reset();

        let sink = CaptureSink {
            generation,
            shared: Arc::clone(&self.shared),
        };
        match self.backend.start(sink) {
            Ok(rate) => {
                self.sample_rate_hz = rate;
                self.state = CaptureState::Recording;
                tracing::debug!(sample_rate_hz = rate, "capture started");
                Ok(())
            }
            Err(e) => {
                self.state = CaptureState::Idle;
                tracing::warn!("could not start capture: {e}");
                Err(e)
            }
        }
    }

    /// One visualization tick: fold the newest samples into the meter and
    /// return the current bars. Call once per rendered frame while
    /// recording; outside of `Recording` this only reports silence.
    pub fn sample_levels(&mut self) -> [f32; LEVEL_BARS] {
        if self.state == CaptureState::Recording {
            let tail: Vec<i16> = {
                let samples = lock_samples(&self.shared);
                let from = samples.len().saturating_sub(LEVEL_WINDOW);
                samples[from..].to_vec()
            };
            self.meter.push_window(&tail);
        }
        self.meter.bars()
    }

    /// Stop recording and return the finished clip.
    ///
    /// The microphone and the meter are released before the clip is even
    /// encoded: whatever happens to the artifact afterwards, the device is
    /// already free.
    pub fn stop(&mut self) -> Result<AudioClip, CaptureError> {
        if self.state != CaptureState::Recording {
            return Err(CaptureError::NotRecording);
        }
        self.state = CaptureState::Stopping;
        let samples = self.release();
        let bytes = encode_wav(&samples, self.sample_rate_hz)?;
        tracing::debug!(samples = samples.len(), "capture stopped");
        Ok(AudioClip {
            bytes,
            content_type: CLIP_CONTENT_TYPE,
            file_name: format!("rec-{}.wav", Uuid::new_v4()),
        })
    }

    /// Abort the session, discarding buffered audio.
    pub fn cancel(&mut self) {
        if self.state == CaptureState::Idle {
            return;
        }
        self.state = CaptureState::Stopping;
        let _ = self.release();
        tracing::debug!("capture cancelled");
    }

    /// Unconditional resource release: invalidates in-flight sink pushes,
    /// drains the buffer, stops the device, clears the meter.
    fn release(&mut self) -> Vec<i16> {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        let samples = std::mem::take(&mut *lock_samples(&self.shared));
        self.backend.stop();
        self.meter.reset();
        self.state = CaptureState::Idle;
        samples
    }
}

impl<B: MicBackend> Drop for CaptureController<B> {
    fn drop(&mut self) {
        if self.state != CaptureState::Idle {
            self.cancel();
        }
    }
}

fn encode_wav(samples: &[i16], sample_rate_hz: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(feature = "microphone")]
pub use cpal_backend::CpalBackend;

#[cfg(feature = "microphone")]
mod cpal_backend {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::SampleFormat;

    use super::{CaptureError, CaptureSink, MicBackend};

    /// Default-input-device backend over cpal. The stream handle is the
    /// resource: dropping it stops the callback and frees the device.
    #[derive(Default)]
    pub struct CpalBackend {
        stream: Option<cpal::Stream>,
    }

    impl CpalBackend {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl MicBackend for CpalBackend {
        fn start(&mut self, sink: CaptureSink) -> Result<u32, CaptureError> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or(CaptureError::PermissionDenied)?;
            let supported = device
                .default_input_config()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
            let channels = usize::from(supported.channels().max(1));
            let config = supported.config();
            let sample_rate_hz = config.sample_rate.0;

            let on_error = |e: cpal::StreamError| tracing::warn!("input stream error: {e}");
            let stream = match supported.sample_format() {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _| sink.push(&mono_from_f32(data, channels)),
                    on_error,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _| sink.push(&mono_from_i16(data, channels)),
                    on_error,
                    None,
                ),
                other => {
                    return Err(CaptureError::DeviceUnavailable(format!(
                        "unsupported sample format {other:?}"
                    )))
                }
            }
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => CaptureError::PermissionDenied,
                e => CaptureError::DeviceUnavailable(e.to_string()),
            })?;

            stream
                .play()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
            self.stream = Some(stream);
            Ok(sample_rate_hz)
        }

        fn stop(&mut self) {
            self.stream = None;
        }
    }

    fn mono_from_f32(data: &[f32], channels: usize) -> Vec<i16> {
        data.chunks(channels)
            .map(|frame| {
                let avg = frame.iter().copied().sum::<f32>() / frame.len() as f32;
                (avg.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
            })
            .collect()
    }

    fn mono_from_i16(data: &[i16], channels: usize) -> Vec<i16> {
        data.chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    }
}
