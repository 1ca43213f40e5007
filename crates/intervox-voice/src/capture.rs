//! Microphone capture for candidate answers.
//!
//! Capture is push-to-talk: the session starts a capture when the user
//! begins an answer and finishes it when they press the control again.
//! The whole recorded clip is then handed to the transcription capability.

use crate::error::{InterviewError, InterviewResult};
use chrono::{DateTime, Utc};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// A completed answer recording: PCM from capture start to capture stop.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// PCM samples (f32, -1.0..1.0), mono.
    pub samples: Vec<f32>,
    /// Sample rate (e.g. 16000).
    pub sample_rate: u32,
    /// Clip length derived from the sample count.
    pub duration: Duration,
    /// When the capture was stopped.
    pub captured_at: DateTime<Utc>,
}

impl AudioClip {
    /// Build a clip from raw samples, deriving the duration.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64)
        };
        Self {
            samples,
            sample_rate,
            duration,
            captured_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encode the clip as 16-bit mono WAV bytes for upload.
    pub fn to_wav_bytes(&self) -> Vec<u8> {
        let num_samples = self.samples.len();
        let data_len = num_samples * 2; // 16-bit = 2 bytes per sample
        let header_len = 44u32;
        let file_len = header_len + data_len as u32;

        let mut buf = Vec::with_capacity(44 + data_len);
        // RIFF header
        buf.write_all(b"RIFF").unwrap();
        buf.write_all(&(file_len - 8).to_le_bytes()).unwrap();
        buf.write_all(b"WAVE").unwrap();
        // fmt subchunk
        buf.write_all(b"fmt ").unwrap();
        buf.write_all(&16u32.to_le_bytes()).unwrap(); // subchunk1 size
        buf.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        buf.write_all(&1u16.to_le_bytes()).unwrap(); // mono
        buf.write_all(&self.sample_rate.to_le_bytes()).unwrap();
        buf.write_all(&(self.sample_rate * 2).to_le_bytes()).unwrap(); // byte rate
        buf.write_all(&2u16.to_le_bytes()).unwrap(); // block align
        buf.write_all(&16u16.to_le_bytes()).unwrap(); // bits per sample
        // data subchunk
        buf.write_all(b"data").unwrap();
        buf.write_all(&(data_len as u32).to_le_bytes()).unwrap();
        for &s in &self.samples {
            let clamped = s.clamp(-1.0, 1.0);
            let i = (clamped * 32767.0).round() as i16;
            buf.write_all(&i.to_le_bytes()).unwrap();
        }
        buf
    }
}

/// Capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz (default: 16000).
    pub sample_rate: u32,
    /// Number of channels requested from the device (default: 1).
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Source of candidate answer audio. One capture at a time; `start` while
/// already capturing is rejected by the session's phase guard before it
/// reaches this trait.
///
/// Implementations hold platform audio handles that are not `Send`; keep
/// the owning session on one task.
pub trait AnswerCapture {
    /// Begin recording.
    fn start(&mut self) -> InterviewResult<()>;

    /// Stop recording and return the buffered clip.
    fn finish(&mut self) -> InterviewResult<AudioClip>;

    /// Discard any in-progress recording. Idempotent.
    fn abort(&mut self);

    fn is_capturing(&self) -> bool;
}

/// Microphone capture on the default input device via CPAL.
pub struct MicrophoneCapture {
    config: CaptureConfig,
    stream: Option<Stream>,
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl MicrophoneCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Check that a default input device exists and report its name.
    /// Used by the shell's pre-interview device check.
    pub fn probe() -> InterviewResult<String> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| InterviewError::Capture("No input device available".to_string()))?;
        Ok(device
            .name()
            .unwrap_or_else(|_| "Unknown input device".to_string()))
    }

    fn drain_buffer(&mut self) -> Vec<f32> {
        match self.buffer.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl AnswerCapture for MicrophoneCapture {
    fn start(&mut self) -> InterviewResult<()> {
        if self.stream.is_some() {
            return Err(InterviewError::Capture(
                "Capture already in progress".to_string(),
            ));
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| InterviewError::Capture("No input device available".to_string()))?;
        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let stream_config = StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        self.drain_buffer();
        let buffer = Arc::clone(&self.buffer);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut guard) = buffer.lock() {
                        guard.extend_from_slice(data);
                    }
                },
                move |err| {
                    warn!("Input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| InterviewError::Capture(e.to_string()))?;
        stream
            .play()
            .map_err(|e| InterviewError::Capture(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn finish(&mut self) -> InterviewResult<AudioClip> {
        if self.stream.take().is_none() {
            return Err(InterviewError::Capture(
                "No capture in progress".to_string(),
            ));
        }
        let samples = self.drain_buffer();
        let clip = AudioClip::from_samples(samples, self.config.sample_rate);
        info!(
            "Capture finished: {:.1}s, {} samples",
            clip.duration.as_secs_f32(),
            clip.samples.len()
        );
        Ok(clip)
    }

    fn abort(&mut self) {
        if self.stream.take().is_some() {
            info!("Capture aborted");
        }
        self.drain_buffer();
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Placeholder capture: records nothing and returns a configured clip.
/// Use to wire the session without audio hardware.
#[derive(Debug, Default)]
pub struct PlaceholderCapture {
    capturing: bool,
    /// Clip returned by `finish`. Defaults to 1s of silence at 16kHz.
    pub clip: Option<AudioClip>,
}

impl PlaceholderCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(clip: AudioClip) -> Self {
        Self {
            capturing: false,
            clip: Some(clip),
        }
    }
}

impl AnswerCapture for PlaceholderCapture {
    fn start(&mut self) -> InterviewResult<()> {
        self.capturing = true;
        Ok(())
    }

    fn finish(&mut self) -> InterviewResult<AudioClip> {
        if !self.capturing {
            return Err(InterviewError::Capture(
                "No capture in progress".to_string(),
            ));
        }
        self.capturing = false;
        Ok(self
            .clip
            .clone()
            .unwrap_or_else(|| AudioClip::from_samples(vec![0.0; 16000], 16000)))
    }

    fn abort(&mut self) {
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }
}
