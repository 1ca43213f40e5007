//! Synthesized-speech playback with a single-flight guarantee.
//!
//! One controller instance is owned by one session; at most one utterance
//! plays at any moment. A `play` issued while another utterance is active
//! supersedes it (stop, then start). `stop` silences the output
//! synchronously without waiting for the natural-end signal.

use crate::error::{InterviewError, InterviewResult};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

/// Completion handle for one started utterance. Resolves when playback
/// reaches its natural end (or was halted, which releases it as well).
pub struct UtteranceHandle {
    done: oneshot::Receiver<()>,
}

impl UtteranceHandle {
    /// Build a handle and the sender its sink fires on completion.
    pub fn pair() -> (oneshot::Sender<()>, Self) {
        let (tx, done) = oneshot::channel();
        (tx, Self { done })
    }

    /// An already-completed handle, for sinks that play nothing.
    pub fn resolved() -> Self {
        let (tx, handle) = Self::pair();
        let _ = tx.send(());
        handle
    }

    async fn finished(self) {
        // A dropped sender means the utterance was halted; either way the
        // audio is no longer audible.
        let _ = self.done.await;
    }
}

/// Output seam for the playback controller. The production implementation
/// drives a rodio sink; tests script completion by holding the sender side
/// of the returned handle.
///
/// Implementations hold platform audio handles that are not `Send`; keep
/// the owning session on one task.
pub trait SpeechSink {
    /// Decode `audio` and start playing it, returning the completion
    /// handle. Any previously active utterance must already be halted by
    /// the caller.
    fn begin(&mut self, audio: &[u8]) -> InterviewResult<UtteranceHandle>;

    /// Halt the active utterance immediately. No-op when idle.
    fn halt(&mut self);
}

/// Plays one synthesized utterance at a time on behalf of a session.
pub struct PlaybackController<S: SpeechSink> {
    sink: S,
    speaking: watch::Sender<bool>,
}

impl<S: SpeechSink> PlaybackController<S> {
    pub fn new(sink: S) -> Self {
        let (speaking, _) = watch::channel(false);
        Self { sink, speaking }
    }

    /// Play `audio` to its natural end. Empty audio is a no-op (a skipped
    /// synthesis still lets the turn proceed). If an utterance is already
    /// active it is stopped first; there are never two concurrent
    /// playbacks.
    pub async fn play(&mut self, audio: &[u8]) -> InterviewResult<()> {
        if audio.is_empty() {
            debug!("Empty audio buffer, skipping playback");
            return Ok(());
        }
        if self.is_speaking() {
            debug!("Playback already in progress, superseding");
            self.stop();
        }

        let handle = match self.sink.begin(audio) {
            Ok(handle) => handle,
            Err(e) => {
                // Guarantee: not speaking after a failed play.
                self.speaking.send_replace(false);
                return Err(e);
            }
        };
        self.speaking.send_replace(true);
        handle.finished().await;
        self.speaking.send_replace(false);
        Ok(())
    }

    /// Halt playback immediately. Idempotent; reports "not speaking"
    /// synchronously.
    pub fn stop(&mut self) {
        self.sink.halt();
        self.speaking.send_replace(false);
    }

    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    /// Observer channel for the shell ("AI is speaking" indicator).
    pub fn speaking_watch(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }
}

/// Speech output through the default audio device.
pub struct RodioSink {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    active: Option<Arc<Sink>>,
}

impl RodioSink {
    pub fn new() -> InterviewResult<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| InterviewError::Playback(e.to_string()))?;
        info!("Speech output ready");
        Ok(Self {
            _stream: stream,
            handle,
            active: None,
        })
    }
}

impl SpeechSink for RodioSink {
    fn begin(&mut self, audio: &[u8]) -> InterviewResult<UtteranceHandle> {
        self.halt();

        let cursor = Cursor::new(audio.to_vec());
        let source = rodio::Decoder::new(cursor)
            .map_err(|e| InterviewError::PlaybackDecode(e.to_string()))?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| InterviewError::Playback(e.to_string()))?;
        sink.append(source.convert_samples::<f32>());

        let sink = Arc::new(sink);
        self.active = Some(Arc::clone(&sink));

        let (tx, handle) = UtteranceHandle::pair();
        // sleep_until_end returns on natural end and on stop() alike.
        std::thread::spawn(move || {
            sink.sleep_until_end();
            let _ = tx.send(());
        });
        Ok(handle)
    }

    fn halt(&mut self) {
        if let Some(sink) = self.active.take() {
            sink.stop();
            info!("Playback halted");
        }
    }
}

/// Sink that plays nothing and completes instantly. Lets the session run
/// without an audio device (and keeps the turn loop timing consistent).
#[derive(Debug, Default)]
pub struct SilentSink;

impl SpeechSink for SilentSink {
    fn begin(&mut self, _audio: &[u8]) -> InterviewResult<UtteranceHandle> {
        Ok(UtteranceHandle::resolved())
    }

    fn halt(&mut self) {}
}
