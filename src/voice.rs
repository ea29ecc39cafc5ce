//! Push-to-talk and spoken-answer orchestration.
//!
//! Two independent state machines:
//!
//! ```text
//! input:  idle → recording → transcribing → idle
//!                    └──────────┴────────→ error → (recording)
//! output: idle → synthesizing → playing → idle
//! ```
//!
//! Speaking always preempts playback in progress. Stopping a recording that
//! was never started is a no-op, so a stray button release cannot fail.

use tracing::{debug, warn};

use crate::config::{BackendConfig, EngineConfig};
use crate::error::{EngineError, Result};
use crate::session::SessionManager;
use crate::speech::{
    AudioSink, CpalRecorder, CpalSink, Recorder, SynthesisClient, Transcription,
    TranscriptionClient,
};
use crate::types::{Turn, is_supported_language};

/// Where the microphone side of the orchestrator is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// Nothing captured, nothing pending.
    Idle,
    /// Microphone open.
    Recording,
    /// Take finished, transcription call in flight.
    Transcribing,
    /// The last capture or transcription failed. Cleared by the next
    /// `start_recording`.
    Error,
}

/// Where the speaker side of the orchestrator is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Silent.
    Idle,
    /// Synthesis call in flight.
    Synthesizing,
    /// Utterance on the device.
    Playing,
}

/// Drives one microphone and one speaker against the speech endpoints.
pub struct VoiceOrchestrator<R: Recorder, S: AudioSink> {
    recorder: R,
    sink: S,
    stt: TranscriptionClient,
    tts: SynthesisClient,
    input: InputState,
    output: OutputState,
}

impl VoiceOrchestrator<CpalRecorder, CpalSink> {
    /// Build an orchestrator on the system's default (or configured) devices.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedDevice`] when a required device is
    /// missing and [`EngineError::Config`] if the HTTP clients cannot be
    /// built.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(
            CpalRecorder::new(&config.audio)?,
            CpalSink::new(&config.audio)?,
            &config.backend,
        )
    }
}

impl<R: Recorder, S: AudioSink> VoiceOrchestrator<R, S> {
    /// Build an orchestrator over explicit devices.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the HTTP clients cannot be built.
    pub fn new(recorder: R, sink: S, backend: &BackendConfig) -> Result<Self> {
        Ok(Self {
            recorder,
            sink,
            stt: TranscriptionClient::new(backend)?,
            tts: SynthesisClient::new(backend)?,
            input: InputState::Idle,
            output: OutputState::Idle,
        })
    }

    /// Current microphone state.
    pub fn input_state(&self) -> InputState {
        self.input
    }

    /// Current speaker state, refreshed against the device.
    pub fn output_state(&mut self) -> OutputState {
        if self.output == OutputState::Playing && !self.sink.is_active() {
            self.output = OutputState::Idle;
        }
        self.output
    }

    /// Open the microphone.
    ///
    /// Allowed from `Idle` and `Error` (which it clears).
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::Audio`] while a take or transcription is
    /// already in progress, or with the device error that prevented capture.
    pub fn start_recording(&mut self) -> Result<()> {
        match self.input {
            InputState::Recording | InputState::Transcribing => {
                return Err(EngineError::Audio("capture already in progress".into()));
            }
            InputState::Idle | InputState::Error => {}
        }

        match self.recorder.start() {
            Ok(()) => {
                self.input = InputState::Recording;
                debug!("recording started");
                Ok(())
            }
            Err(e) => {
                self.input = InputState::Error;
                Err(e)
            }
        }
    }

    /// Close the microphone and transcribe the take.
    ///
    /// Returns `Ok(None)` when no recording was active. The language hint is
    /// the session language; the transcription endpoint may still detect a
    /// different one.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for an unsupported language,
    /// [`EngineError::Transcription`] when no speech was recognized, plus
    /// the transport and backend errors of the call.
    pub async fn stop_recording(&mut self, language: &str) -> Result<Option<Transcription>> {
        if self.input != InputState::Recording {
            return Ok(None);
        }
        if !is_supported_language(language) {
            return Err(EngineError::Config(format!(
                "unsupported language code: {language}"
            )));
        }

        let recording = match self.recorder.stop() {
            Ok(recording) => recording,
            Err(e) => {
                self.input = InputState::Error;
                return Err(e);
            }
        };

        self.input = InputState::Transcribing;
        match self.stt.transcribe(&recording, language).await {
            Ok(transcription) => {
                self.input = InputState::Idle;
                Ok(Some(transcription))
            }
            Err(e) => {
                warn!(error = %e, "transcription failed");
                self.input = InputState::Error;
                Err(e)
            }
        }
    }

    /// Complete one spoken exchange against a live session.
    ///
    /// Closes the microphone, transcribes the take in the session's language,
    /// sends the transcription as a user turn, and speaks the assistant's
    /// answer (preempting any playback). Returns `Ok(None)` when no recording
    /// was active, mirroring [`stop_recording`](Self::stop_recording).
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionNotInitialized`] without a live session (the
    /// recording is left running), plus every error of
    /// [`stop_recording`](Self::stop_recording), [`SessionManager::send`],
    /// and [`speak`](Self::speak). A synthesis failure surfaces as an error
    /// but the exchanged turns are already in the session's history.
    pub async fn converse(&mut self, session: &SessionManager) -> Result<Option<Turn>> {
        let language = match session.session() {
            Some(current) if current.live => current.language,
            _ => return Err(EngineError::SessionNotInitialized),
        };

        let Some(transcription) = self.stop_recording(&language).await? else {
            return Ok(None);
        };
        debug!(text = %transcription.text, "spoken query transcribed");

        let turn = session.send(&transcription.text).await?;
        self.speak(&turn.content, &language).await?;
        Ok(Some(turn))
    }

    /// Synthesize `text` and play it, preempting any current utterance.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyMessage`] for blank text, [`EngineError::Config`]
    /// for an unsupported language, plus synthesis and device errors. On
    /// failure the output side returns to idle.
    pub async fn speak(&mut self, text: &str, language: &str) -> Result<()> {
        if !is_supported_language(language) {
            return Err(EngineError::Config(format!(
                "unsupported language code: {language}"
            )));
        }

        self.sink.stop();
        self.output = OutputState::Synthesizing;

        let audio = match self.tts.synthesize(text, language).await {
            Ok(audio) => audio,
            Err(e) => {
                self.output = OutputState::Idle;
                return Err(e);
            }
        };

        debug!(duration = ?audio.duration(), "utterance synthesized");
        match self.sink.play(&audio.samples, audio.sample_rate) {
            Ok(()) => {
                self.output = OutputState::Playing;
                Ok(())
            }
            Err(e) => {
                self.output = OutputState::Idle;
                Err(e)
            }
        }
    }

    /// Stop playback immediately. Safe in any state. Idempotent.
    pub fn stop_speaking(&mut self) {
        self.sink.stop();
        self.output = OutputState::Idle;
    }
}
