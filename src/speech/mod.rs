//! Voice I/O: microphone capture, playback, transcription, and synthesis.
//!
//! Capture and playback are trait seams ([`Recorder`], [`AudioSink`]) so the
//! voice orchestrator can be driven by mock devices in tests. The default
//! implementations talk to the system devices via cpal; transcription and
//! synthesis are HTTP calls to the backend speech endpoints.

pub mod capture;
pub mod playback;
pub mod stt;
pub mod tts;

pub use capture::{AudioRecording, CaptureState, CpalRecorder, Recorder};
pub use playback::{AudioSink, CpalSink};
pub use stt::{Transcription, TranscriptionClient};
pub use tts::{SynthesisClient, SynthesizedAudio};
