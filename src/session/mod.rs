//! Live voice session: ordered message delivery, PCM transport codec,
//! gapless playback scheduling, and the turn-processing loop.
//!
//! The streaming speech service itself is a black box behind
//! [`LiveTransport`]; this module owns everything between its callbacks and
//! the speaker.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod live;
pub mod message;
#[cfg(feature = "cpal-audio")]
pub mod output_cpal;
pub mod pcm;
pub mod queue;
pub mod scheduler;
pub mod transcript;
pub mod turn;

#[cfg(feature = "cpal-audio")]
pub use capture::CpalAudioSource;
pub use live::{AudioSource, CancelToken, LiveSession, LiveTransport, SessionStatus, TransportEvent};
pub use message::{ServerMessage, Speaker, TranscriptionFragment};
#[cfg(feature = "cpal-audio")]
pub use output_cpal::CpalAudioOutput;
pub use pcm::{AudioBuffer, RealtimeBlob};
pub use queue::AsyncQueue;
pub use scheduler::{AudioOutput, AudioScheduler, PlaybackHandle};
pub use transcript::{TranscriptEntry, TranscriptLog};
pub use turn::{TurnOutcome, TurnProcessor};
