//! Per-turn message consumption.
//!
//! A turn drains the session queue message by message until the service
//! marks the turn complete, routing transcription fragments to the
//! transcript and audio parts to the playback scheduler. Exactly one turn
//! runs at a time; an interrupted turn surfaces as [`TurnOutcome::Cancelled`]
//! rather than an error.

use crate::session::message::{ServerMessage, Speaker};
use crate::session::queue::AsyncQueue;
use crate::session::scheduler::AudioScheduler;
use crate::session::transcript::TranscriptLog;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The service signalled turn completion.
    Completed,
    /// The queue was cleared mid-turn (barge-in or shutdown).
    Cancelled,
    /// Another turn was already draining the queue; nothing was consumed.
    AlreadyProcessing,
}

/// Drains one turn's worth of messages from the queue.
pub struct TurnProcessor {
    queue: Arc<AsyncQueue<ServerMessage>>,
    scheduler: Arc<AudioScheduler>,
    transcript: Arc<Mutex<TranscriptLog>>,
    processing: Arc<AtomicBool>,
}

/// Releases the processing flag on every exit path, panics included.
struct ProcessingGuard(Arc<AtomicBool>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TurnProcessor {
    pub fn new(
        queue: Arc<AsyncQueue<ServerMessage>>,
        scheduler: Arc<AudioScheduler>,
        transcript: Arc<Mutex<TranscriptLog>>,
    ) -> Self {
        Self {
            queue,
            scheduler,
            transcript,
            processing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a turn is being drained.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    fn lock_transcript(&self) -> MutexGuard<'_, TranscriptLog> {
        match self.transcript.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Consumes messages until the turn completes or the queue is cleared.
    pub async fn process_turn(&self) -> TurnOutcome {
        if self.processing.swap(true, Ordering::SeqCst) {
            return TurnOutcome::AlreadyProcessing;
        }
        let _guard = ProcessingGuard(self.processing.clone());

        loop {
            let message = match self.queue.get().await {
                Ok(message) => message,
                Err(e) if e.is_queue_cleared() => {
                    debug!("turn cancelled");
                    return TurnOutcome::Cancelled;
                }
                Err(_) => return TurnOutcome::Cancelled,
            };
            if self.dispatch(&message) {
                debug!("turn complete");
                return TurnOutcome::Completed;
            }
        }
    }

    /// Routes one message; returns true on the turn-completion marker.
    fn dispatch(&self, message: &ServerMessage) -> bool {
        if let Some(fragment) = message.input_transcription() {
            trace!("user transcription fragment ({} chars)", fragment.text.len());
            self.lock_transcript()
                .push(Speaker::User, &fragment.text, fragment.is_final);
        }
        if let Some(fragment) = message.output_transcription() {
            trace!("model transcription fragment ({} chars)", fragment.text.len());
            self.lock_transcript()
                .push(Speaker::Model, &fragment.text, fragment.is_final);
        }
        if let Some(data) = message.audio_data() {
            self.scheduler.schedule_chunk(data);
        }
        message.is_turn_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackConfig;
    use crate::error::Result;
    use crate::session::pcm::AudioBuffer;
    use crate::session::scheduler::{AudioOutput, PlaybackHandle};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct SilentOutput {
        plays: AtomicUsize,
    }

    struct NoopHandle;

    impl PlaybackHandle for NoopHandle {
        fn stop(&self) {}
        fn is_finished(&self) -> bool {
            true
        }
    }

    impl AudioOutput for SilentOutput {
        fn now(&self) -> f64 {
            0.0
        }
        fn play(&self, _buffer: AudioBuffer, _start_at: f64) -> Result<Box<dyn PlaybackHandle>> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopHandle))
        }
    }

    fn processor() -> (TurnProcessor, Arc<AsyncQueue<ServerMessage>>, Arc<SilentOutput>) {
        let queue = Arc::new(AsyncQueue::new());
        let output = Arc::new(SilentOutput {
            plays: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(AudioScheduler::new(
            output.clone(),
            &PlaybackConfig::default(),
        ));
        let transcript = Arc::new(Mutex::new(TranscriptLog::new()));
        (
            TurnProcessor::new(queue.clone(), scheduler, transcript),
            queue,
            output,
        )
    }

    #[tokio::test]
    async fn test_turn_drains_until_completion_marker() {
        let (processor, queue, output) = processor();
        let audio = BASE64_STANDARD.encode(vec![0u8; 4800]);

        queue.put(ServerMessage::transcription(Speaker::User, "hi", true));
        queue.put(ServerMessage::audio(&audio));
        queue.put(ServerMessage::transcription(Speaker::Model, "hello", true));
        queue.put(ServerMessage::turn_complete());
        queue.put(ServerMessage::transcription(Speaker::User, "next turn", false));

        let outcome = processor.process_turn().await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(output.plays.load(Ordering::SeqCst), 1);
        // The message after the marker belongs to the next turn
        assert_eq!(queue.len(), 1);

        let transcript = processor.transcript.lock().unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[0].speaker, Speaker::User);
        assert_eq!(transcript.entries()[1].text, "hello");
    }

    #[tokio::test]
    async fn test_clear_mid_turn_is_cancelled() {
        let (processor, queue, _output) = processor();
        let processor = Arc::new(processor);

        let p = processor.clone();
        let turn = tokio::spawn(async move { p.process_turn().await });

        // Wait until the turn is blocked on an empty queue
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(processor.is_processing());
        queue.clear();

        assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
        assert!(!processor.is_processing());
    }

    #[tokio::test]
    async fn test_second_concurrent_turn_is_rejected() {
        let (processor, queue, _output) = processor();
        let processor = Arc::new(processor);

        let p = processor.clone();
        let first = tokio::spawn(async move { p.process_turn().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(processor.process_turn().await, TurnOutcome::AlreadyProcessing);

        queue.put(ServerMessage::turn_complete());
        assert_eq!(first.await.unwrap(), TurnOutcome::Completed);
    }

    #[tokio::test]
    async fn test_processing_flag_released_after_completion() {
        let (processor, queue, _output) = processor();
        queue.put(ServerMessage::turn_complete());
        assert_eq!(processor.process_turn().await, TurnOutcome::Completed);
        assert!(!processor.is_processing());

        // A fresh turn can start immediately
        queue.put(ServerMessage::turn_complete());
        assert_eq!(processor.process_turn().await, TurnOutcome::Completed);
    }

    #[tokio::test]
    async fn test_undecodable_audio_does_not_end_turn() {
        let (processor, queue, output) = processor();
        queue.put(ServerMessage::audio("%%bad%%"));
        queue.put(ServerMessage::audio(&BASE64_STANDARD.encode(vec![0u8; 480])));
        queue.put(ServerMessage::turn_complete());

        assert_eq!(processor.process_turn().await, TurnOutcome::Completed);
        assert_eq!(output.plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_growing_fragments_merge_in_transcript() {
        let (processor, queue, _output) = processor();
        queue.put(ServerMessage::transcription(Speaker::Model, "wor", false));
        queue.put(ServerMessage::transcription(Speaker::Model, "world", true));
        queue.put(ServerMessage::turn_complete());

        processor.process_turn().await;
        let transcript = processor.transcript.lock().unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.entries()[0].text, "world");
    }
}
