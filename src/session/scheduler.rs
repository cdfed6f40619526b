//! Gapless sequential playback scheduling.
//!
//! Chunks arrive faster or slower than real time; the scheduler keeps a
//! monotonically advancing "next start" cursor against the audio clock so
//! each chunk plays back-to-back with no gaps and no overlap. The cursor is
//! read and advanced synchronously in schedule-call order, so chunks play
//! in the order they were scheduled regardless of decode jitter.

use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::session::pcm::{self, AudioBuffer};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};

/// A single in-flight playback that can be force-stopped.
pub trait PlaybackHandle: Send {
    fn stop(&self);
    /// True once playback ended naturally or was stopped.
    fn is_finished(&self) -> bool;
}

/// Playback backend: an audio clock plus the ability to start a buffer at a
/// point on that clock.
pub trait AudioOutput: Send + Sync {
    /// Current time on the audio clock, in seconds.
    fn now(&self) -> f64;

    /// Starts playback of `buffer` at `start_at` on the audio clock.
    fn play(&self, buffer: AudioBuffer, start_at: f64) -> Result<Box<dyn PlaybackHandle>>;
}

/// Schedules decoded chunks for gapless sequential playback.
///
/// One instance per session: the cursor and handle registry are owned
/// exclusively here, never shared across sessions.
pub struct AudioScheduler {
    output: Arc<dyn AudioOutput>,
    sample_rate: u32,
    lead_secs: f64,
    next_start: Mutex<f64>,
    handles: Mutex<Vec<Box<dyn PlaybackHandle>>>,
}

impl AudioScheduler {
    pub fn new(output: Arc<dyn AudioOutput>, config: &PlaybackConfig) -> Self {
        Self {
            output,
            sample_rate: config.output_sample_rate,
            lead_secs: config.lead_secs,
            next_start: Mutex::new(0.0),
            handles: Mutex::new(Vec::new()),
        }
    }

    fn lock_cursor(&self) -> MutexGuard<'_, f64> {
        match self.next_start.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<Box<dyn PlaybackHandle>>> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Decodes and schedules one inbound base64 PCM chunk.
    ///
    /// Fire-and-forget: a decode failure is logged and skipped without
    /// touching the cursor, so subsequent chunks are unaffected.
    pub fn schedule_chunk(&self, base64_data: &str) {
        let buffer = match pcm::decode_base64_audio(base64_data, self.sample_rate, 1) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("skipping undecodable audio chunk: {e}");
                return;
            }
        };
        self.schedule_buffer(buffer);
    }

    /// Schedules an already-decoded buffer; returns its start time.
    ///
    /// The cursor read-modify-write happens under one lock before the
    /// backend is invoked, which is what guarantees call-order playback.
    pub fn schedule_buffer(&self, buffer: AudioBuffer) -> Option<f64> {
        let duration = buffer.duration_secs();
        let start_at = {
            let mut cursor = self.lock_cursor();
            let now = self.output.now();
            // Playback fell behind real time (e.g. after a pause): restart
            // slightly ahead of the clock instead of scheduling in the past
            if *cursor < now {
                *cursor = now + self.lead_secs;
            }
            let start_at = *cursor;
            *cursor += duration;
            start_at
        };

        match self.output.play(buffer, start_at) {
            Ok(handle) => {
                debug!("scheduled {duration:.2}s chunk at {start_at:.2}s");
                let mut handles = self.lock_handles();
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                Some(start_at)
            }
            Err(e) => {
                warn!("playback start failed: {e}");
                None
            }
        }
    }

    /// Number of tracked in-flight playbacks (finished ones may linger
    /// until the next scheduling call prunes them).
    pub fn active_count(&self) -> usize {
        self.lock_handles().len()
    }

    /// Force-stops every tracked playback, clears the registry, and resets
    /// the cursor for the next session. Idempotent.
    pub fn stop_all(&self) {
        let mut handles = self.lock_handles();
        for handle in handles.iter() {
            handle.stop();
        }
        handles.clear();
        *self.lock_cursor() = 0.0;
    }
}

impl Drop for AudioScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}
