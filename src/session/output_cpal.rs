//! Playback output over CPAL.
//!
//! Implements the scheduler's clock as a frame counter advanced by the
//! device callback, so "now" is the device's own playback position rather
//! than wall time. Scheduled buffers are mixed additively; a buffer whose
//! start frame lies in the future contributes silence until the counter
//! reaches it.
//!
//! cpal's `Stream` is not `Send`, so a dedicated thread owns it for the
//! lifetime of the output; everything shared with callers is the mixer
//! state behind a mutex.

use crate::config::PlaybackConfig;
use crate::error::{LiveloopError, Result};
use crate::session::pcm::AudioBuffer;
use crate::session::scheduler::{AudioOutput, PlaybackHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

struct ActiveSource {
    samples: Vec<f32>,
    start_frame: u64,
    stopped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

struct Mixer {
    sources: Vec<ActiveSource>,
    frames_written: u64,
}

impl Mixer {
    /// Fills one callback buffer, advancing the frame counter.
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        let frames = data.len() / channels;
        data.fill(0.0);

        for source in &mut self.sources {
            if source.stopped.load(Ordering::Relaxed) {
                source.finished.store(true, Ordering::Relaxed);
                continue;
            }
            for i in 0..frames {
                let absolute = self.frames_written + i as u64;
                if absolute < source.start_frame {
                    continue;
                }
                let idx = (absolute - source.start_frame) as usize;
                let Some(&sample) = source.samples.get(idx) else {
                    break;
                };
                for ch in 0..channels {
                    data[i * channels + ch] += sample;
                }
            }
            let end = source.start_frame + source.samples.len() as u64;
            if self.frames_written + frames as u64 >= end {
                source.finished.store(true, Ordering::Relaxed);
            }
        }
        self.sources
            .retain(|s| !s.finished.load(Ordering::Relaxed));
        self.frames_written += frames as u64;
    }
}

struct CpalPlaybackHandle {
    stopped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl PlaybackHandle for CpalPlaybackHandle {
    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed) || self.stopped.load(Ordering::Relaxed)
    }
}

/// Speaker output at the session output rate.
pub struct CpalAudioOutput {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalAudioOutput {
    /// Opens the default output device and starts the mixer stream.
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        let sample_rate = config.output_sample_rate;
        let mixer = Arc::new(Mutex::new(Mixer {
            sources: Vec::new(),
            frames_written: 0,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_mixer = mixer.clone();
        let thread_shutdown = shutdown.clone();
        let thread = std::thread::Builder::new()
            .name("liveloop-output".to_string())
            .spawn(move || {
                let stream = match build_output_stream(thread_mixer, sample_rate) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // The stream plays for as long as this thread holds it
                while !thread_shutdown.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
            })
            .map_err(|e| LiveloopError::AudioOutput {
                message: format!("Failed to spawn output thread: {e}"),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(LiveloopError::AudioOutput {
                    message: "output thread exited before reporting readiness".to_string(),
                });
            }
        }

        Ok(Self {
            mixer,
            sample_rate,
            shutdown,
            thread: Some(thread),
        })
    }

    fn lock_mixer(&self) -> std::sync::MutexGuard<'_, Mixer> {
        match self.mixer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn build_output_stream(mixer: Arc<Mutex<Mixer>>, sample_rate: u32) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| LiveloopError::AudioDeviceNotFound {
            device: "default output".to_string(),
        })?;

    let channels = device
        .default_output_config()
        .map(|c| c.channels())
        .unwrap_or(2);
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = channels as usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if let Ok(mut mixer) = mixer.lock() {
                    mixer.fill(data, channels);
                } else {
                    data.fill(0.0);
                }
            },
            |err| warn!("output stream error: {err}"),
            None,
        )
        .map_err(|e| LiveloopError::AudioOutput {
            message: format!("Failed to build output stream: {e}"),
        })?;

    stream.play().map_err(|e| LiveloopError::AudioOutput {
        message: format!("Failed to start output stream: {e}"),
    })?;
    Ok(stream)
}

impl AudioOutput for CpalAudioOutput {
    fn now(&self) -> f64 {
        let frames = self.lock_mixer().frames_written;
        frames as f64 / self.sample_rate as f64
    }

    fn play(&self, buffer: AudioBuffer, start_at: f64) -> Result<Box<dyn PlaybackHandle>> {
        let samples = buffer.mono().to_vec();
        let start_frame = (start_at.max(0.0) * self.sample_rate as f64).round() as u64;
        let stopped = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(samples.is_empty()));

        self.lock_mixer().sources.push(ActiveSource {
            samples,
            start_frame,
            stopped: stopped.clone(),
            finished: finished.clone(),
        });

        Ok(Box::new(CpalPlaybackHandle { stopped, finished }))
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer_with(sources: Vec<ActiveSource>) -> Mixer {
        Mixer {
            sources,
            frames_written: 0,
        }
    }

    fn source_at(start_frame: u64, samples: Vec<f32>) -> (ActiveSource, Arc<AtomicBool>, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        (
            ActiveSource {
                samples,
                start_frame,
                stopped: stopped.clone(),
                finished: finished.clone(),
            },
            stopped,
            finished,
        )
    }

    #[test]
    fn test_clock_advances_by_frames_not_samples() {
        let mut mixer = mixer_with(Vec::new());
        let mut data = vec![0.0_f32; 512]; // 256 stereo frames
        mixer.fill(&mut data, 2);
        assert_eq!(mixer.frames_written, 256);
    }

    #[test]
    fn test_future_source_contributes_silence_until_start() {
        let (source, _, _) = source_at(4, vec![0.5; 4]);
        let mut mixer = mixer_with(vec![source]);
        let mut data = vec![0.0_f32; 8];
        mixer.fill(&mut data, 1);

        assert_eq!(&data[..4], &[0.0; 4]);
        assert_eq!(&data[4..], &[0.5; 4]);
    }

    #[test]
    fn test_overlapping_sources_are_summed() {
        let (a, _, _) = source_at(0, vec![0.25; 4]);
        let (b, _, _) = source_at(2, vec![0.25; 4]);
        let mut mixer = mixer_with(vec![a, b]);
        let mut data = vec![0.0_f32; 8];
        mixer.fill(&mut data, 1);

        assert_eq!(data, vec![0.25, 0.25, 0.5, 0.5, 0.25, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_exhausted_source_is_marked_finished_and_pruned() {
        let (source, _, finished) = source_at(0, vec![0.1; 4]);
        let mut mixer = mixer_with(vec![source]);
        let mut data = vec![0.0_f32; 8];
        mixer.fill(&mut data, 1);

        assert!(finished.load(Ordering::Relaxed));
        assert!(mixer.sources.is_empty());
    }

    #[test]
    fn test_stopped_source_goes_silent_immediately() {
        let (source, stopped, finished) = source_at(0, vec![0.5; 100]);
        stopped.store(true, Ordering::Relaxed);
        let mut mixer = mixer_with(vec![source]);
        let mut data = vec![0.0_f32; 8];
        mixer.fill(&mut data, 1);

        assert_eq!(data, vec![0.0; 8]);
        assert!(finished.load(Ordering::Relaxed));
        assert!(mixer.sources.is_empty());
    }

    #[test]
    fn test_mono_source_duplicated_across_channels() {
        let (source, _, _) = source_at(0, vec![0.3; 2]);
        let mut mixer = mixer_with(vec![source]);
        let mut data = vec![0.0_f32; 4]; // 2 stereo frames
        mixer.fill(&mut data, 2);

        assert_eq!(data, vec![0.3, 0.3, 0.3, 0.3]);
    }

    #[test]
    fn test_source_spanning_callbacks_resumes_at_position() {
        let samples: Vec<f32> = (0..8).map(|i| i as f32 / 10.0).collect();
        let (source, _, _) = source_at(0, samples);
        let mut mixer = mixer_with(vec![source]);

        let mut first = vec![0.0_f32; 4];
        mixer.fill(&mut first, 1);
        let mut second = vec![0.0_f32; 4];
        mixer.fill(&mut second, 1);

        assert_eq!(first, vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(second, vec![0.4, 0.5, 0.6, 0.7]);
    }
}
