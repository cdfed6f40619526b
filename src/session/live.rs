//! Session lifecycle orchestration.
//!
//! [`LiveSession`] wires a microphone source, a bidirectional transport, the
//! message queue, and the playback scheduler into one running conversation.
//! It owns the status state machine and the teardown sequence; the transport
//! itself stays abstract so tests (and future backends) can plug in.

use crate::config::Config;
use crate::error::{LiveloopError, Result};
use crate::session::message::ServerMessage;
use crate::session::pcm::{self, RealtimeBlob};
use crate::session::queue::AsyncQueue;
use crate::session::scheduler::{AudioOutput, AudioScheduler};
use crate::session::transcript::TranscriptLog;
use crate::session::turn::TurnProcessor;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Initializing,
    RequestingMic,
    Connecting,
    Connected,
    Error(String),
    Closed,
}

/// Outbound half of the streaming connection.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Sends one realtime PCM frame upstream.
    async fn send_realtime_input(&self, blob: RealtimeBlob) -> Result<()>;

    /// Closes the connection. Must tolerate repeated calls.
    async fn close(&self) -> Result<()>;
}

/// Inbound half of the streaming connection, delivered over a channel.
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    Message(ServerMessage),
    Error(String),
    Closed,
}

/// Microphone abstraction: mono f32 samples at the configured input rate.
pub trait AudioSource: Send {
    fn start(&mut self) -> Result<()>;

    /// Returns whatever samples have accumulated since the last call;
    /// an empty vec means nothing yet, not end of stream.
    fn read_samples(&mut self) -> Result<Vec<f32>>;

    fn stop(&mut self);
}

/// Clonable cancellation flag shared between the session and its tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One live voice conversation.
pub struct LiveSession {
    transport: Arc<dyn LiveTransport>,
    queue: Arc<AsyncQueue<ServerMessage>>,
    scheduler: Arc<AudioScheduler>,
    turns: Arc<TurnProcessor>,
    transcript: Arc<Mutex<TranscriptLog>>,
    status_tx: watch::Sender<SessionStatus>,
    mic_cancel: CancelToken,
    mic_pump: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl LiveSession {
    pub fn new(transport: Arc<dyn LiveTransport>, output: Arc<dyn AudioOutput>, config: &Config) -> Self {
        let queue = Arc::new(AsyncQueue::new());
        let scheduler = Arc::new(AudioScheduler::new(output, &config.playback));
        let transcript = Arc::new(Mutex::new(TranscriptLog::new()));
        let turns = Arc::new(TurnProcessor::new(
            queue.clone(),
            scheduler.clone(),
            transcript.clone(),
        ));
        let (status_tx, _) = watch::channel(SessionStatus::Initializing);
        Self {
            transport,
            queue,
            scheduler,
            turns,
            transcript,
            status_tx,
            mic_cancel: CancelToken::new(),
            mic_pump: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn lock_pump(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.mic_pump.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribes to status transitions.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Conversation transcript accumulated so far.
    pub fn transcript(&self) -> Vec<crate::session::transcript::TranscriptEntry> {
        match self.transcript.lock() {
            Ok(log) => log.entries().to_vec(),
            Err(poisoned) => poisoned.into_inner().entries().to_vec(),
        }
    }

    fn set_status(&self, status: SessionStatus) {
        debug!("session status: {status:?}");
        let _ = self.status_tx.send(status);
    }

    /// Runs the session until the transport closes or errors.
    ///
    /// Consumes the event stream produced by the transport backend. The
    /// microphone starts pumping once the connection reports open. A second
    /// call on the same session is rejected.
    pub async fn run(
        &self,
        mut mic: Box<dyn AudioSource>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LiveloopError::Other(
                "session already started".to_string(),
            ));
        }

        self.set_status(SessionStatus::RequestingMic);
        if let Err(e) = mic.start() {
            self.set_status(SessionStatus::Error(e.to_string()));
            self.shutdown().await;
            return Err(e);
        }
        self.set_status(SessionStatus::Connecting);

        let mut mic = Some(mic);
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Opened => {
                    info!("session connected");
                    self.set_status(SessionStatus::Connected);
                    if let Some(mic) = mic.take() {
                        self.spawn_mic_pump(mic);
                    }
                }
                TransportEvent::Message(message) => {
                    self.queue.put(message);
                    if !self.turns.is_processing() {
                        let turns = self.turns.clone();
                        tokio::spawn(async move {
                            turns.process_turn().await;
                        });
                    }
                }
                TransportEvent::Error(message) => {
                    error!("transport error: {message}");
                    self.set_status(SessionStatus::Error(message));
                    break;
                }
                TransportEvent::Closed => {
                    info!("transport closed");
                    break;
                }
            }
        }
        // A mic that never pumped still needs stopping
        if let Some(mut mic) = mic.take() {
            mic.stop();
        }

        self.shutdown().await;
        Ok(())
    }

    /// Reads microphone frames and forwards them upstream until cancelled.
    fn spawn_mic_pump(&self, mut mic: Box<dyn AudioSource>) {
        let transport = self.transport.clone();
        let cancel = self.mic_cancel.clone();
        let handle = tokio::spawn(async move {
            while !cancel.is_cancelled() {
                let samples = match mic.read_samples() {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("microphone read failed: {e}");
                        break;
                    }
                };
                // A cancel that landed during the read means teardown has
                // begun; the frame must not reach the transport
                if cancel.is_cancelled() {
                    break;
                }
                if samples.is_empty() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
                let blob = pcm::encode_realtime_frame(&samples);
                if let Err(e) = transport.send_realtime_input(blob).await {
                    warn!("realtime input send failed: {e}");
                    break;
                }
            }
            mic.stop();
            debug!("mic pump stopped");
        });
        *self.lock_pump() = Some(handle);
    }

    /// Tears the session down in a fixed order: microphone pump first, then
    /// the transport, then the queue, then playback. Idempotent, and every
    /// step runs even if an earlier one fails.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("session shutting down");

        self.mic_cancel.cancel();
        // The pump may be mid-read; the transport must stay open until the
        // pump has exited, or a trailing frame lands after close
        let pump = self.lock_pump().take();
        if let Some(pump) = pump
            && let Err(e) = pump.await
        {
            warn!("mic pump task failed: {e}");
        }
        if let Err(e) = self.transport.close().await {
            warn!("transport close failed: {e}");
        }
        self.queue.clear();
        self.scheduler.stop_all();

        // An error status survives teardown so callers can still see why
        if !matches!(self.status(), SessionStatus::Error(_)) {
            self.set_status(SessionStatus::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::pcm::AudioBuffer;
    use crate::session::scheduler::PlaybackHandle;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use std::sync::atomic::AtomicUsize;

    struct FakeTransport {
        sent: Mutex<Vec<RealtimeBlob>>,
        closes: AtomicUsize,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LiveTransport for FakeTransport {
        async fn send_realtime_input(&self, blob: RealtimeBlob) -> Result<()> {
            self.sent.lock().unwrap().push(blob);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeMic {
        frames: Vec<Vec<f32>>,
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    impl FakeMic {
        fn with_frames(frames: Vec<Vec<f32>>) -> (Box<Self>, Arc<AtomicBool>, Arc<AtomicBool>) {
            let started = Arc::new(AtomicBool::new(false));
            let stopped = Arc::new(AtomicBool::new(false));
            (
                Box::new(Self {
                    frames,
                    started: started.clone(),
                    stopped: stopped.clone(),
                }),
                started,
                stopped,
            )
        }
    }

    impl AudioSource for FakeMic {
        fn start(&mut self) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn read_samples(&mut self) -> Result<Vec<f32>> {
            if self.frames.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(self.frames.remove(0))
            }
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct NullOutput;
    struct NullHandle;

    impl PlaybackHandle for NullHandle {
        fn stop(&self) {}
        fn is_finished(&self) -> bool {
            true
        }
    }

    impl AudioOutput for NullOutput {
        fn now(&self) -> f64 {
            0.0
        }
        fn play(&self, _buffer: AudioBuffer, _start_at: f64) -> Result<Box<dyn PlaybackHandle>> {
            Ok(Box::new(NullHandle))
        }
    }

    fn session(transport: Arc<FakeTransport>) -> Arc<LiveSession> {
        Arc::new(LiveSession::new(
            transport,
            Arc::new(NullOutput),
            &Config::default(),
        ))
    }

    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let transport = FakeTransport::new();
        let session = session(transport.clone());
        let (mic, started, stopped) = FakeMic::with_frames(vec![vec![0.1; 480]]);
        let (tx, rx) = mpsc::channel(16);

        tx.send(TransportEvent::Opened).await.unwrap();
        tx.send(TransportEvent::Message(ServerMessage::transcription(
            crate::session::message::Speaker::Model,
            "hello",
            true,
        )))
        .await
        .unwrap();
        tx.send(TransportEvent::Message(ServerMessage::turn_complete()))
            .await
            .unwrap();

        let s = session.clone();
        let run = tokio::spawn(async move { s.run(mic, rx).await });

        // Give the mic pump and turn a moment, then end the session
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(TransportEvent::Closed).await.unwrap();
        run.await.unwrap().unwrap();

        // Shutdown joins the pump, so the mic is stopped by the time run
        // returns
        assert!(started.load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert!(!transport.sent.lock().unwrap().is_empty());
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].text, "hello");
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let transport = FakeTransport::new();
        let session = session(transport.clone());

        session.shutdown().await;
        session.shutdown().await;
        session.shutdown().await;

        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let transport = FakeTransport::new();
        let session = session(transport);
        let (mic_a, _, _) = FakeMic::with_frames(Vec::new());
        let (mic_b, _, _) = FakeMic::with_frames(Vec::new());
        let (tx, rx) = mpsc::channel(4);
        let (_tx2, rx2) = mpsc::channel(4);

        let s = session.clone();
        let run = tokio::spawn(async move { s.run(mic_a, rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = session.run(mic_b, rx2).await.unwrap_err();
        assert!(err.to_string().contains("already started"));

        tx.send(TransportEvent::Closed).await.unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_preserved_through_teardown() {
        let transport = FakeTransport::new();
        let session = session(transport.clone());
        let (mic, _, stopped) = FakeMic::with_frames(Vec::new());
        let (tx, rx) = mpsc::channel(4);

        tx.send(TransportEvent::Opened).await.unwrap();
        tx.send(TransportEvent::Error("connection reset".to_string()))
            .await
            .unwrap();

        session.run(mic, rx).await.unwrap();

        assert_eq!(
            session.status(),
            SessionStatus::Error("connection reset".to_string())
        );
        // Teardown still ran in full
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight_mic_read() {
        /// Mic whose reads take longer than the whole teardown sequence.
        struct SlowMic;

        impl AudioSource for SlowMic {
            fn start(&mut self) -> Result<()> {
                Ok(())
            }
            fn read_samples(&mut self) -> Result<Vec<f32>> {
                std::thread::sleep(Duration::from_millis(100));
                Ok(vec![0.1; 16])
            }
            fn stop(&mut self) {}
        }

        /// Transport that flags any frame delivered after close().
        struct ClosingTransport {
            closed: AtomicBool,
            sent_after_close: AtomicBool,
        }

        #[async_trait]
        impl LiveTransport for ClosingTransport {
            async fn send_realtime_input(&self, _blob: RealtimeBlob) -> Result<()> {
                if self.closed.load(Ordering::SeqCst) {
                    self.sent_after_close.store(true, Ordering::SeqCst);
                }
                Ok(())
            }

            async fn close(&self) -> Result<()> {
                self.closed.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let transport = Arc::new(ClosingTransport {
            closed: AtomicBool::new(false),
            sent_after_close: AtomicBool::new(false),
        });
        let session = Arc::new(LiveSession::new(
            transport.clone(),
            Arc::new(NullOutput),
            &Config::default(),
        ));

        let (tx, rx) = mpsc::channel(4);
        tx.send(TransportEvent::Opened).await.unwrap();

        let s = session.clone();
        let run = tokio::spawn(async move { s.run(Box::new(SlowMic), rx).await });

        // Tear down while the pump is blocked inside read_samples
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(TransportEvent::Closed).await.unwrap();
        run.await.unwrap().unwrap();

        assert!(transport.closed.load(Ordering::SeqCst));
        assert!(
            !transport.sent_after_close.load(Ordering::SeqCst),
            "mic frame reached the transport after close"
        );
    }

    #[tokio::test]
    async fn test_mic_failure_surfaces_as_error_status() {
        struct BrokenMic;
        impl AudioSource for BrokenMic {
            fn start(&mut self) -> Result<()> {
                Err(LiveloopError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })
            }
            fn read_samples(&mut self) -> Result<Vec<f32>> {
                Ok(Vec::new())
            }
            fn stop(&mut self) {}
        }

        let transport = FakeTransport::new();
        let session = session(transport.clone());
        let (_tx, rx) = mpsc::channel::<TransportEvent>(4);

        let err = session.run(Box::new(BrokenMic), rx).await.unwrap_err();
        assert!(matches!(err, LiveloopError::AudioDeviceNotFound { .. }));
        assert!(matches!(session.status(), SessionStatus::Error(_)));
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_watch_sees_transitions() {
        let transport = FakeTransport::new();
        let session = session(transport);
        let mut watch = session.watch_status();
        assert_eq!(*watch.borrow(), SessionStatus::Initializing);

        let (mic, _, _) = FakeMic::with_frames(Vec::new());
        let (tx, rx) = mpsc::channel(4);
        tx.send(TransportEvent::Opened).await.unwrap();

        let s = session.clone();
        let run = tokio::spawn(async move { s.run(mic, rx).await });

        loop {
            watch.changed().await.unwrap();
            if *watch.borrow() == SessionStatus::Connected {
                break;
            }
        }

        tx.send(TransportEvent::Closed).await.unwrap();
        run.await.unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_mic_frames_arrive_encoded() {
        let transport = FakeTransport::new();
        let session = session(transport.clone());
        let (mic, _, _) = FakeMic::with_frames(vec![vec![0.5; 4]]);
        let (tx, rx) = mpsc::channel(4);
        tx.send(TransportEvent::Opened).await.unwrap();

        let s = session.clone();
        let run = tokio::spawn(async move { s.run(mic, rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(TransportEvent::Closed).await.unwrap();
        run.await.unwrap().unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mime_type, "audio/pcm;rate=16000");
        let bytes = BASE64_STANDARD.decode(&sent[0].data).unwrap();
        assert_eq!(bytes.len(), 8);
    }
}
