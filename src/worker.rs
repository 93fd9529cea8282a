//! Transcription worker thread
//!
//! A single worker owns the engine and the output chain. Finished
//! recordings arrive over a bounded channel so a slow transcription can
//! never pile up unbounded work: the queue holds at most
//! [`JOB_QUEUE_CAPACITY`] jobs and producers drop on overflow.
//!
//! The worker polls with a short timeout instead of blocking forever,
//! so it notices a dropped channel promptly, and it treats any per-job
//! failure as non-fatal: log, recover, keep serving.

use crate::audio::feedback::{FeedbackHandle, SoundCue};
use crate::notification::StatusObserver;
use crate::output::{self, OutputSink};
use crate::state::AudioBuffer;
use crate::transcribe::Engine;
use crate::window::WindowContext;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Maximum queued recordings awaiting transcription
pub const JOB_QUEUE_CAPACITY: usize = 2;

/// How often the worker wakes up when no jobs are pending
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// A finished recording ready for transcription
pub struct TranscriptionJob {
    pub audio: AudioBuffer,
    pub window: Option<WindowContext>,
}

/// Messages accepted by the worker
pub enum WorkerMessage {
    Job(TranscriptionJob),
    /// Sentinel asking the worker to exit promptly
    Shutdown,
}

/// Create the bounded job channel shared by the hotkey path and the worker
pub fn job_channel() -> (Sender<WorkerMessage>, Receiver<WorkerMessage>) {
    bounded(JOB_QUEUE_CAPACITY)
}

/// Everything the worker needs to process jobs
pub struct WorkerContext {
    pub engine: Box<dyn Engine>,
    pub sinks: Vec<Box<dyn OutputSink>>,
    pub sample_rate: u32,
    pub feedback: Option<FeedbackHandle>,
    pub observer: Option<Arc<dyn StatusObserver>>,
}

/// Handle to the running worker thread
pub struct WorkerHandle {
    thread: thread::JoinHandle<()>,
    done_rx: Receiver<()>,
}

impl WorkerHandle {
    /// Wait up to `timeout` for the worker to finish, then join it.
    /// Returns false if the worker was still busy when time ran out
    /// (the thread is left running and detached).
    pub fn join(self, timeout: Duration) -> bool {
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// Start the worker thread
pub fn spawn(rx: Receiver<WorkerMessage>, ctx: WorkerContext) -> std::io::Result<WorkerHandle> {
    let (done_tx, done_rx) = bounded(1);

    let thread = thread::Builder::new()
        .name("taptype-worker".into())
        .spawn(move || {
            worker_loop(rx, ctx);
            let _ = done_tx.send(());
        })?;

    Ok(WorkerHandle { thread, done_rx })
}

fn worker_loop(rx: Receiver<WorkerMessage>, ctx: WorkerContext) {
    tracing::debug!("Transcription worker started");

    loop {
        match rx.recv_timeout(POLL_TIMEOUT) {
            Ok(WorkerMessage::Job(job)) => process_job(&ctx, job),
            Ok(WorkerMessage::Shutdown) => {
                tracing::debug!("Worker received shutdown sentinel");
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Job channel closed, worker exiting");
                break;
            }
        }
    }

    tracing::debug!("Transcription worker stopped");
}

/// Process one recording. Never panics the worker: every failure is
/// logged and the loop continues with the next job.
fn process_job(ctx: &WorkerContext, job: TranscriptionJob) {
    let text = match ctx.engine.transcribe(&job.audio, ctx.sample_rate) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Transcription failed: {}", e);
            if let Some(fb) = &ctx.feedback {
                fb.play(SoundCue::Error);
            }
            return;
        }
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        tracing::info!("No speech detected in recording");
        if let Some(fb) = &ctx.feedback {
            fb.play(SoundCue::NoSpeech);
        }
        if let Some(observer) = &ctx.observer {
            observer.on_no_speech();
        }
        return;
    }

    match output::deliver_with_fallback(&ctx.sinks, trimmed, job.window.as_ref()) {
        Ok(()) => {
            if let Some(observer) = &ctx.observer {
                observer.on_transcription_complete(trimmed);
            }
        }
        Err(e) => {
            tracing::error!("Failed to output text: {}", e);
            if let Some(fb) = &ctx.feedback {
                fb.play(SoundCue::Error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OutputError, TranscribeError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedEngine {
        // Pops from the front on each call
        results: Mutex<Vec<Result<String, TranscribeError>>>,
    }

    impl ScriptedEngine {
        fn new(results: Vec<Result<String, TranscribeError>>) -> Self {
            Self {
                results: Mutex::new(results),
            }
        }
    }

    impl Engine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn load_model(&mut self) -> Result<(), TranscribeError> {
            Ok(())
        }
        fn transcribe(&self, _samples: &[f32], _rate: u32) -> Result<String, TranscribeError> {
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(String::new())
            } else {
                results.remove(0)
            }
        }
    }

    struct CollectingSink {
        delivered: Arc<Mutex<Vec<String>>>,
    }

    impl OutputSink for CollectingSink {
        fn deliver(&self, text: &str, _window: Option<&WindowContext>) -> Result<(), OutputError> {
            self.delivered.lock().unwrap().push(text.to_string());
            Ok(())
        }
        fn is_available(&self) -> bool {
            true
        }
        fn name(&self) -> &'static str {
            "collecting"
        }
    }

    struct CountingObserver {
        completed: AtomicUsize,
        no_speech: AtomicUsize,
    }

    impl StatusObserver for CountingObserver {
        fn on_transcription_complete(&self, _text: &str) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_no_speech(&self) {
            self.no_speech.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn job(samples: usize) -> TranscriptionJob {
        TranscriptionJob {
            audio: vec![0.1; samples],
            window: None,
        }
    }

    fn spawn_worker(
        engine_results: Vec<Result<String, TranscribeError>>,
    ) -> (
        Sender<WorkerMessage>,
        WorkerHandle,
        Arc<Mutex<Vec<String>>>,
        Arc<CountingObserver>,
    ) {
        let (tx, rx) = job_channel();
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let observer = Arc::new(CountingObserver {
            completed: AtomicUsize::new(0),
            no_speech: AtomicUsize::new(0),
        });

        let ctx = WorkerContext {
            engine: Box::new(ScriptedEngine::new(engine_results)),
            sinks: vec![Box::new(CollectingSink {
                delivered: delivered.clone(),
            })],
            sample_rate: 16000,
            feedback: None,
            observer: Some(observer.clone() as Arc<dyn StatusObserver>),
        };

        let handle = spawn(rx, ctx).unwrap();
        (tx, handle, delivered, observer)
    }

    #[test]
    fn test_worker_delivers_transcribed_text() {
        let (tx, handle, delivered, observer) = spawn_worker(vec![Ok("hello world".into())]);

        tx.send(WorkerMessage::Job(job(16000))).unwrap();
        tx.send(WorkerMessage::Shutdown).unwrap();
        assert!(handle.join(Duration::from_secs(5)));

        assert_eq!(*delivered.lock().unwrap(), vec!["hello world".to_string()]);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
        assert_eq!(observer.no_speech.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_worker_signals_no_speech_for_empty_text() {
        let (tx, handle, delivered, observer) = spawn_worker(vec![Ok("   ".into())]);

        tx.send(WorkerMessage::Job(job(16000))).unwrap();
        tx.send(WorkerMessage::Shutdown).unwrap();
        assert!(handle.join(Duration::from_secs(5)));

        assert!(delivered.lock().unwrap().is_empty());
        assert_eq!(observer.no_speech.load(Ordering::SeqCst), 1);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_worker_survives_engine_errors() {
        let (tx, handle, delivered, observer) = spawn_worker(vec![
            Err(TranscribeError::InferenceFailed("boom".into())),
            Ok("still alive".into()),
        ]);

        tx.send(WorkerMessage::Job(job(16000))).unwrap();
        tx.send(WorkerMessage::Job(job(16000))).unwrap();
        tx.send(WorkerMessage::Shutdown).unwrap();
        assert!(handle.join(Duration::from_secs(5)));

        assert_eq!(*delivered.lock().unwrap(), vec!["still alive".to_string()]);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_exits_when_channel_drops() {
        let (tx, handle, _delivered, _observer) = spawn_worker(vec![]);
        drop(tx);
        assert!(handle.join(Duration::from_secs(5)));
    }

    #[test]
    fn test_queue_capacity_is_bounded() {
        let (tx, _rx) = job_channel();
        assert!(tx.try_send(WorkerMessage::Job(job(10))).is_ok());
        assert!(tx.try_send(WorkerMessage::Job(job(10))).is_ok());
        // Third enqueue overflows the bounded queue
        assert!(tx.try_send(WorkerMessage::Job(job(10))).is_err());
    }
}
