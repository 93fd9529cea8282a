//! Daemon coordination
//!
//! Wires the hotkey listener, recorder, transcription worker, and
//! output chain together. The core is [`Controller`]: a mutex-guarded
//! two-state machine (Idle / Recording) that hotkey threads, the signal
//! flag, and the watchdog all drive through the same transitions.
//!
//! Locking discipline: the controller mutex covers only state
//! transitions and recorder handoff. Enqueueing, sound cues, and
//! notifications happen after the guard is released, so transcription
//! latency never blocks the next hotkey press.

use crate::audio::feedback::{self, FeedbackHandle, SoundCue};
use crate::audio::{self, Recorder};
use crate::config::Config;
use crate::error::{AudioError, Result};
use crate::hotkey::{self, HotkeyCallbacks, HotkeyListener};
use crate::notification::{DesktopNotifier, StatusObserver};
use crate::output;
use crate::state::{DaemonState, RecordingSession};
use crate::transcribe;
use crate::window;
use crate::worker::{self, TranscriptionJob, WorkerHandle, WorkerMessage};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Main loop cadence; also bounds how late the watchdog can fire
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// How far ahead of the duration limit the warning sound plays
const WARNING_LEAD: Duration = Duration::from_secs(30);

/// How long shutdown waits for an in-flight transcription
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

// Set from signal handlers; the main loop polls them every tick.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static TOGGLE_REQUESTED: AtomicBool = AtomicBool::new(false);

/// State guarded by the controller mutex
struct RecordingSlot {
    state: DaemonState,
    session: Option<RecordingSession>,
    recorder: Box<dyn Recorder>,
}

/// Shared recording state machine.
///
/// Cloned (via Arc) into the hotkey callbacks; every transition runs
/// under the slot mutex so concurrent press/release/watchdog events
/// serialize cleanly.
pub struct Controller {
    max_duration: Duration,
    slot: Mutex<RecordingSlot>,
    jobs: Sender<WorkerMessage>,
    feedback: Option<FeedbackHandle>,
    observer: Option<Arc<dyn StatusObserver>>,
}

impl Controller {
    pub fn new(
        max_duration: Duration,
        recorder: Box<dyn Recorder>,
        jobs: Sender<WorkerMessage>,
        feedback: Option<FeedbackHandle>,
        observer: Option<Arc<dyn StatusObserver>>,
    ) -> Self {
        Self {
            max_duration,
            slot: Mutex::new(RecordingSlot {
                state: DaemonState::Idle,
                session: None,
                recorder,
            }),
            jobs,
            feedback,
            observer,
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, RecordingSlot> {
        // A poisoned mutex means a callback panicked mid-transition;
        // the slot data is still coherent enough to keep serving.
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> DaemonState {
        self.lock_slot().state
    }

    /// Hotkey pressed (push-to-talk) or toggle decided to start
    pub fn on_recording_start(&self) {
        let mut slot = self.lock_slot();

        if slot.state == DaemonState::Recording {
            tracing::debug!("Already recording, ignoring start");
            return;
        }

        // Remember where the user was typing before any focus change
        let win = window::active_window();

        match slot.recorder.start() {
            Ok(()) => {
                slot.state = DaemonState::Recording;
                slot.session = Some(RecordingSession::begin(win));
                drop(slot);

                tracing::info!("Recording started");
                if let Some(fb) = &self.feedback {
                    fb.play(SoundCue::RecordingStart);
                }
                if let Some(observer) = &self.observer {
                    observer.on_recording_start();
                }
            }
            Err(e) => {
                drop(slot);
                tracing::error!("Failed to start recording: {}", e);
                if let Some(fb) = &self.feedback {
                    fb.play(SoundCue::Error);
                }
            }
        }
    }

    /// Hotkey released (push-to-talk), toggle stop, or watchdog auto-stop
    pub fn on_recording_stop(&self) {
        let (audio, win) = {
            let mut slot = self.lock_slot();

            if slot.state == DaemonState::Idle {
                tracing::debug!("Not recording, ignoring stop");
                return;
            }

            slot.state = DaemonState::Idle;
            let session = slot.session.take();
            let audio = slot.recorder.stop();
            (audio, session.and_then(|s| s.window))
        };

        tracing::info!("Recording stopped ({} samples)", audio.len());
        if let Some(fb) = &self.feedback {
            fb.play(SoundCue::RecordingStop);
        }
        if let Some(observer) = &self.observer {
            observer.on_recording_stop();
        }

        if audio.is_empty() {
            tracing::warn!("No audio captured");
            if let Some(fb) = &self.feedback {
                fb.play(SoundCue::NoSpeech);
            }
            if let Some(observer) = &self.observer {
                observer.on_no_speech();
            }
            return;
        }

        // Non-blocking enqueue: when the worker is two recordings
        // behind, this one is dropped rather than stalling the hotkey.
        match self.jobs.try_send(WorkerMessage::Job(TranscriptionJob {
            audio,
            window: win,
        })) {
            Ok(()) => tracing::debug!("Recording queued for transcription"),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Transcription queue full, dropping recording");
                if let Some(fb) = &self.feedback {
                    fb.play(SoundCue::Error);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Transcription worker gone, dropping recording");
            }
        }
    }

    /// Toggle-mode hotkey press: decide start or stop from actual state,
    /// so a watchdog auto-stop cannot leave the toggle inverted.
    pub fn on_toggle(&self) {
        match self.state() {
            DaemonState::Idle => self.on_recording_start(),
            DaemonState::Recording => self.on_recording_stop(),
        }
    }

    /// Called every tick: warn ahead of the duration limit, auto-stop at it
    pub fn check_max_recording_time(&self) {
        let elapsed = {
            let slot = self.lock_slot();
            match (slot.state, &slot.session) {
                (DaemonState::Recording, Some(session)) => session.started_at.elapsed(),
                _ => return,
            }
        };
        self.watchdog_tick(elapsed);
    }

    fn watchdog_tick(&self, elapsed: Duration) {
        if elapsed >= self.max_duration {
            tracing::warn!(
                "Recording reached the {}s limit, stopping automatically",
                self.max_duration.as_secs()
            );
            self.on_recording_stop();
            return;
        }

        // Warn once per session, and only when the limit leaves room
        // for a meaningful warning.
        if self.max_duration > WARNING_LEAD && elapsed >= self.max_duration - WARNING_LEAD {
            let fire = {
                let mut slot = self.lock_slot();
                match (slot.state, slot.session.as_mut()) {
                    (DaemonState::Recording, Some(session)) if !session.warned => {
                        session.warned = true;
                        true
                    }
                    _ => false,
                }
            };

            if fire {
                tracing::warn!(
                    "Recording will auto-stop in {}s",
                    (self.max_duration - elapsed).as_secs()
                );
                if let Some(fb) = &self.feedback {
                    fb.play(SoundCue::Warning);
                }
            }
        }
    }

    /// Shutdown path: stop the recorder if a recording is in flight
    /// and discard the audio.
    pub fn force_idle(&self) {
        let mut slot = self.lock_slot();
        if slot.state == DaemonState::Recording {
            tracing::warn!("Discarding in-flight recording on shutdown");
            let _ = slot.recorder.stop();
            slot.state = DaemonState::Idle;
            slot.session = None;
        }
    }

    /// Ask the worker to exit. Best-effort: a full queue still ends in a
    /// prompt exit because the worker polls with a timeout.
    pub fn request_worker_shutdown(&self) {
        let _ = self.jobs.try_send(WorkerMessage::Shutdown);
    }
}

/// The daemon process: owns the controller, worker, and hotkey listener
pub struct Daemon {
    config: Config,
    controller: Option<Arc<Controller>>,
    worker: Option<WorkerHandle>,
    listener: Option<Box<dyn HotkeyListener>>,
    running: Arc<AtomicBool>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            controller: None,
            worker: None,
            listener: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the daemon until a shutdown signal arrives.
    ///
    /// Any initialization failure is fatal and returns before the main
    /// loop; `stop` runs on every exit path, clean or not.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_inner();
        self.stop();
        result
    }

    fn run_inner(&mut self) -> Result<()> {
        tracing::info!("Starting taptype daemon v{}", env!("CARGO_PKG_VERSION"));

        // Collaborators: any failure here aborts startup
        let recorder = audio::create_recorder(&self.config.audio)?;
        if !recorder.is_available() {
            return Err(AudioError::NoInputDevice.into());
        }

        let mut engine = transcribe::create_engine(&self.config.engine)?;
        engine.load_model()?;

        let sinks = output::create_sink_chain(&self.config.output);
        let feedback = feedback::spawn(&self.config.audio.feedback);
        let observer: Arc<dyn StatusObserver> = Arc::new(DesktopNotifier::new(
            self.config.output.notification.clone(),
        ));
        let mut listener = hotkey::create_listener(&self.config.hotkey)?;

        let (jobs_tx, jobs_rx) = worker::job_channel();

        let controller = Arc::new(Controller::new(
            self.config.audio.max_duration(),
            recorder,
            jobs_tx,
            feedback.clone(),
            Some(observer.clone()),
        ));
        self.controller = Some(controller.clone());

        let worker_handle = worker::spawn(
            jobs_rx,
            worker::WorkerContext {
                engine,
                sinks,
                sample_rate: self.config.audio.sample_rate,
                feedback,
                observer: Some(observer),
            },
        )?;
        self.worker = Some(worker_handle);

        // Hotkey listener last: once it starts, callbacks can fire
        let callbacks = HotkeyCallbacks {
            on_activate: {
                let c = controller.clone();
                Arc::new(move || c.on_recording_start())
            },
            on_deactivate: {
                let c = controller.clone();
                Arc::new(move || c.on_recording_stop())
            },
            on_toggle: {
                let c = controller.clone();
                Arc::new(move || c.on_toggle())
            },
        };
        listener.start(callbacks)?;
        self.listener = Some(listener);

        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
        TOGGLE_REQUESTED.store(false, Ordering::SeqCst);
        install_signal_handlers();

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Daemon ready: hold {} to record ({:?} mode)",
            self.config.hotkey.key,
            self.config.hotkey.mode
        );

        while self.running.load(Ordering::SeqCst) && !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            if TOGGLE_REQUESTED.swap(false, Ordering::SeqCst) {
                controller.on_toggle();
            }
            controller.check_max_recording_time();
            std::thread::sleep(TICK_INTERVAL);
        }

        tracing::info!("Shutdown requested");
        Ok(())
    }

    /// Tear everything down. Safe to call multiple times and after a
    /// partial startup.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            if let Some(controller) = &self.controller {
                controller.request_worker_shutdown();
            }
            if !worker.join(WORKER_JOIN_TIMEOUT) {
                tracing::warn!(
                    "Worker still transcribing after {:?}, detaching it",
                    WORKER_JOIN_TIMEOUT
                );
            }
        }

        if let Some(controller) = &self.controller {
            controller.force_idle();
        }

        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }

        if self.controller.take().is_some() {
            tracing::info!("Daemon stopped");
        }
    }
}

#[cfg(unix)]
extern "C" fn handle_shutdown_signal(_: nix::libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
extern "C" fn handle_toggle_signal(_: nix::libc::c_int) {
    TOGGLE_REQUESTED.store(true, Ordering::SeqCst);
}

/// SIGTERM/SIGINT request shutdown; SIGUSR1 toggles recording (for
/// compositor keybindings). Failure to install is logged and ignored.
#[cfg(unix)]
fn install_signal_handlers() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let shutdown = SigAction::new(
        SigHandler::Handler(handle_shutdown_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let toggle = SigAction::new(
        SigHandler::Handler(handle_toggle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    for (signal, action) in [
        (Signal::SIGTERM, &shutdown),
        (Signal::SIGINT, &shutdown),
        (Signal::SIGUSR1, &toggle),
    ] {
        if let Err(e) = unsafe { sigaction(signal, action) } {
            tracing::debug!("Failed to install {} handler: {}", signal, e);
        }
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {
    tracing::debug!("Signal handlers not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HotkeyError, OutputError, TranscribeError};
    use crate::output::OutputSink;
    use crate::transcribe::Engine;
    use crate::window::WindowContext;
    use crate::worker::job_channel;
    use crossbeam_channel::Receiver;
    use std::sync::atomic::AtomicUsize;

    struct MockRecorder {
        samples: Vec<f32>,
        fail_start: bool,
        started: Arc<AtomicBool>,
        stops: Arc<AtomicUsize>,
    }

    impl MockRecorder {
        fn with_samples(n: usize) -> Self {
            Self {
                samples: vec![0.1; n],
                fail_start: false,
                started: Arc::new(AtomicBool::new(false)),
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Recorder for MockRecorder {
        fn is_available(&self) -> bool {
            true
        }

        fn start(&mut self) -> std::result::Result<(), AudioError> {
            if self.fail_start {
                return Err(AudioError::NoInputDevice);
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Vec<f32> {
            self.started.store(false, Ordering::SeqCst);
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.samples.clone()
        }
    }

    fn controller_with(
        recorder: MockRecorder,
        max: Duration,
    ) -> (Controller, Receiver<WorkerMessage>) {
        let (tx, rx) = job_channel();
        (
            Controller::new(max, Box::new(recorder), tx, None, None),
            rx,
        )
    }

    fn queued_jobs(rx: &Receiver<WorkerMessage>) -> usize {
        let mut count = 0;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, WorkerMessage::Job(_)) {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_start_stop_queues_job() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        controller.on_recording_start();
        assert_eq!(controller.state(), DaemonState::Recording);

        controller.on_recording_stop();
        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 1);
    }

    #[test]
    fn test_start_while_recording_is_noop() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        controller.on_recording_start();
        controller.on_recording_start();
        assert_eq!(controller.state(), DaemonState::Recording);

        controller.on_recording_stop();
        assert_eq!(queued_jobs(&rx), 1);
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        controller.on_recording_stop();
        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 0);
    }

    #[test]
    fn test_failed_recorder_start_stays_idle() {
        let mut recorder = MockRecorder::with_samples(16000);
        recorder.fail_start = true;
        let (controller, rx) = controller_with(recorder, Duration::from_secs(60));

        controller.on_recording_start();
        assert_eq!(controller.state(), DaemonState::Idle);

        // State must stay consistent for the next attempt
        controller.on_recording_stop();
        assert_eq!(queued_jobs(&rx), 0);
    }

    #[test]
    fn test_empty_audio_skips_queue() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(0),
            Duration::from_secs(60),
        );

        controller.on_recording_start();
        controller.on_recording_stop();
        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 0);
    }

    #[test]
    fn test_queue_overflow_drops_without_blocking() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        // Nothing drains the queue; the third recording must be dropped
        for _ in 0..3 {
            controller.on_recording_start();
            controller.on_recording_stop();
        }

        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 2);
    }

    #[test]
    fn test_toggle_alternates() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        controller.on_toggle();
        assert_eq!(controller.state(), DaemonState::Recording);
        controller.on_toggle();
        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 1);
    }

    #[test]
    fn test_watchdog_warns_once_then_auto_stops() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        controller.on_recording_start();

        // Before the warning window
        controller.watchdog_tick(Duration::from_secs(29));
        assert!(!controller.lock_slot().session.as_ref().unwrap().warned);

        // Inside the warning window: latch fires
        controller.watchdog_tick(Duration::from_millis(30_050));
        assert!(controller.lock_slot().session.as_ref().unwrap().warned);
        assert_eq!(controller.state(), DaemonState::Recording);

        // Later ticks in the window do not re-fire (latched)
        controller.watchdog_tick(Duration::from_secs(45));
        assert!(controller.lock_slot().session.as_ref().unwrap().warned);

        // At the limit: auto-stop
        controller.watchdog_tick(Duration::from_secs(60));
        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 1);
    }

    #[test]
    fn test_watchdog_short_limit_never_warns() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(10),
        );

        controller.on_recording_start();

        controller.watchdog_tick(Duration::from_secs(5));
        assert!(!controller.lock_slot().session.as_ref().unwrap().warned);
        assert_eq!(controller.state(), DaemonState::Recording);

        controller.watchdog_tick(Duration::from_secs(10));
        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 1);
    }

    #[test]
    fn test_warning_resets_per_session() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        controller.on_recording_start();
        controller.watchdog_tick(Duration::from_secs(31));
        assert!(controller.lock_slot().session.as_ref().unwrap().warned);
        controller.on_recording_stop();

        // New session starts with a clean latch
        controller.on_recording_start();
        assert!(!controller.lock_slot().session.as_ref().unwrap().warned);
        let _ = queued_jobs(&rx);
    }

    struct NullEngine;

    impl Engine for NullEngine {
        fn name(&self) -> &'static str {
            "null"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn load_model(&mut self) -> std::result::Result<(), TranscribeError> {
            Ok(())
        }
        fn transcribe(
            &self,
            _samples: &[f32],
            _rate: u32,
        ) -> std::result::Result<String, TranscribeError> {
            Ok(String::new())
        }
    }

    struct NullSink;

    impl OutputSink for NullSink {
        fn deliver(
            &self,
            _text: &str,
            _window: Option<&WindowContext>,
        ) -> std::result::Result<(), OutputError> {
            Ok(())
        }
        fn is_available(&self) -> bool {
            true
        }
        fn name(&self) -> &'static str {
            "null"
        }
    }

    struct MockListener {
        stops: Arc<AtomicUsize>,
    }

    impl HotkeyListener for MockListener {
        fn start(&mut self, _callbacks: HotkeyCallbacks) -> std::result::Result<(), HotkeyError> {
            Ok(())
        }
        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_daemon_stop_is_idempotent() {
        let mut daemon = Daemon::new(Config::default());

        // Populate the fields run_inner would have filled
        let (tx, rx) = job_channel();
        daemon.controller = Some(Arc::new(Controller::new(
            Duration::from_secs(60),
            Box::new(MockRecorder::with_samples(0)),
            tx,
            None,
            None,
        )));
        daemon.worker = Some(
            worker::spawn(
                rx,
                worker::WorkerContext {
                    engine: Box::new(NullEngine),
                    sinks: vec![Box::new(NullSink)],
                    sample_rate: 16000,
                    feedback: None,
                    observer: None,
                },
            )
            .unwrap(),
        );
        let listener_stops = Arc::new(AtomicUsize::new(0));
        daemon.listener = Some(Box::new(MockListener {
            stops: listener_stops.clone(),
        }));

        daemon.stop();
        assert!(daemon.worker.is_none());
        assert!(daemon.controller.is_none());
        assert!(daemon.listener.is_none());
        assert_eq!(listener_stops.load(Ordering::SeqCst), 1);

        // Second stop: every branch is already taken, same end state
        daemon.stop();
        assert!(daemon.worker.is_none());
        assert!(daemon.controller.is_none());
        assert!(daemon.listener.is_none());
        assert_eq!(listener_stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_daemon_stop_before_run_is_safe() {
        let mut daemon = Daemon::new(Config::default());
        daemon.stop();
        daemon.stop();
        assert!(daemon.worker.is_none());
        assert!(daemon.controller.is_none());
        assert!(daemon.listener.is_none());
    }

    #[test]
    fn test_force_idle_discards_recording() {
        let (controller, rx) = controller_with(
            MockRecorder::with_samples(16000),
            Duration::from_secs(60),
        );

        controller.on_recording_start();
        controller.force_idle();
        assert_eq!(controller.state(), DaemonState::Idle);
        assert_eq!(queued_jobs(&rx), 0);

        // Idempotent
        controller.force_idle();
        assert_eq!(controller.state(), DaemonState::Idle);
    }
}
