//! Session lifecycle: which source is running, and how it is started and stopped.
//!
//! The controller is the only owner of session state. It moves between
//! `Idle` and `Running` exclusively through `start_*`, `stop` and the reaping
//! of a worker that reached the end of its stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::config::BeaconConfig;
use crate::detect::DetectorBackend;
use crate::ingest::{
    CameraConfig, CameraSource, FileConfig, FileSource, FrameSource, SourceKind,
};
use crate::mailbox::Mailbox;
use crate::mapper::StripMapper;
use crate::pipeline::{FrameLoop, LoopExit, LoopSummary, SharedReporter};
use crate::render::{Renderer, Viewport};
use crate::report::{DeviceReporter, ReportStats};

/// What the status indicator shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running(SourceKind),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => f.write_str("Idle"),
            Status::Running(SourceKind::Camera) => f.write_str("Detecting (Webcam)"),
            Status::Running(SourceKind::Sample) => f.write_str("Playing Sample Video"),
        }
    }
}

/// Result of a start request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A session was already running; nothing changed.
    AlreadyRunning,
}

/// A finished session, kept for the status display.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub kind: SourceKind,
    pub source: String,
    pub exit: LoopExit,
    /// Frames captured from the source.
    pub frames: u64,
    /// Frames that went through detection and rendering.
    pub processed: u64,
    pub duration: Duration,
}

struct Session {
    id: u64,
    kind: SourceKind,
    source: String,
    stop: Arc<AtomicBool>,
    worker: JoinHandle<LoopSummary>,
    started_at: Instant,
}

enum State {
    Idle,
    Running(Session),
}

/// Owns the running session and the collaborators shared across sessions.
pub struct Controller {
    state: State,
    frame_loop: FrameLoop,
    reporter: SharedReporter,
    display: Arc<Mailbox<RgbImage>>,
    camera: CameraConfig,
    sample_path: String,
    stop_grace: Duration,
    next_session_id: u64,
    last_session: Option<SessionRecord>,
}

impl Controller {
    pub fn new(
        config: &BeaconConfig,
        detector: Box<dyn DetectorBackend>,
        reporter: DeviceReporter,
    ) -> Result<Self> {
        let mapper = StripMapper::new(config.strip.led_count, &config.strip.target_label)?;
        log::info!(
            "mapping '{}' detections onto {} LEDs",
            mapper.keyword(),
            mapper.led_count()
        );
        let renderer = Renderer::new(
            mapper.clone(),
            Viewport::new(
                config.display.viewport_width,
                config.display.viewport_height,
            ),
        )?;
        let reporter = Arc::new(Mutex::new(reporter));
        let display = Arc::new(Mailbox::new());
        let frame_loop = FrameLoop::new(
            Arc::new(Mutex::new(detector)),
            Arc::clone(&reporter),
            mapper,
            renderer,
            Arc::clone(&display),
        );

        Ok(Self {
            state: State::Idle,
            frame_loop,
            reporter,
            display,
            camera: config.camera.clone(),
            sample_path: config.sample_path.clone(),
            stop_grace: config.stop_grace,
            next_session_id: 1,
            last_session: None,
        })
    }

    /// Mailbox the display drains; holds at most the newest rendered frame.
    pub fn display(&self) -> Arc<Mailbox<RgbImage>> {
        Arc::clone(&self.display)
    }

    /// Current state, after tearing down a worker that ran out of frames.
    pub fn status(&mut self) -> Status {
        self.reap_finished();
        match &self.state {
            State::Idle => Status::Idle,
            State::Running(session) => Status::Running(session.kind),
        }
    }

    /// Identifier of the running session, if any.
    pub fn session_id(&self) -> Option<u64> {
        match &self.state {
            State::Idle => None,
            State::Running(session) => Some(session.id),
        }
    }

    /// Location of the running source, if any.
    pub fn active_source(&self) -> Option<&str> {
        match &self.state {
            State::Idle => None,
            State::Running(session) => Some(&session.source),
        }
    }

    pub fn last_session(&self) -> Option<&SessionRecord> {
        self.last_session.as_ref()
    }

    pub fn reporter_stats(&self) -> ReportStats {
        self.reporter
            .lock()
            .map(|reporter| reporter.stats())
            .unwrap_or_default()
    }

    pub fn reporting_enabled(&self) -> bool {
        self.reporter
            .lock()
            .map(|reporter| reporter.is_enabled())
            .unwrap_or(false)
    }

    /// Start detecting from the webcam. Fails, staying idle, when no camera opens.
    pub fn start_camera(&mut self) -> Result<StartOutcome> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        let source = CameraSource::open(self.camera.clone())?;
        self.spawn(SourceKind::Camera, Box::new(source))
    }

    /// Start detecting on the configured sample video.
    pub fn start_sample(&mut self) -> Result<StartOutcome> {
        let path = self.sample_path.clone();
        self.start_sample_from(&path)
    }

    /// Start detecting on a specific video file.
    pub fn start_sample_from(&mut self, path: &str) -> Result<StartOutcome> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        let source = FileSource::open(FileConfig {
            path: path.to_string(),
        })
        .with_context(|| format!("could not open sample video '{}'", path))?;
        self.spawn(SourceKind::Sample, Box::new(source))
    }

    /// Stop the running session. Returns false when there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => false,
            State::Running(session) => {
                self.teardown(session);
                true
            }
        }
    }

    fn is_running(&mut self) -> bool {
        self.reap_finished();
        matches!(self.state, State::Running(_))
    }

    fn spawn(&mut self, kind: SourceKind, mut source: Box<dyn FrameSource>) -> Result<StartOutcome> {
        let id = self.next_session_id;
        let stop = Arc::new(AtomicBool::new(false));
        let description = source.describe();
        let frame_loop = self.frame_loop.clone();
        let worker_stop = Arc::clone(&stop);

        let worker = std::thread::Builder::new()
            .name(format!("frame-loop-{}", id))
            .spawn(move || frame_loop.run(source.as_mut(), &worker_stop))
            .context("spawn frame loop worker")?;

        self.next_session_id += 1;
        log::info!("session {} started: {} from {}", id, kind, description);
        self.state = State::Running(Session {
            id,
            kind,
            source: description,
            stop,
            worker,
            started_at: Instant::now(),
        });
        Ok(StartOutcome::Started)
    }

    fn reap_finished(&mut self) {
        let finished = matches!(&self.state, State::Running(session) if session.worker.is_finished());
        if finished {
            self.stop();
        }
    }

    /// Shared by explicit stops and end of stream.
    fn teardown(&mut self, session: Session) {
        session.stop.store(true, Ordering::SeqCst);
        if !session.worker.is_finished() {
            // Let the worker see the flag and finish its current iteration.
            std::thread::sleep(self.stop_grace);
        }

        // Joining drops the worker's source, releasing the capture device.
        let (exit, frames, processed) = match session.worker.join() {
            Ok(summary) => (summary.exit, summary.captured, summary.counters.frames),
            Err(_) => {
                log::error!("session {} worker panicked", session.id);
                (LoopExit::Stopped, 0, 0)
            }
        };
        self.display.clear();

        let record = SessionRecord {
            kind: session.kind,
            source: session.source,
            exit,
            frames,
            processed,
            duration: session.started_at.elapsed(),
        };
        log::info!(
            "session {} finished: {} from {} ({:?}, {} captured, {} processed)",
            session.id,
            record.kind,
            record.source,
            record.exit,
            record.frames,
            record.processed
        );
        self.last_session = Some(record);
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}
