//! The per-frame loop: capture, detect, map, report, render.
//!
//! Nothing that goes wrong inside one iteration ends the loop. Only the stop
//! flag (checked at the top of each iteration) or the end of the stream does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::RgbImage;

use crate::detect::DetectorBackend;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::mailbox::Mailbox;
use crate::mapper::{DeviceIndex, StripMapper};
use crate::render::Renderer;
use crate::report::{DeviceReporter, ReportOutcome};

pub type SharedDetector = Arc<Mutex<Box<dyn DetectorBackend>>>;
pub type SharedReporter = Arc<Mutex<DeviceReporter>>;

/// Why a frame loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    EndOfStream,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopCounters {
    pub frames: u64,
    pub detector_errors: u64,
    pub reports_sent: u64,
    pub reports_failed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub counters: LoopCounters,
    /// Frames the source produced, as reported by the source itself.
    pub captured: u64,
}

/// Result of pushing one frame through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameOutcome {
    pub detections: usize,
    /// `None` when detection failed and nothing was sent for this frame.
    pub indices: Option<Vec<DeviceIndex>>,
    pub report: Option<ReportOutcome>,
}

/// Everything one worker needs to process frames.
#[derive(Clone)]
pub struct FrameLoop {
    detector: SharedDetector,
    reporter: SharedReporter,
    mapper: StripMapper,
    renderer: Arc<Renderer>,
    display: Arc<Mailbox<RgbImage>>,
}

impl FrameLoop {
    pub fn new(
        detector: SharedDetector,
        reporter: SharedReporter,
        mapper: StripMapper,
        renderer: Renderer,
        display: Arc<Mailbox<RgbImage>>,
    ) -> Self {
        Self {
            detector,
            reporter,
            mapper,
            renderer: Arc::new(renderer),
            display,
        }
    }

    /// Run until `stop` is raised or the source runs dry. A read error is
    /// treated like the end of the stream.
    pub fn run(&self, source: &mut dyn FrameSource, stop: &AtomicBool) -> LoopSummary {
        let started = Instant::now();
        let mut counters = LoopCounters::default();

        let exit = loop {
            if stop.load(Ordering::SeqCst) {
                break LoopExit::Stopped;
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break LoopExit::EndOfStream,
                Err(err) => {
                    log::warn!("frame read from {} failed: {:#}", source.describe(), err);
                    break LoopExit::EndOfStream;
                }
            };

            let outcome = self.process_frame(&frame);
            counters.frames += 1;
            match outcome.report {
                Some(ReportOutcome::Sent) => counters.reports_sent += 1,
                Some(ReportOutcome::Failed) => counters.reports_failed += 1,
                Some(ReportOutcome::Disabled) => {}
                None => counters.detector_errors += 1,
            }
        };

        log::info!(
            "frame loop on {} ended ({:?}) after {} frames in {:.1}s",
            source.describe(),
            exit,
            counters.frames,
            started.elapsed().as_secs_f64()
        );
        LoopSummary {
            exit,
            counters,
            captured: source.frames_captured(),
        }
    }

    /// Detect, report and render a single frame.
    pub fn process_frame(&self, frame: &Frame) -> FrameOutcome {
        let detections = match self.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                // A failed inference is not an empty frame: send nothing rather than a clear.
                log::warn!("detection failed: {:#}", err);
                self.display.post(self.renderer.render(frame, &[]));
                return FrameOutcome {
                    detections: 0,
                    indices: None,
                    report: None,
                };
            }
        };

        let indices = match self.mapper.map(&detections, frame.width) {
            Ok(indices) => indices,
            Err(err) => {
                log::warn!("index mapping failed: {:#}", err);
                Vec::new()
            }
        };
        let report = self.report(&indices);

        self.display.post(self.renderer.render(frame, &detections));

        FrameOutcome {
            detections: detections.len(),
            indices: Some(indices),
            report: Some(report),
        }
    }

    fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<crate::detect::Detection>> {
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| anyhow::anyhow!("detector lock poisoned"))?;
        detector.detect(frame)
    }

    fn report(&self, indices: &[DeviceIndex]) -> ReportOutcome {
        match self.reporter.lock() {
            Ok(mut reporter) => reporter.report(indices),
            Err(_) => {
                log::warn!("reporter lock poisoned; skipping report");
                ReportOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, ScriptedBackend};
    use crate::render::Viewport;
    use std::io::{self, Write};
    use std::time::Duration;

    struct FlakyLink {
        writes: Arc<Mutex<Vec<String>>>,
        fail_on: usize,
        attempts: usize,
    }

    impl Write for FlakyLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            if self.attempts == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "link stalled"));
            }
            self.writes
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(buf).into_owned());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingDetector;

    impl DetectorBackend for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Detection>> {
            anyhow::bail!("inference exploded")
        }
    }

    struct FixedFrames {
        remaining: u32,
        served: u64,
    }

    impl FixedFrames {
        fn new(remaining: u32) -> Self {
            Self {
                remaining,
                served: 0,
            }
        }
    }

    impl FrameSource for FixedFrames {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.served += 1;
            Frame::filled(640, 10, [0, 0, 0]).map(Some)
        }

        fn frames_captured(&self) -> u64 {
            self.served
        }
    }

    fn pothole(x_min: f32, x_max: f32) -> Detection {
        Detection::new("pothole", BoundingBox::new(x_min, 0.0, x_max, 5.0), 0.9)
    }

    fn build_loop(
        detector: Box<dyn DetectorBackend>,
        link: Box<dyn Write + Send>,
    ) -> (FrameLoop, Arc<Mailbox<RgbImage>>) {
        let mapper = StripMapper::new(144, "pothole").unwrap();
        let display = Arc::new(Mailbox::new());
        let frame_loop = FrameLoop::new(
            Arc::new(Mutex::new(detector)),
            Arc::new(Mutex::new(DeviceReporter::new(link, Duration::ZERO))),
            mapper.clone(),
            Renderer::new(mapper, Viewport::new(64, 64)).expect("caption font"),
            Arc::clone(&display),
        );
        (frame_loop, display)
    }

    #[test]
    fn write_failure_does_not_stop_the_loop() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let link = FlakyLink {
            writes: Arc::clone(&writes),
            fail_on: 2,
            attempts: 0,
        };
        let script = vec![
            vec![pothole(20.0, 25.0)],
            vec![pothole(350.0, 362.0)],
            vec![],
        ];
        let (frame_loop, display) =
            build_loop(Box::new(ScriptedBackend::new(script)), Box::new(link));

        let mut source = FixedFrames::new(3);
        let summary = frame_loop.run(&mut source, &AtomicBool::new(false));

        assert_eq!(summary.exit, LoopExit::EndOfStream);
        assert_eq!(summary.counters.frames, 3);
        assert_eq!(summary.captured, 3);
        assert_eq!(summary.counters.reports_failed, 1);
        assert_eq!(summary.counters.reports_sent, 2);
        assert_eq!(*writes.lock().unwrap(), vec!["5\n".to_string(), "\n".to_string()]);
        assert_eq!(display.posted(), 3);
    }

    #[test]
    fn raised_stop_flag_ends_before_reading() {
        let (frame_loop, display) = build_loop(
            Box::new(ScriptedBackend::default()),
            Box::new(io::sink()),
        );
        let mut source = FixedFrames::new(10);
        let summary = frame_loop.run(&mut source, &AtomicBool::new(true));
        assert_eq!(summary.exit, LoopExit::Stopped);
        assert_eq!(summary.counters.frames, 0);
        assert_eq!(summary.captured, 0);
        assert_eq!(source.remaining, 10);
        assert_eq!(display.posted(), 0);
    }

    #[test]
    fn detector_failure_sends_nothing_but_still_displays() -> anyhow::Result<()> {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let link = FlakyLink {
            writes: Arc::clone(&writes),
            fail_on: 0,
            attempts: 0,
        };
        let (frame_loop, display) = build_loop(Box::new(FailingDetector), Box::new(link));

        let outcome = frame_loop.process_frame(&Frame::filled(640, 10, [0, 0, 0])?);
        assert_eq!(outcome.indices, None);
        assert_eq!(outcome.report, None);
        assert!(writes.lock().unwrap().is_empty());
        assert!(display.take().is_some());
        Ok(())
    }

    #[test]
    fn qualifying_detections_reach_the_strip() -> anyhow::Result<()> {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let link = FlakyLink {
            writes: Arc::clone(&writes),
            fail_on: 0,
            attempts: 0,
        };
        let script = vec![vec![
            pothole(20.0, 25.0),
            Detection::new("crack", BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9),
            pothole(22.0, 23.0),
            pothole(356.0, 356.0),
        ]];
        let (frame_loop, _display) =
            build_loop(Box::new(ScriptedBackend::new(script)), Box::new(link));

        let outcome = frame_loop.process_frame(&Frame::filled(640, 10, [0, 0, 0])?);
        assert_eq!(outcome.detections, 4);
        assert_eq!(outcome.indices, Some(vec![5, 5, 80]));
        assert_eq!(*writes.lock().unwrap(), vec!["5,5,80\n".to_string()]);
        Ok(())
    }
}
