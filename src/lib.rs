//! strip-beacon
//!
//! Runs an object detector over a webcam feed or a sample video and lights
//! the matching positions on an addressable LED strip.
//!
//! # Pipeline
//!
//! Each frame flows once through:
//!
//! 1. **Source** (`ingest`): camera or video file, normalized to RGB24.
//! 2. **Detector** (`detect`): opaque backend returning labelled boxes.
//! 3. **Mapper** (`mapper`): box centre to strip index, for the target class.
//! 4. **Reporter** (`report`): one comma-separated line per frame over serial.
//! 5. **Renderer** (`render`): overlays, viewport fit, handoff to the display.
//!
//! There is no state across frames. `controller` owns the session lifecycle
//! and the single worker thread that drives the loop in `pipeline`.

pub mod config;
pub mod controller;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod mailbox;
pub mod mapper;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod ui;

pub use config::BeaconConfig;
pub use controller::{Controller, SessionRecord, StartOutcome, Status};
pub use detect::{build_detector, BoundingBox, Detection, DetectorBackend, ScriptedBackend};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, FileConfig, FileSource, FrameSource, SourceKind};
pub use mailbox::Mailbox;
pub use mapper::{DeviceIndex, StripMapper};
pub use pipeline::{FrameLoop, FrameOutcome, LoopExit, LoopSummary};
pub use render::{fit_dimensions, PreviewSink, Renderer, Viewport};
pub use report::{format_message, DeviceReporter, ReportOutcome, ReportStats};
