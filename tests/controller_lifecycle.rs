use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use strip_beacon::{
    BeaconConfig, BoundingBox, Controller, Detection, DeviceReporter, LoopExit, PreviewSink,
    ScriptedBackend, SourceKind, StartOutcome, Status,
};

fn test_config() -> BeaconConfig {
    let mut cfg = BeaconConfig::default();
    cfg.camera.device_prefix = "stub://camera".to_string();
    cfg.camera.width = 320;
    cfg.camera.height = 240;
    cfg.sample_path = "stub://clip?frames=3".to_string();
    cfg.display.preview_path = None;
    cfg.stop_grace = Duration::from_millis(10);
    cfg
}

fn controller(cfg: &BeaconConfig) -> Result<Controller> {
    let script = vec![vec![Detection::new(
        "pothole",
        BoundingBox::new(300.0, 100.0, 340.0, 140.0),
        0.9,
    )]];
    Controller::new(
        cfg,
        Box::new(ScriptedBackend::new(script)),
        DeviceReporter::disabled(),
    )
}

fn wait_for_idle(controller: &mut Controller) -> Status {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = controller.status();
        if status == Status::Idle || Instant::now() >= deadline {
            return status;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn second_start_is_ignored_while_running() -> Result<()> {
    let cfg = test_config();
    let mut controller = controller(&cfg)?;

    assert_eq!(controller.start_camera()?, StartOutcome::Started);
    let id = controller.session_id();
    let source = controller.active_source().map(str::to_string);
    assert_eq!(controller.status(), Status::Running(SourceKind::Camera));

    assert_eq!(controller.start_camera()?, StartOutcome::AlreadyRunning);
    assert_eq!(controller.start_sample()?, StartOutcome::AlreadyRunning);
    assert_eq!(controller.session_id(), id);
    assert_eq!(controller.active_source().map(str::to_string), source);
    assert_eq!(controller.status(), Status::Running(SourceKind::Camera));

    assert!(controller.stop());
    Ok(())
}

#[test]
fn stopping_twice_is_harmless() -> Result<()> {
    let cfg = test_config();
    let mut controller = controller(&cfg)?;

    assert!(!controller.stop());
    controller.start_camera()?;
    assert!(controller.stop());
    assert!(!controller.stop());
    assert_eq!(controller.status(), Status::Idle);

    let last = controller.last_session().expect("session record");
    assert_eq!(last.kind, SourceKind::Camera);
    assert_eq!(last.exit, LoopExit::Stopped);
    Ok(())
}

#[test]
fn unavailable_camera_stays_idle() -> Result<()> {
    let mut cfg = test_config();
    cfg.camera.device_prefix = "/nonexistent/video".to_string();
    let mut controller = controller(&cfg)?;

    let err = controller.start_camera().unwrap_err();
    assert!(format!("{:#}", err).contains("could not open webcam"));
    assert_eq!(controller.status(), Status::Idle);
    assert!(controller.session_id().is_none());
    Ok(())
}

#[test]
fn missing_sample_stays_idle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nowhere.mp4");
    let cfg = test_config();
    let mut controller = controller(&cfg)?;

    let err = controller
        .start_sample_from(&missing.to_string_lossy())
        .unwrap_err();
    assert!(format!("{:#}", err).contains("could not open sample video"));
    assert_eq!(controller.status(), Status::Idle);
    Ok(())
}

#[test]
fn sample_end_of_stream_returns_to_idle() -> Result<()> {
    let cfg = test_config();
    let mut controller = controller(&cfg)?;

    assert_eq!(controller.start_sample()?, StartOutcome::Started);
    assert_eq!(wait_for_idle(&mut controller), Status::Idle);

    let last = controller.last_session().expect("session record");
    assert_eq!(last.kind, SourceKind::Sample);
    assert_eq!(last.exit, LoopExit::EndOfStream);
    assert_eq!(last.frames, 3);
    assert_eq!(last.processed, 3);
    assert!(controller.session_id().is_none());

    // A new session can start once the previous one has been reaped.
    assert_eq!(controller.start_camera()?, StartOutcome::Started);
    assert!(controller.stop());
    Ok(())
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + deadline;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn stop_clears_pending_display_frame() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let preview_path = dir.path().join("preview.jpg");
    let cfg = test_config();
    let mut controller = controller(&cfg)?;
    let display = controller.display();
    let preview = PreviewSink::new(&preview_path).spawn(Arc::clone(&display))?;

    controller.start_camera()?;
    assert!(wait_until(Duration::from_secs(5), || preview_path.exists()));

    controller.stop();
    assert!(display.take().is_none());
    assert!(
        wait_until(Duration::from_secs(2), || !preview_path.exists()),
        "display still shows the last frame after stop"
    );
    assert_eq!(controller.status(), Status::Idle);

    // The display stays blank while idle.
    std::thread::sleep(Duration::from_millis(300));
    assert!(!preview_path.exists());

    display.close();
    preview.join().expect("preview thread");
    Ok(())
}

#[test]
fn end_of_stream_blanks_the_display() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let preview_path = dir.path().join("preview.jpg");
    let mut cfg = test_config();
    cfg.sample_path = "stub://clip?frames=20".to_string();
    let mut controller = controller(&cfg)?;
    let display = controller.display();
    let preview = PreviewSink::new(&preview_path).spawn(Arc::clone(&display))?;

    controller.start_sample()?;
    assert_eq!(wait_for_idle(&mut controller), Status::Idle);
    assert!(wait_until(Duration::from_secs(2), || !preview_path.exists()));

    display.close();
    preview.join().expect("preview thread");
    Ok(())
}
