//! strip_beacon - live object detection relayed to an addressable LED strip
//!
//! Frames come from a webcam or a sample video. Every detection of the target
//! class lights the LED under its horizontal position; the annotated frame is
//! kept on disk as a preview image.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use strip_beacon::ui::{self, ConsoleCommand, StatusLine, Ui};
use strip_beacon::{
    build_detector, BeaconConfig, Controller, DeviceReporter, PreviewSink, StartOutcome, Status,
};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "BEACON_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Serial device of the strip controller.
    #[arg(long, value_name = "PATH")]
    serial_path: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
    /// Run without a strip controller attached.
    #[arg(long)]
    no_serial: bool,
    /// Detections whose label contains this keyword light the strip.
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    led_count: Option<u32>,
    /// Detector backend (tract|scripted).
    #[arg(long)]
    backend: Option<String>,
    /// ONNX model for the tract backend.
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Class names, one per line, in model output order.
    #[arg(long, value_name = "PATH")]
    labels: Option<PathBuf>,
    /// Detections to replay with the scripted backend.
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,
    /// Where the annotated frame is written.
    #[arg(long, value_name = "PATH")]
    preview: Option<PathBuf>,
    #[arg(long)]
    no_preview: bool,
    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone)]
enum Mode {
    /// Read commands from stdin (default).
    Console,
    /// Detect on the webcam until Ctrl-C.
    Camera,
    /// Detect on a video file until it ends or Ctrl-C.
    Sample {
        /// Defaults to the configured sample video.
        path: Option<String>,
    },
}

enum Event {
    Line(String),
    InputClosed,
    Interrupt,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = BeaconConfig::load_from(args.config.as_deref())?;
        apply_args(&mut cfg, &args);
        cfg.validate()?;
        cfg
    };

    let detector = {
        let _stage = ui.stage("Load detector");
        build_detector(&cfg.model)?
    };
    log::info!("detector backend: {}", detector.name());

    let reporter = {
        let _stage = ui.stage("Open strip link");
        DeviceReporter::open(&cfg.serial)
    };

    let mut controller = Controller::new(&cfg, detector, reporter)?;
    if !controller.reporting_enabled() {
        log::warn!("no strip controller attached; detections will only be displayed");
    }

    let display = controller.display();
    let preview = match &cfg.display.preview_path {
        Some(path) => {
            log::info!("preview written to {}", path.display());
            Some(PreviewSink::new(path.clone()).spawn(display.clone())?)
        }
        None => None,
    };

    let (tx, rx) = mpsc::channel();
    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Event::Interrupt);
    })
    .context("error setting Ctrl-C handler")?;

    let mut status = ui.status_line();
    let result = match args.command.clone().unwrap_or(Mode::Console) {
        Mode::Console => {
            spawn_stdin_reader(tx)?;
            run_console(&mut controller, &ui, &mut status, &rx)
        }
        Mode::Camera => controller
            .start_camera()
            .and_then(|_| run_until_idle(&mut controller, &mut status, &rx)),
        Mode::Sample { path } => {
            let started = match path {
                Some(path) => controller.start_sample_from(&path),
                None => controller.start_sample(),
            };
            started.and_then(|_| run_until_idle(&mut controller, &mut status, &rx))
        }
    };

    controller.stop();
    status.update(controller.status());
    drop(status);
    display.close();
    if let Some(handle) = preview {
        if handle.join().is_err() {
            log::warn!("preview thread panicked");
        }
    }

    let stats = controller.reporter_stats();
    log::info!(
        "strip reports: {} sent, {} failed",
        stats.sent,
        stats.failed
    );
    result
}

fn apply_args(cfg: &mut BeaconConfig, args: &Args) {
    if let Some(path) = &args.serial_path {
        cfg.serial.path = path.clone();
    }
    if let Some(baud) = args.baud {
        cfg.serial.baud = baud;
    }
    if args.no_serial {
        cfg.serial.enabled = false;
    }
    if let Some(label) = &args.label {
        cfg.strip.target_label = label.clone();
    }
    if let Some(count) = args.led_count {
        cfg.strip.led_count = count;
    }
    if let Some(backend) = &args.backend {
        cfg.model.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        cfg.model.path = model.clone();
    }
    if let Some(labels) = &args.labels {
        cfg.model.labels_path = Some(labels.clone());
    }
    if let Some(script) = &args.script {
        cfg.model.script_path = Some(script.clone());
    }
    if let Some(preview) = &args.preview {
        cfg.display.preview_path = Some(preview.clone());
    }
    if args.no_preview {
        cfg.display.preview_path = None;
    }
}

fn spawn_stdin_reader(tx: mpsc::Sender<Event>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(Event::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Event::InputClosed);
        })
        .context("spawn stdin reader")?;
    Ok(())
}

fn run_console(
    controller: &mut Controller,
    ui: &Ui,
    status: &mut StatusLine,
    rx: &mpsc::Receiver<Event>,
) -> Result<()> {
    status.println(ui::CONSOLE_HELP);
    loop {
        status.update(controller.status());
        let line = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Event::Line(line)) => line,
            Ok(Event::InputClosed) | Ok(Event::Interrupt) => return Ok(()),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        };

        let command = match ui::parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                ui.notify_error(&message);
                continue;
            }
        };
        let started = match command {
            ConsoleCommand::StartCamera => controller.start_camera(),
            ConsoleCommand::StartSample(Some(path)) => controller.start_sample_from(&path),
            ConsoleCommand::StartSample(None) => controller.start_sample(),
            ConsoleCommand::Stop => {
                if !controller.stop() {
                    status.println("nothing to stop");
                }
                continue;
            }
            ConsoleCommand::Status => {
                print_status(controller, status);
                continue;
            }
            ConsoleCommand::Help => {
                status.println(ui::CONSOLE_HELP);
                continue;
            }
            ConsoleCommand::Quit => return Ok(()),
        };
        match started {
            Ok(StartOutcome::Started) => {}
            Ok(StartOutcome::AlreadyRunning) => {
                status.println("a session is already running; stop it first")
            }
            Err(err) => ui.notify_error(&format!("{:#}", err)),
        }
    }
}

fn run_until_idle(
    controller: &mut Controller,
    status: &mut StatusLine,
    rx: &mpsc::Receiver<Event>,
) -> Result<()> {
    loop {
        let current = controller.status();
        status.update(current);
        if current == Status::Idle {
            return Ok(());
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Event::Interrupt) => return Ok(()),
            Ok(_) | Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("signal channel closed"))
            }
        }
    }
}

fn print_status(controller: &mut Controller, status: &StatusLine) {
    let current = controller.status();
    status.println(&ui::format_status(current));
    if let Some(source) = controller.active_source() {
        status.println(&format!("  source: {}", source));
    }
    if let Some(last) = controller.last_session() {
        status.println(&format!(
            "  last session: {} from {} ({:?}, {} frames, {:.1}s)",
            last.kind,
            last.source,
            last.exit,
            last.frames,
            last.duration.as_secs_f64()
        ));
    }
    let stats = controller.reporter_stats();
    status.println(&format!(
        "  strip reports: {} sent, {} failed{}",
        stats.sent,
        stats.failed,
        if controller.reporting_enabled() {
            ""
        } else {
            " (link disabled)"
        }
    ));
}
