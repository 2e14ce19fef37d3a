use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::controller::Status;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Terminal presentation: startup stages and the live status indicator.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty | UiMode::Auto => true,
                UiMode::Plain => false,
            }
    }

    fn spinner(&self, message: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        spinner
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = self.spinner(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Indicator that redraws only when the status changes.
    pub fn status_line(&self) -> StatusLine {
        StatusLine {
            pretty: self.use_pretty(),
            spinner: None,
            shown: None,
        }
    }

    /// User-visible error notification.
    pub fn notify_error(&self, message: &str) {
        eprintln!("error: {}", message);
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct StatusLine {
    pretty: bool,
    spinner: Option<ProgressBar>,
    shown: Option<Status>,
}

impl StatusLine {
    /// Show `status`; returns true when it differs from what was shown.
    pub fn update(&mut self, status: Status) -> bool {
        if self.shown == Some(status) {
            return false;
        }
        self.shown = Some(status);
        let text = format_status(status);

        if !self.pretty {
            eprintln!("{}", text);
            return true;
        }
        match status {
            Status::Idle => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish_with_message(text);
                } else {
                    eprintln!("{}", text);
                }
            }
            Status::Running(_) => match &self.spinner {
                Some(spinner) => spinner.set_message(text),
                None => {
                    let spinner = ProgressBar::new_spinner();
                    spinner.set_draw_target(ProgressDrawTarget::stderr());
                    spinner.enable_steady_tick(Duration::from_millis(120));
                    spinner.set_message(text);
                    self.spinner = Some(spinner);
                }
            },
        }
        true
    }

    /// Print a line without tearing the spinner.
    pub fn println(&self, line: &str) {
        match &self.spinner {
            Some(spinner) => spinner.println(line),
            None => eprintln!("{}", line),
        }
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

/// A line typed at the console.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    StartCamera,
    StartSample(Option<String>),
    Stop,
    Status,
    Help,
    Quit,
}

pub const CONSOLE_HELP: &str =
    "commands: camera | sample [PATH] | stop | status | help | quit";

pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();
    let command = match verb.to_lowercase().as_str() {
        "camera" | "webcam" | "c" => ConsoleCommand::StartCamera,
        "sample" | "s" => {
            let path = rest.join(" ");
            return Ok(Some(ConsoleCommand::StartSample(
                (!path.is_empty()).then_some(path),
            )));
        }
        "stop" | "x" => ConsoleCommand::Stop,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}' ({})", other, CONSOLE_HELP)),
    };
    if !rest.is_empty() {
        return Err(format!("'{}' takes no arguments", verb));
    }
    Ok(Some(command))
}

pub fn format_status(status: Status) -> String {
    match status {
        Status::Idle => format!("Status: {}", status),
        Status::Running(_) => format!("Status: {}...", status),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
