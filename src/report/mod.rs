//! Strip reporting over the serial link.
//!
//! Wire format: one ASCII line per frame, decimal strip indices joined by
//! `,` with no spaces, terminated by `\n`. An empty line tells the firmware
//! to clear the strip. Nothing is read back; writes are never retried.

#[cfg(feature = "serial")]
mod serial;

use std::io::Write;
use std::time::Duration;

use crate::config::SerialSettings;
use crate::mapper::DeviceIndex;

/// Build the wire message for one frame, terminator included.
pub fn format_message(indices: &[DeviceIndex]) -> String {
    let mut message = indices
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join(",");
    message.push('\n');
    message
}

/// What happened to one frame's report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Sent,
    Failed,
    Disabled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub sent: u64,
    pub failed: u64,
}

/// Best-effort writer of strip messages.
///
/// A reporter without a link silently drops every report. Write errors are
/// logged and counted; they never propagate to the frame loop.
pub struct DeviceReporter {
    link: Option<Box<dyn Write + Send>>,
    settle: Duration,
    stats: ReportStats,
}

impl DeviceReporter {
    pub fn new(link: Box<dyn Write + Send>, settle: Duration) -> Self {
        Self {
            link: Some(link),
            settle,
            stats: ReportStats::default(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            link: None,
            settle: Duration::ZERO,
            stats: ReportStats::default(),
        }
    }

    /// Open the configured serial port once. Failure disables reporting for
    /// the rest of the session instead of failing startup.
    pub fn open(settings: &SerialSettings) -> Self {
        if !settings.enabled {
            log::info!("strip reporting disabled by configuration");
            return Self::disabled();
        }
        match open_link(settings) {
            Ok(link) => {
                log::info!(
                    "strip controller connected on {} at {} baud",
                    settings.path,
                    settings.baud
                );
                Self::new(link, settings.settle)
            }
            Err(err) => {
                log::warn!(
                    "strip controller not connected ({}): {:#}; reporting disabled",
                    settings.path,
                    err
                );
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.link.is_some()
    }

    pub fn stats(&self) -> ReportStats {
        self.stats
    }

    /// Send one frame's indices.
    pub fn report(&mut self, indices: &[DeviceIndex]) -> ReportOutcome {
        let Some(link) = self.link.as_mut() else {
            return ReportOutcome::Disabled;
        };
        let message = format_message(indices);
        let result = link
            .write_all(message.as_bytes())
            .and_then(|()| link.flush());
        match result {
            Ok(()) => {
                self.stats.sent += 1;
                let body = message.trim_end();
                log::info!(
                    "sent to strip: {}",
                    if body.is_empty() { "[CLEAR]" } else { body }
                );
                if !self.settle.is_zero() {
                    std::thread::sleep(self.settle);
                }
                ReportOutcome::Sent
            }
            Err(err) => {
                self.stats.failed += 1;
                log::warn!("error sending to strip: {}", err);
                ReportOutcome::Failed
            }
        }
    }
}

#[cfg(feature = "serial")]
fn open_link(settings: &SerialSettings) -> anyhow::Result<Box<dyn Write + Send>> {
    serial::open(&settings.path, settings.baud)
}

#[cfg(not(feature = "serial"))]
fn open_link(_settings: &SerialSettings) -> anyhow::Result<Box<dyn Write + Send>> {
    anyhow::bail!("serial support requires the serial feature")
}
