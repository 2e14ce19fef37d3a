use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPort;

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write half of an open serial port.
struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

pub(super) fn open(path: &str, baud: u32) -> Result<Box<dyn Write + Send>> {
    let port = serialport::new(path, baud)
        .timeout(WRITE_TIMEOUT)
        .open()
        .with_context(|| format!("open serial port {}", path))?;
    Ok(Box::new(SerialLink { port }))
}
