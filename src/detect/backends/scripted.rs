use std::path::Path;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector that replays a fixed script instead of running a model.
///
/// Frame `n` receives `script[n % script.len()]`; an empty script never
/// detects anything. Used for demos on `stub://` sources and in tests.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, calls: 0 }
    }

    /// Load a script from a JSON array of per-frame detection arrays.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        let script = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;
        Ok(Self::new(script))
    }

    /// Number of frames seen so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let step = self.calls;
        self.calls += 1;
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let index = (step % self.script.len() as u64) as usize;
        Ok(self.script[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use std::io::Write;

    #[test]
    fn replays_script_cyclically() -> Result<()> {
        let frame = Frame::filled(4, 4, [0, 0, 0])?;
        let hole = Detection::new("pothole", BoundingBox::new(0.0, 0.0, 2.0, 2.0), 0.9);
        let mut backend = ScriptedBackend::new(vec![vec![hole.clone()], vec![]]);

        assert_eq!(backend.detect(&frame)?, vec![hole.clone()]);
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.detect(&frame)?, vec![hole]);
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[test]
    fn loads_script_from_json() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(
            br#"[[{"label":"Pothole","bbox":{"x_min":0,"y_min":0,"x_max":10,"y_max":10},"confidence":0.7}],[]]"#,
        )?;
        let mut backend = ScriptedBackend::from_path(file.path())?;
        let frame = Frame::filled(2, 2, [0, 0, 0])?;
        let first = backend.detect(&frame)?;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].label, "Pothole");
        Ok(())
    }

    #[test]
    fn empty_script_detects_nothing() -> Result<()> {
        let frame = Frame::filled(2, 2, [0, 0, 0])?;
        let mut backend = ScriptedBackend::default();
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }
}
