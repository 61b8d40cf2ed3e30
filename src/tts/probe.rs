//! Authoritative playback duration of synthesized artifacts.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ProbeError;

/// Measures the playback duration of a finished audio artifact.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration of the artifact at `path` in seconds.
    async fn duration(&self, path: &Path) -> Result<f64, ProbeError>;
}

/// Duration probe backed by the `ffprobe` media inspector.
pub struct FfprobeProbe {
    program: String, // ffprobe executable
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let output = Command::new(&self.program)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Exit {
                path: path.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let duration = parse_duration(path, &String::from_utf8_lossy(&output.stdout))?;
        debug!("Probed {}: {:.3}s", path.display(), duration);
        Ok(duration)
    }
}

/// Parse the bare `format=duration` value printed by ffprobe.
fn parse_duration(path: &Path, stdout: &str) -> Result<f64, ProbeError> {
    let trimmed = stdout.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(ProbeError::Malformed { path: path.to_path_buf(), output: trimmed.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let path = Path::new("chunk_0.mp3");
        assert_eq!(parse_duration(path, "12.345600\n").unwrap(), 12.3456);
        assert!(matches!(parse_duration(path, "N/A\n"), Err(ProbeError::Malformed { .. })));
        assert!(matches!(parse_duration(path, ""), Err(ProbeError::Malformed { .. })));
        assert!(matches!(parse_duration(path, "-1.0"), Err(ProbeError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_missing_probe_program() {
        let probe = FfprobeProbe::new("read-aloud-no-such-probe");
        let err = probe.duration(Path::new("chunk_0.mp3")).await.unwrap_err();
        assert!(matches!(err, ProbeError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_nonzero_exit() {
        let probe = FfprobeProbe::new("false");
        let err = probe.duration(Path::new("chunk_0.mp3")).await.unwrap_err();
        assert!(matches!(err, ProbeError::Exit { .. }));
    }
}
