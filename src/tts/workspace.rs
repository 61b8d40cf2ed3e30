//! Per-session scratch directory for synthesis artifacts.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// Scratch directory exclusively owned by one session.
///
/// Removed exactly once: explicitly through [`SessionWorkspace::close`], or on drop
/// if the session unwinds before reaching it.
pub struct SessionWorkspace {
    dir: Option<TempDir>, // None once closed
    path: PathBuf,        // Kept for logging after close
}

impl SessionWorkspace {
    /// Create a fresh directory for `session_id` under `root`.
    ///
    /// # Errors
    /// Returns an error if the root cannot be created or is not writable.
    pub fn create(root: &Path, session_id: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(&format!("session-{}-", session_id)).tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        debug!("Created session workspace {}", path.display());
        Ok(Self { dir: Some(dir), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Output path for the artifact of chunk `index`.
    pub fn artifact_path(&self, index: usize) -> PathBuf {
        self.path.join(format!("chunk_{}.mp3", index))
    }

    /// Remove the directory and everything left in it.
    pub fn close(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => {
                dir.close()?;
                debug!("Removed session workspace {}", self.path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_is_removed_on_close() {
        let root = tempfile::tempdir().unwrap();
        let workspace = SessionWorkspace::create(root.path(), "abc").unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(workspace.artifact_path(3), b"leftover").unwrap();
        assert!(path.exists());

        workspace.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_workspaces_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let a = SessionWorkspace::create(root.path(), "same").unwrap();
        let b = SessionWorkspace::create(root.path(), "same").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.artifact_path(0).ends_with("chunk_0.mp3"));
    }

    #[test]
    fn test_workspace_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let workspace = SessionWorkspace::create(root.path(), "dropped").unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
