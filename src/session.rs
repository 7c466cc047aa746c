//! Per-run scratch directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Scratch directory owned by one pipeline run.
///
/// Every intermediate artifact (downloads, clips, subtitle text files, the
/// concat manifest) lives here. The directory is removed when the session
/// is dropped, whichever way the run ends.
#[derive(Debug)]
pub struct WorkSession {
    id: String,
    dir: TempDir,
}

impl WorkSession {
    pub fn create(session_id: &str) -> std::io::Result<Self> {
        let prefix = format!("reel_{}_", sanitize(session_id));
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir()?;
        log::info!("Working directory: {}", dir.path().display());
        Ok(Self {
            id: session_id.to_string(),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the working directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Create (if needed) and return a subdirectory.
    pub fn subdir(&self, name: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

impl Drop for WorkSession {
    fn drop(&mut self) {
        log::info!(
            "Removing working directory for session {}: {}",
            self.id,
            self.dir.path().display()
        );
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_removed_on_drop() {
        let session = WorkSession::create("250114_093000").unwrap();
        let root = session.path().to_path_buf();
        std::fs::write(session.file("clip.mp4"), b"x").unwrap();
        session.subdir("images").unwrap();
        assert!(root.exists());

        drop(session);
        assert!(!root.exists());
    }

    #[test]
    fn directory_removed_when_run_fails() {
        fn failing_run(root: &mut Option<PathBuf>) -> Result<(), String> {
            let session = WorkSession::create("fail").map_err(|e| e.to_string())?;
            *root = Some(session.path().to_path_buf());
            Err("encoder exploded".to_string())
        }

        let mut root = None;
        assert!(failing_run(&mut root).is_err());
        assert!(!root.unwrap().exists());
    }

    #[test]
    fn prefix_is_filesystem_safe() {
        let session = WorkSession::create("a/b c").unwrap();
        let name = session.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("reel_a_b_c_"));
    }
}
