//! Scratch workspaces
//!
//! Each execution attempt gets its own freshly created directory. The
//! directory and everything written into it are removed when the
//! `Workspace` is dropped, so cleanup also happens on error returns,
//! timeouts and cancelled futures.

use std::future::Future;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::GraderError;
use crate::languages::is_bare_file_name;

const WORKSPACE_PREFIX: &str = "grader-";

/// An exclusively owned scratch directory
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a uniquely named empty directory under `root`
    pub fn create(root: &Path) -> Result<Self, GraderError> {
        std::fs::create_dir_all(root).map_err(GraderError::Workspace)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(GraderError::Workspace)?;
        debug!("Created workspace {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file directly inside the workspace
    pub async fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, GraderError> {
        write_file(self.path(), name, contents).await
    }

    /// Remove the directory now, logging instead of failing
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove workspace {:?}: {}", path, e);
        } else {
            debug!("Removed workspace {:?}", path);
        }
    }
}

/// Run `f` inside a fresh workspace and remove it afterwards.
///
/// Removal also happens if the returned future is dropped before completion.
pub async fn with_workspace<F, Fut, T>(root: &Path, f: F) -> Result<T, GraderError>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = T>,
{
    let workspace = Workspace::create(root)?;
    let result = f(workspace.path().to_path_buf()).await;
    workspace.close();
    Ok(result)
}

/// Write `name` (a bare file name) inside `dir`
pub async fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, GraderError> {
    if !is_bare_file_name(name) {
        return Err(GraderError::Workspace(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("refusing to write outside workspace: {:?}", name),
        )));
    }
    let path = dir.join(name);
    tokio::fs::write(&path, contents)
        .await
        .map_err(GraderError::Workspace)?;
    Ok(path)
}
