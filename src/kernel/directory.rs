//! Kernel backed by a workspace directory on the host.
//!
//! Logical paths are resolved inside the workspace root; anything that would
//! escape it is rejected. Package installation shells out to a configured
//! installer command with the requirements appended in order.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Kernel, KernelError};
use crate::command::FileContent;

/// External installer invocation, e.g. `pip install --target site-packages`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstallerConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the requirements.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Kernel that maps logical paths onto files under `root`.
#[derive(Debug)]
pub struct DirectoryKernel {
    root: PathBuf,
    installer: Option<InstallerConfig>,
    disposed: AtomicBool,
}

impl DirectoryKernel {
    /// Create a kernel rooted at `root`. The directory is created on first write.
    pub fn new(root: PathBuf, installer: Option<InstallerConfig>) -> Self {
        Self {
            root,
            installer,
            disposed: AtomicBool::new(false),
        }
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` once [`Kernel::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), KernelError> {
        if self.is_disposed() {
            return Err(KernelError::Disposed);
        }
        Ok(())
    }
}

/// Resolve a logical path to a host path under `root`.
///
/// A leading `/` is treated as the workspace root. `.` and `..` are resolved
/// lexically without touching the filesystem.
///
/// # Errors
///
/// Returns [`KernelError::InvalidPath`] for empty paths, paths naming the
/// root itself, and paths escaping the root.
pub fn resolve_logical_path(root: &Path, logical: &str) -> Result<PathBuf, KernelError> {
    let invalid = |reason: &str| KernelError::InvalidPath {
        path: logical.to_owned(),
        reason: reason.to_owned(),
    };

    if logical.is_empty() {
        return Err(invalid("path is empty"));
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(logical).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(invalid("path escapes the workspace"));
                }
            }
            Component::Normal(part) => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(invalid("path names the workspace root"));
    }

    let mut resolved = root.to_path_buf();
    resolved.extend(parts);
    Ok(resolved)
}

fn io_error(path: &str, err: &std::io::Error) -> KernelError {
    match err.kind() {
        std::io::ErrorKind::NotFound => KernelError::NotFound {
            path: path.to_owned(),
        },
        _ => KernelError::Io {
            path: path.to_owned(),
            message: err.to_string(),
        },
    }
}

async fn ensure_parent(target: &Path, logical: &str) -> Result<(), KernelError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(logical, &e))?;
    }
    Ok(())
}

#[async_trait]
impl Kernel for DirectoryKernel {
    async fn write_file(&self, path: &str, content: &FileContent) -> Result<(), KernelError> {
        self.ensure_live()?;
        let target = resolve_logical_path(&self.root, path)?;
        ensure_parent(&target, path).await?;
        tokio::fs::write(&target, content.as_bytes())
            .await
            .map_err(|e| io_error(path, &e))?;
        debug!(path, target = %target.display(), "file written");
        Ok(())
    }

    async fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), KernelError> {
        self.ensure_live()?;
        let from = resolve_logical_path(&self.root, old_path)?;
        let to = resolve_logical_path(&self.root, new_path)?;

        let meta = tokio::fs::metadata(&from)
            .await
            .map_err(|e| io_error(old_path, &e))?;
        if meta.is_dir() {
            return Err(KernelError::InvalidPath {
                path: old_path.to_owned(),
                reason: "is a directory".to_owned(),
            });
        }
        if tokio::fs::metadata(&to).await.is_ok_and(|m| m.is_dir()) {
            return Err(KernelError::AlreadyExists {
                path: new_path.to_owned(),
            });
        }

        ensure_parent(&to, new_path).await?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| io_error(old_path, &e))?;
        debug!(from = old_path, to = new_path, "file renamed");
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), KernelError> {
        self.ensure_live()?;
        let target = resolve_logical_path(&self.root, path)?;
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| io_error(path, &e))?;
        debug!(path, "file removed");
        Ok(())
    }

    async fn install(&self, requirements: &[String]) -> Result<(), KernelError> {
        self.ensure_live()?;
        if requirements.is_empty() {
            return Ok(());
        }
        let Some(installer) = &self.installer else {
            return Err(KernelError::Unsupported {
                message: "no installer configured".to_owned(),
            });
        };

        let install_failed = |message: String| KernelError::Install {
            requirements: requirements.to_vec(),
            message,
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| install_failed(format!("cannot create workspace: {e}")))?;

        let output = Command::new(&installer.program)
            .args(&installer.args)
            .args(requirements)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| install_failed(format!("failed to run {}: {e}", installer.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            let message = if stderr.is_empty() {
                format!("installer exited with {}", output.status)
            } else {
                stderr
            };
            return Err(install_failed(message));
        }

        info!(count = requirements.len(), program = %installer.program, "requirements installed");
        Ok(())
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            info!(root = %self.root.display(), "kernel disposed");
        }
    }
}
