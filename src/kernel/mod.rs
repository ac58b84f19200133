//! Kernel operation facade: the sandboxed runtime the editor drives.
//!
//! The bridge only sees the [`Kernel`] trait. [`directory::DirectoryKernel`]
//! is the bundled implementation backed by a workspace directory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::FileContent;

pub mod directory;

/// Structured failure produced by a kernel operation.
///
/// Serialized verbatim into `Failure` replies, so every variant carries
/// the full detail the operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelError {
    /// The referenced file does not exist.
    #[error("no such file: {path}")]
    NotFound {
        /// Logical path that was looked up.
        path: String,
    },
    /// The target of a rename already exists.
    #[error("file already exists: {path}")]
    AlreadyExists {
        /// Logical path that already exists.
        path: String,
    },
    /// The logical path is empty or escapes the sandbox.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending logical path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },
    /// Filesystem failure while performing the operation.
    #[error("i/o error on {path}: {message}")]
    Io {
        /// Logical path the operation touched.
        path: String,
        /// Underlying error text.
        message: String,
    },
    /// Package installation failed.
    #[error("failed to install {requirements:?}: {message}")]
    Install {
        /// Requirements passed to the installer, in order.
        requirements: Vec<String>,
        /// Installer diagnostics.
        message: String,
    },
    /// The kernel cannot perform this operation in its current setup.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// What is missing.
        message: String,
    },
    /// The kernel has been disposed.
    #[error("kernel has been disposed")]
    Disposed,
    /// The operation stopped without producing an outcome.
    #[error("operation aborted: {reason}")]
    Aborted {
        /// Why no outcome was produced.
        reason: String,
    },
    /// Any other failure reported by a kernel implementation.
    #[error("{message}")]
    Other {
        /// Error text.
        message: String,
    },
}

/// Asynchronous operations exposed by a sandboxed kernel.
///
/// Implementations must tolerate concurrent calls; the bridge does not
/// serialize operations on overlapping paths.
#[async_trait]
pub trait Kernel: Send + Sync {
    /// Create or overwrite a file.
    async fn write_file(&self, path: &str, content: &FileContent) -> Result<(), KernelError>;
    /// Move a file to a new logical path.
    async fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), KernelError>;
    /// Remove a file.
    async fn unlink(&self, path: &str) -> Result<(), KernelError>;
    /// Install packages in the given order. An empty list is a no-op.
    async fn install(&self, requirements: &[String]) -> Result<(), KernelError>;
    /// Release resources held by the kernel. Later operations fail with
    /// [`KernelError::Disposed`].
    fn dispose(&self);
}

/// A single initial file entry. Entries without content are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppFile {
    /// File body.
    #[serde(default)]
    pub content: Option<FileContent>,
}

/// Initial application payload applied to a fresh kernel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppData {
    /// Script the runtime executes.
    pub entrypoint: String,
    /// Initial files keyed by logical path.
    #[serde(default)]
    pub files: BTreeMap<String, AppFile>,
    /// Packages installed before the app starts.
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// Entrypoint used when no app data is supplied.
pub const DEFAULT_ENTRYPOINT: &str = "streamlit_app.py";

const DEFAULT_APP_SOURCE: &str = "import streamlit as st\nst.write(\"Hello World\")";

impl Default for AppData {
    fn default() -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            DEFAULT_ENTRYPOINT.to_owned(),
            AppFile {
                content: Some(FileContent::Text(DEFAULT_APP_SOURCE.to_owned())),
            },
        );
        Self {
            entrypoint: DEFAULT_ENTRYPOINT.to_owned(),
            files,
            requirements: Vec::new(),
        }
    }
}

impl AppData {
    /// Files that carry content, in path order.
    pub fn populated_files(&self) -> impl Iterator<Item = (&str, &FileContent)> {
        self.files
            .iter()
            .filter_map(|(path, file)| file.content.as_ref().map(|c| (path.as_str(), c)))
    }
}

/// Write the initial files and install the initial requirements.
///
/// Stops at the first failure.
///
/// # Errors
///
/// Returns the [`KernelError`] of the first failing operation.
pub async fn seed(kernel: &dyn Kernel, app: &AppData) -> Result<(), KernelError> {
    let mut written: usize = 0;
    for (path, content) in app.populated_files() {
        kernel.write_file(path, content).await?;
        written = written.saturating_add(1);
    }
    debug!(files = written, "initial files written");

    if !app.requirements.is_empty() {
        kernel.install(&app.requirements).await?;
    }

    info!(
        entrypoint = %app.entrypoint,
        files = written,
        requirements = app.requirements.len(),
        "kernel seeded"
    );
    Ok(())
}
