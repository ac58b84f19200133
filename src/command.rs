//! Command envelope model: inbound editor commands and outbound replies.
//!
//! Wire shapes:
//!
//! ```text
//! { "type": "file:write",  "data": { "path": "...", "content": "..." | [u8, ...] } }
//! { "type": "file:rename", "data": { "oldPath": "...", "newPath": "..." } }
//! { "type": "file:unlink", "data": { "path": "..." } }
//! { "type": "install",     "data": { "requirements": ["...", ...] } }
//!
//! { "type": "reply" }
//! { "type": "reply", "error": { "kind": "...", ... } }
//! ```

use serde::{Deserialize, Serialize};

use crate::kernel::KernelError;

/// File body carried by a write command.
///
/// A JSON string decodes as text, an array of byte values as bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContent {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl FileContent {
    /// Borrow the content as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// A mutating request from the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    /// Create or overwrite a file.
    #[serde(rename = "file:write")]
    WriteFile {
        /// Logical path of the file.
        path: String,
        /// New file body.
        content: FileContent,
    },
    /// Move a file.
    #[serde(rename = "file:rename", rename_all = "camelCase")]
    RenameFile {
        /// Current logical path.
        old_path: String,
        /// Destination logical path.
        new_path: String,
    },
    /// Delete a file.
    #[serde(rename = "file:unlink")]
    Unlink {
        /// Logical path of the file.
        path: String,
    },
    /// Install packages, preserving order.
    #[serde(rename = "install")]
    Install {
        /// Package requirement specifiers.
        requirements: Vec<String>,
    },
}

/// Why an inbound payload is not a usable command.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Unknown `type` tag or a payload that does not match it.
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A path field is empty.
    #[error("command '{command}' has an empty {field}")]
    EmptyPath {
        /// Wire tag of the command.
        command: &'static str,
        /// Name of the empty field.
        field: &'static str,
    },
}

impl Command {
    /// Decode and validate a command from its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for unknown tags, shape mismatches, and empty
    /// paths.
    pub fn decode(value: serde_json::Value) -> Result<Self, DecodeError> {
        let command: Self = serde_json::from_value(value)?;
        command.validate()?;
        Ok(command)
    }

    /// Wire tag of this command.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::WriteFile { .. } => "file:write",
            Self::RenameFile { .. } => "file:rename",
            Self::Unlink { .. } => "file:unlink",
            Self::Install { .. } => "install",
        }
    }

    fn validate(&self) -> Result<(), DecodeError> {
        let empty = |field| DecodeError::EmptyPath {
            command: self.tag(),
            field,
        };
        match self {
            Self::WriteFile { path, .. } | Self::Unlink { path } if path.is_empty() => {
                Err(empty("path"))
            }
            Self::RenameFile { old_path, .. } if old_path.is_empty() => Err(empty("oldPath")),
            Self::RenameFile { new_path, .. } if new_path.is_empty() => Err(empty("newPath")),
            _ => Ok(()),
        }
    }
}

/// Outcome sent back to the editor for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ReplyMessage", from = "ReplyMessage")]
pub enum Reply {
    /// The operation completed.
    Ack,
    /// The operation failed with the kernel's error.
    Failure {
        /// Error produced by the kernel, unchanged.
        error: KernelError,
    },
}

impl Reply {
    /// Build the reply for a kernel outcome.
    pub fn from_outcome(outcome: Result<(), KernelError>) -> Self {
        match outcome {
            Ok(()) => Self::Ack,
            Err(error) => Self::Failure { error },
        }
    }

    /// Returns `true` for [`Reply::Ack`].
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}

#[derive(Serialize, Deserialize)]
enum ReplyTag {
    #[serde(rename = "reply")]
    Reply,
}

#[derive(Serialize, Deserialize)]
struct ReplyMessage {
    #[serde(rename = "type")]
    tag: ReplyTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<KernelError>,
}

impl From<Reply> for ReplyMessage {
    fn from(reply: Reply) -> Self {
        let error = match reply {
            Reply::Ack => None,
            Reply::Failure { error } => Some(error),
        };
        Self {
            tag: ReplyTag::Reply,
            error,
        }
    }
}

impl From<ReplyMessage> for Reply {
    fn from(msg: ReplyMessage) -> Self {
        match msg.error {
            None => Self::Ack,
            Some(error) => Self::Failure { error },
        }
    }
}
