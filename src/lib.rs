//! editor-bridge — lets a trusted editor drive a sandboxed app kernel.
//!
//! The editor posts commands (write, rename, unlink, install) with a
//! single-use reply port attached. The bridge checks the sender origin,
//! decodes the command, runs the matching kernel operation and sends exactly
//! one reply on that port.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod kernel;
pub mod origin;
pub mod transport;

pub mod bridge;
pub mod editor;
pub mod frame;
pub mod lifecycle;

pub mod config;
pub mod logging;
