// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the hotplug pipeline
//!
//! Runtime hotplug outcomes (storms, declined pulses, failed probes) are not
//! errors and never show up here. These variants cover setup and I/O paths.

use thiserror::Error;

use crate::hotplug::Port;

/// Main error type
#[derive(Error, Debug)]
pub enum HpdError {
    /// The pipeline was built outside of a tokio runtime
    #[error("No tokio runtime available to run deferred hotplug work")]
    NoRuntime,

    /// Two digital port handlers were registered for the same port
    #[error("Digital port handler already registered for port {0}")]
    DuplicateDigitalPort(Port),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// KDL parse error
    #[error("Failed to parse configuration: {0}")]
    Kdl(#[from] kdl::KdlError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Result type alias for HpdError
pub type Result<T> = std::result::Result<T, HpdError>;
