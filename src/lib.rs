// SPDX-License-Identifier: GPL-3.0-only
//! Display hotplug (HPD) interrupt arbitration
//!
//! Routes hotplug interrupts to DP pulse handlers or connector probes,
//! detects interrupt storms and falls back to polling while a pin misbehaves.
//! See [`hotplug`] for the pipeline itself.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod connector;
pub mod error;
pub mod hotplug;
pub mod platform;
pub mod scenario;
pub mod sim;
pub mod work;

pub use error::{HpdError, Result};
