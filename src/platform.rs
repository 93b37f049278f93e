// SPDX-License-Identifier: GPL-3.0-only
//! Capabilities the hotplug pipeline calls out to
//!
//! Register decoding, DP sideband handling and userspace notification live
//! outside this crate. The pipeline only sees them through these traits,
//! injected when the pipeline is built.

use crate::hotplug::{PinMask, Port};

/// Static facts about the display hardware revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Masking a hotplug interrupt does not stop the status bit from latching,
    /// so reports on disabled pins are expected and not worth a warning.
    pub latches_masked_hpd: bool,
    /// Hotplug interrupts are available at all
    pub has_hotplug: bool,
    /// Multi-stream transport is supported
    pub has_dp_mst: bool,
    /// Port F is wired to the port-E hotplug line
    pub port_f_on_hpd_e: bool,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self {
            latches_masked_hpd: false,
            has_hotplug: true,
            has_dp_mst: true,
            port_f_on_hpd_e: false,
        }
    }
}

/// Outcome of a digital port pulse handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseOutcome {
    /// The port consumed the pulse
    Handled,
    /// The port declined; the pin goes through a regular connector probe
    NotHandled,
}

/// Per-port DP pulse handler, registered by the digital port layer
pub trait DigitalPortHandler: Send + Sync {
    /// Handle a long or short pulse on `port`. May block.
    fn hpd_pulse(&self, port: Port, long: bool) -> PulseOutcome;
}

/// Platform hooks
///
/// `hpd_irq_setup` is invoked with the pipeline's internal lock held and must
/// not block or call back into the pipeline.
pub trait DisplayPlatform: Send + Sync {
    /// Reprogram interrupt masking so that exactly `enabled` pins interrupt
    fn hpd_irq_setup(&self, enabled: PinMask);

    /// Start the connector polling helper
    fn poll_enable(&self);

    /// Tell userspace that connector status changed
    fn hotplug_event(&self);

    /// Re-probe every connector once
    fn reprobe_all(&self);
}
