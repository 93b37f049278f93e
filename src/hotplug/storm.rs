// SPDX-License-Identifier: GPL-3.0-only
//! Hotplug interrupt storm detection
//!
//! Each pin counts pulses inside a fixed one second window. Long pulses weigh
//! 10, short pulses weigh 1. Once the count exceeds the threshold the pin is
//! marked [`PinMode::StormDisabled`] and the caller takes it from there.
//!
//! Short pulses are only counted when short storm detection is on. They are a
//! normal side effect of DP MST sideband traffic, so the default is to count
//! them only on hardware without MST.

use std::time::Duration;

use tokio::time::Instant;

use super::pins::HpdPin;
use super::state::{PinMode, PinTable};

/// Length of the detection window
pub const STORM_DETECT_PERIOD: Duration = Duration::from_millis(1000);

/// Default number of weighted pulses allowed per window
pub const DEFAULT_STORM_THRESHOLD: u32 = 50;

const LONG_PULSE_WEIGHT: u32 = 10;
const SHORT_PULSE_WEIGHT: u32 = 1;

/// Storm detection knobs, adjustable at runtime by debug tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StormPolicy {
    /// Weighted pulses allowed per window, 0 turns detection off
    pub threshold: u32,
    pub short_storm_enabled: bool,
}

impl StormPolicy {
    pub fn new(threshold: u32, short_storm_enabled: bool) -> Self {
        Self {
            threshold,
            short_storm_enabled,
        }
    }

    /// Update `pin`'s statistics for a pulse seen at `now`
    ///
    /// Returns true if this pulse pushed the pin over the threshold.
    pub fn record_pulse(&self, pins: &mut PinTable, pin: HpdPin, long: bool, now: Instant) -> bool {
        if self.threshold == 0 || (!long && !self.short_storm_enabled) {
            return false;
        }

        let stats = pins.get_mut(pin);
        let in_window = match stats.window_start {
            Some(start) => now >= start && now.duration_since(start) < STORM_DETECT_PERIOD,
            None => false,
        };
        if !in_window {
            stats.window_start = Some(now);
            stats.pulse_count = 0;
        }

        stats.pulse_count += if long {
            LONG_PULSE_WEIGHT
        } else {
            SHORT_PULSE_WEIGHT
        };

        if stats.pulse_count > self.threshold {
            stats.mode = PinMode::StormDisabled;
            debug!("HPD interrupt storm detected on pin {}", pin);
            true
        } else {
            debug!(
                "Received HPD interrupt on pin {} - cnt: {}",
                pin, stats.pulse_count
            );
            false
        }
    }
}

impl Default for StormPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STORM_THRESHOLD, false)
    }
}
