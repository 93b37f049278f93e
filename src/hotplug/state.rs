// SPDX-License-Identifier: GPL-3.0-only
//! Per-pin runtime state and the pending event accumulators
//!
//! Everything in here lives behind the pipeline's shared lock.

use std::fmt;

use tokio::time::Instant;

use super::pins::{HPD_NUM_PINS, HpdPin, PinMask, PortMask};

/// Interrupt mode of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinMode {
    Enabled,
    /// Off, either explicitly or while its connector is being polled
    Disabled,
    /// Storm detected, waiting for the switch to polling
    StormDisabled,
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PinMode::Enabled => "enabled",
            PinMode::Disabled => "disabled",
            PinMode::StormDisabled => "storm-disabled",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PinRuntimeState {
    pub mode: PinMode,
    pub pulse_count: u32,
    /// Start of the current detection window, `None` until the first pulse
    pub window_start: Option<Instant>,
}

impl Default for PinRuntimeState {
    fn default() -> Self {
        Self {
            mode: PinMode::Enabled,
            pulse_count: 0,
            window_start: None,
        }
    }
}

/// Fixed-size table indexed by [`HpdPin`]
#[derive(Debug, Clone, Default)]
pub struct PinTable {
    pins: [PinRuntimeState; HPD_NUM_PINS],
}

impl PinTable {
    pub fn get(&self, pin: HpdPin) -> &PinRuntimeState {
        &self.pins[pin.index()]
    }

    pub fn get_mut(&mut self, pin: HpdPin) -> &mut PinRuntimeState {
        &mut self.pins[pin.index()]
    }

    pub fn mode(&self, pin: HpdPin) -> PinMode {
        self.get(pin).mode
    }

    pub fn set_mode(&mut self, pin: HpdPin, mode: PinMode) {
        self.get_mut(pin).mode = mode;
    }

    /// Back to `Enabled` with clean statistics
    pub fn reset(&mut self) {
        for pin in HpdPin::ALL {
            let state = self.get_mut(pin);
            state.mode = PinMode::Enabled;
            state.pulse_count = 0;
        }
    }

    /// Pins in `mode`
    pub fn in_mode(&self, mode: PinMode) -> PinMask {
        HpdPin::ALL
            .into_iter()
            .filter(|pin| self.mode(*pin) == mode)
            .collect()
    }

    /// Pins that should raise interrupts
    pub fn enabled_mask(&self) -> PinMask {
        self.in_mode(PinMode::Enabled)
    }
}

/// Work accumulated by the producer and not yet picked up by a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEvents {
    /// Pins waiting for a connector probe
    pub event_bits: PinMask,
    pub short_ports: PortMask,
    pub long_ports: PortMask,
}

impl Default for PendingEvents {
    fn default() -> Self {
        Self {
            event_bits: PinMask::empty(),
            short_ports: PortMask::empty(),
            long_ports: PortMask::empty(),
        }
    }
}

impl PendingEvents {
    /// Swap out the generic pins, leaving none behind
    pub fn take_event_bits(&mut self) -> PinMask {
        std::mem::replace(&mut self.event_bits, PinMask::empty())
    }

    /// Swap out the digital port masks as `(short, long)`
    pub fn take_ports(&mut self) -> (PortMask, PortMask) {
        (
            std::mem::replace(&mut self.short_ports, PortMask::empty()),
            std::mem::replace(&mut self.long_ports, PortMask::empty()),
        )
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.event_bits.is_empty() && self.short_ports.is_empty() && self.long_ports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotplug::pins::Port;

    #[test]
    fn test_table_starts_enabled() {
        let table = PinTable::default();
        for pin in HpdPin::ALL {
            assert_eq!(table.mode(pin), PinMode::Enabled);
            assert_eq!(table.get(pin).pulse_count, 0);
        }
        assert_eq!(table.enabled_mask(), PinMask::all());
    }

    #[test]
    fn test_reset_restores_enabled() {
        let mut table = PinTable::default();
        table.set_mode(HpdPin::PortB, PinMode::StormDisabled);
        table.set_mode(HpdPin::Crt, PinMode::Disabled);
        table.get_mut(HpdPin::PortB).pulse_count = 42;

        assert_eq!(table.in_mode(PinMode::StormDisabled), PinMask::PORT_B);
        assert!(!table.enabled_mask().has(HpdPin::Crt));

        table.reset();
        assert_eq!(table.enabled_mask(), PinMask::all());
        assert_eq!(table.get(HpdPin::PortB).pulse_count, 0);
    }

    #[test]
    fn test_take_leaves_accumulators_empty() {
        let mut pending = PendingEvents::default();
        pending.event_bits |= PinMask::CRT;
        pending.short_ports |= Port::B.mask();
        pending.long_ports |= Port::C.mask();

        assert_eq!(pending.take_event_bits(), PinMask::CRT);
        assert!(pending.event_bits.is_empty());

        let (short, long) = pending.take_ports();
        assert_eq!(short, PortMask::B);
        assert_eq!(long, PortMask::C);
        assert!(pending.is_empty());
    }
}
