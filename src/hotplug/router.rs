// SPDX-License-Identifier: GPL-3.0-only
//! Interrupt-side entry point: storm detection and routing of fired pins

use std::sync::atomic::Ordering;

use tokio::time::Instant;

use super::pins::{PinMask, pin_to_port};
use super::state::PinMode;
use super::{Hotplug, Shared};

impl Hotplug {
    /// Main hotplug interrupt handler
    ///
    /// `pin_mask` holds the pins that fired and `long_mask` those that may be
    /// long pulses. `long_mask` only matters for pins of a registered digital
    /// port; every other pulse counts as long.
    ///
    /// Never blocks. Deferred work is queued after the lock is released and
    /// reports arriving before it runs are merged into the same masks.
    pub fn report_hotplug(&self, pin_mask: PinMask, long_mask: PinMask) {
        if pin_mask.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut queue_dig = false;
        let mut queue_hp = false;
        let mut storm_detected = false;

        {
            let mut guard = self.lock();
            let Shared {
                pins,
                pending,
                storm,
                ..
            } = &mut *guard;

            for pin in pin_mask.pins() {
                let dig_port = pin_to_port(&self.info, pin)
                    .filter(|port| self.dig_ports[port.index()].is_some());

                let mut long = true;
                if let Some(port) = dig_port {
                    long = long_mask.has(pin);
                    let kind = if long { "long" } else { "short" };
                    debug!("digital hpd port {} - {}", port, kind);
                    queue_dig = true;
                    if long {
                        pending.long_ports |= port.mask();
                    } else {
                        pending.short_ports |= port.mask();
                    }
                }

                match pins.mode(pin) {
                    PinMode::Enabled => {}
                    PinMode::Disabled => {
                        // Some hardware latches the status bit even with the
                        // interrupt masked, only complain where it can't.
                        if !self.info.latches_masked_hpd
                            && !self.warned_disabled_irq.swap(true, Ordering::Relaxed)
                        {
                            warn!("Received HPD interrupt on pin {} although disabled", pin);
                        }
                        continue;
                    }
                    PinMode::StormDisabled => continue,
                }

                if dig_port.is_none() {
                    pending.event_bits |= pin.mask();
                    queue_hp = true;
                }

                if storm.record_pulse(pins, pin, long, now) {
                    pending.event_bits.remove(pin.mask());
                    storm_detected = true;
                    queue_hp = true;
                }
            }

            // Mask the stormy pins right away; polling is set up by the
            // hotplug work.
            if storm_detected && self.irqs_enabled() {
                self.platform.hpd_irq_setup(pins.enabled_mask());
            }
        }

        if queue_dig {
            self.dig_port_work.schedule();
        }
        if queue_hp {
            self.hotplug_work.schedule();
        }
    }
}
