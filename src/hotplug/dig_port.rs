// SPDX-License-Identifier: GPL-3.0-only
//! Digital port work: hands DP pulses to the per-port handlers

use std::sync::Arc;

use super::Hotplug;
use super::pins::{PinMask, Port, default_pin};
use crate::error::HpdError;
use crate::platform::PulseOutcome;

impl Hotplug {
    pub(super) async fn dig_port_work(&self) {
        let (short_ports, long_ports) = self.lock().pending.take_ports();
        let mut old_bits = PinMask::empty();

        for port in Port::ALL {
            let Some(handler) = self.dig_ports[port.index()].as_ref().map(Arc::clone) else {
                continue;
            };

            // A long pulse in the same batch wins over a short one
            let long = long_ports.has(port);
            if !long && !short_ports.has(port) {
                continue;
            }

            let pulse = tokio::task::spawn_blocking(move || handler.hpd_pulse(port, long));
            let outcome = match pulse.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let err = HpdError::from(err);
                    error!("Pulse handler for port {} failed: {}", port, err);
                    PulseOutcome::NotHandled
                }
            };

            if outcome == PulseOutcome::NotHandled {
                let pin = default_pin(&self.info, port);
                let kind = if long { "long" } else { "short" };
                debug!(
                    "Port {} declined {} pulse, falling back to hotplug on pin {}",
                    port, kind, pin
                );
                old_bits |= pin.mask();
            }
        }

        if !old_bits.is_empty() {
            self.lock().pending.event_bits |= old_bits;
            self.hotplug_work.schedule();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::connector::ConnectorStatus;
    use crate::hotplug::PinMode;
    use crate::hotplug::pins::{HpdPin, PinMask, Port};
    use crate::hotplug::test_support::rig;
    use crate::platform::PulseOutcome;

    #[tokio::test]
    async fn test_short_and_long_coalesce_into_one_long_pulse() {
        let rig = rig(Config::default());
        let hp = &rig.hotplug;
        hp.report_hotplug(PinMask::PORT_B, PinMask::empty());
        hp.report_hotplug(PinMask::PORT_B, PinMask::PORT_B);
        hp.flush().await;

        assert_eq!(rig.port_b.pulses(), vec![(Port::B, true)]);
        assert_eq!(rig.dp.detect_count(), 0);
        assert!(hp.lock().pending.is_empty());
    }

    #[tokio::test]
    async fn test_declined_pulse_falls_back_to_probe() {
        let rig = rig(Config::default());
        rig.port_b.set_outcome(PulseOutcome::NotHandled);
        rig.dp.set_status(ConnectorStatus::Connected);

        let hp = &rig.hotplug;
        hp.report_hotplug(PinMask::PORT_B, PinMask::empty());
        hp.flush().await;

        assert_eq!(rig.port_b.pulses(), vec![(Port::B, false)]);
        assert_eq!(rig.dp.detect_count(), 1);
        assert_eq!(rig.crt.detect_count(), 0);
        let status = hp.connector_status(1).await;
        assert_eq!(status, Some(ConnectorStatus::Connected));
        assert_eq!(rig.platform.calls().hotplug_events, 1);
    }

    #[tokio::test]
    async fn test_handled_pulse_skips_probe() {
        let rig = rig(Config::default());
        rig.hotplug.report_hotplug(PinMask::PORT_B, PinMask::PORT_B);
        rig.hotplug.flush().await;

        assert_eq!(rig.dp.detect_count(), 0);
        assert_eq!(rig.platform.calls().hotplug_events, 0);
        assert_eq!(rig.hotplug.pin_mode(HpdPin::PortB), PinMode::Enabled);
    }
}
