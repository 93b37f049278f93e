// SPDX-License-Identifier: GPL-3.0-only
//! Storm mitigation: polling while a pin is stormy, re-enable after a cooldown
//!
//! A pin moves `Enabled -> StormDisabled` in the storm detector,
//! `StormDisabled -> Disabled` when the hotplug work switches its connectors
//! to polling, and `Disabled -> Enabled` when the re-enable timer fires.
//! Every storm re-arms the one timer, so the cooldown counts from the most
//! recent storm.

use std::time::Duration;

use super::state::PinMode;
use super::{Hotplug, Shared};
use crate::connector::PollFlags;

/// How long a stormy pin stays on polling
pub const STORM_REENABLE_DELAY: Duration = Duration::from_secs(2 * 60);

impl Hotplug {
    /// Move storm-marked pins to polling. Called with the lock held.
    ///
    /// Returns true if any pin was switched.
    pub(super) fn switch_to_polling(&self, shared: &mut Shared) -> bool {
        let stormy = shared.pins.in_mode(PinMode::StormDisabled);

        for pin in stormy.pins() {
            shared.pins.set_mode(pin, PinMode::Disabled);

            for (connector, polled) in self.connectors.iter().zip(shared.polled.iter_mut()) {
                if !connector.on_pin(pin) || *polled != PollFlags::HPD {
                    continue;
                }
                info!(
                    "HPD interrupt storm detected on connector {}: switching from hotplug detection to polling",
                    connector.name
                );
                *polled = PollFlags::POLL;
            }
        }

        !stormy.is_empty()
    }

    /// Start polling and (re)arm the re-enable timer
    pub(super) fn arm_storm_reenable(&self) {
        self.platform.poll_enable();
        self.reenable_work.schedule_in(self.reenable_delay);
    }

    pub(super) fn storm_reenable_work(&self) {
        let mut guard = self.lock();
        let shared = &mut *guard;

        for pin in shared.pins.in_mode(PinMode::Disabled).pins() {
            shared.pins.set_mode(pin, PinMode::Enabled);

            for (connector, polled) in self.connectors.iter().zip(shared.polled.iter_mut()) {
                if !connector.on_pin(pin) {
                    continue;
                }
                let restored = if connector.desired_poll.is_empty() {
                    PollFlags::HPD
                } else {
                    connector.desired_poll
                };
                if *polled != restored {
                    debug!("Reenabling HPD on connector {}", connector.name);
                }
                *polled = restored;
            }
        }

        if self.irqs_enabled() {
            self.platform.hpd_irq_setup(shared.pins.enabled_mask());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hotplug::pins::{HpdPin, PinMask};
    use crate::hotplug::test_support::rig;
    use tokio::time::Instant;

    fn stormy() -> Config {
        Config {
            storm_threshold: 5,
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_storm_switches_connector_to_polling() {
        let rig = rig(stormy());
        let hp = &rig.hotplug;
        hp.set_display_irqs_enabled(true);
        hp.init();
        hp.flush().await;
        assert_eq!(hp.connector_poll_flags(0), Some(PollFlags::HPD));

        let stormed_at = Instant::now();
        hp.report_hotplug(PinMask::CRT, PinMask::empty());
        hp.flush().await;

        assert_eq!(hp.pin_mode(HpdPin::Crt), PinMode::Disabled);
        assert_eq!(hp.connector_poll_flags(0), Some(PollFlags::POLL));
        assert_eq!(hp.connector_poll_flags(1), Some(PollFlags::HPD));
        let deadline = stormed_at + STORM_REENABLE_DELAY;
        assert_eq!(hp.reenable_deadline(), Some(deadline));
        assert_eq!(rig.platform.calls().poll_enables, 1);
        assert_eq!(rig.crt.detect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenable_restores_pin_and_polling() {
        let rig = rig(stormy());
        let hp = &rig.hotplug;
        hp.set_display_irqs_enabled(true);
        hp.init();
        hp.flush().await;

        hp.report_hotplug(PinMask::CRT, PinMask::empty());
        hp.flush().await;
        tokio::time::sleep(STORM_REENABLE_DELAY + Duration::from_secs(1)).await;
        hp.flush().await;

        assert_eq!(hp.pin_mode(HpdPin::Crt), PinMode::Enabled);
        assert_eq!(hp.connector_poll_flags(0), Some(PollFlags::HPD));
        assert_eq!(hp.reenable_deadline(), None);
        let last_setup = rig.platform.calls().irq_setups.last().copied();
        assert_eq!(last_setup, Some(PinMask::all()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_storm_pushes_cooldown_out() {
        let rig = rig(stormy());
        let hp = &rig.hotplug;
        hp.init();
        hp.flush().await;

        hp.report_hotplug(PinMask::CRT, PinMask::empty());
        hp.flush().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        let second = Instant::now();
        // Port C has no digital handler, so it is a plain hotplug pin
        hp.report_hotplug(PinMask::PORT_C, PinMask::empty());
        hp.flush().await;
        assert_eq!(hp.reenable_deadline(), Some(second + STORM_REENABLE_DELAY));

        // The first deadline passes without re-enabling anything
        tokio::time::sleep(Duration::from_secs(61)).await;
        hp.flush().await;
        assert_eq!(hp.pin_mode(HpdPin::Crt), PinMode::Disabled);

        tokio::time::sleep(Duration::from_secs(60)).await;
        hp.flush().await;
        assert_eq!(hp.pin_mode(HpdPin::Crt), PinMode::Enabled);
        assert_eq!(hp.pin_mode(HpdPin::PortC), PinMode::Enabled);
    }

    #[tokio::test]
    async fn test_reenable_with_nothing_to_restore() {
        let rig = rig(Config::default());
        rig.hotplug.storm_reenable_work();
        assert_eq!(rig.hotplug.lock().pins.enabled_mask(), PinMask::all());
        assert!(rig.platform.calls().irq_setups.is_empty());
    }

    #[tokio::test]
    async fn test_only_hpd_polled_connectors_are_switched() {
        let rig = rig(Config::default());
        let hp = &rig.hotplug;
        let mut guard = hp.lock();
        let shared = &mut *guard;
        shared.polled[0] = PollFlags::CONNECT;
        shared.polled[1] = PollFlags::HPD;
        shared.pins.set_mode(HpdPin::Crt, PinMode::StormDisabled);
        shared.pins.set_mode(HpdPin::PortB, PinMode::StormDisabled);

        assert!(hp.switch_to_polling(shared));
        assert_eq!(shared.polled[0], PollFlags::CONNECT);
        assert_eq!(shared.polled[1], PollFlags::POLL);
        let disabled = PinMask::CRT | PinMask::PORT_B;
        assert_eq!(shared.pins.in_mode(PinMode::Disabled), disabled);
        assert!(!hp.switch_to_polling(shared));
    }
}
