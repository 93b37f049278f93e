// SPDX-License-Identifier: GPL-3.0-only
//! Connector polling setup
//!
//! Hotplug interrupts are not always usable, e.g. while the display block is
//! powered down. [`Hotplug::poll_init`] switches every hotplug-capable
//! connector to polling (or back) from a deferred work item, since callers
//! may already hold the connector configuration lock.

use std::sync::atomic::Ordering;

use super::Hotplug;
use crate::connector::PollFlags;

impl Hotplug {
    /// Enable or disable polling for all connectors with a hotplug pin
    ///
    /// Racing calls are fine, the work always reads the latest value.
    pub fn poll_init(&self, enable: bool) {
        self.poll_enabled.store(enable, Ordering::Release);
        self.poll_init_work.schedule();
    }

    pub(super) async fn poll_init_work(&self) {
        let enabled = {
            let _config = self.mode_config.lock().await;
            let enabled = self.poll_enabled.load(Ordering::Acquire);

            {
                let mut shared = self.lock();
                for (connector, polled) in self.connectors.iter().zip(shared.polled.iter_mut()) {
                    *polled = connector.desired_poll;

                    // MST sub-connectors are reprobed by the MST helpers
                    if connector.mst {
                        continue;
                    }

                    if polled.is_empty() && self.info.has_hotplug && !connector.hpd_pin.is_none() {
                        *polled = if enabled {
                            PollFlags::POLL
                        } else {
                            PollFlags::HPD
                        };
                    }
                }
            }

            if enabled {
                self.platform.poll_enable();
            }
            enabled
        };

        // Catch anything that changed while polling was being turned off
        if !enabled {
            self.platform.reprobe_all();
        }
    }
}
