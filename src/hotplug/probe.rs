// SPDX-License-Identifier: GPL-3.0-only
//! Regular hotplug work: re-probes connectors whose pin fired

use std::sync::Arc;

use super::Hotplug;
use crate::connector::{Connector, ConnectorStatus};
use crate::error::HpdError;

impl Hotplug {
    pub(super) async fn hotplug_work(&self) {
        let mut statuses = self.mode_config.lock().await;
        debug!("running encoder hotplug functions");

        let (event_bits, switched) = {
            let mut guard = self.lock();
            let shared = &mut *guard;
            let event_bits = shared.pending.take_event_bits();
            // Connectors of pins with a storm go to polling first
            let switched = self.switch_to_polling(shared);
            (event_bits, switched)
        };

        if switched {
            self.arm_storm_reenable();
        }

        let mut changed = false;
        for (connector, recorded) in self.connectors.iter().zip(statuses.iter_mut()) {
            if connector.mst || !event_bits.has(connector.hpd_pin) {
                continue;
            }
            debug!(
                "Connector {} (pin {}) received hotplug event.",
                connector.name, connector.hpd_pin
            );
            changed |= update_status(connector, recorded).await;
        }
        drop(statuses);

        if changed {
            self.platform.hotplug_event();
        }
    }
}

/// Probe `connector`, returning true if its status differs from `recorded`
async fn update_status(connector: &Connector, recorded: &mut ConnectorStatus) -> bool {
    let probe = Arc::clone(&connector.probe);
    let status = match tokio::task::spawn_blocking(move || probe.detect()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            error!(connector = %connector.name, error = ?err, "Connector detect failed");
            ConnectorStatus::Unknown
        }
        Err(err) => {
            error!(connector = %connector.name, "Connector detect failed: {}", HpdError::from(err));
            ConnectorStatus::Unknown
        }
    };

    if status == *recorded {
        return false;
    }

    debug!(
        "[CONNECTOR:{}] status updated from {} to {}",
        connector.name, recorded, status
    );
    *recorded = status;
    true
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::connector::ConnectorStatus;
    use crate::hotplug::pins::PinMask;
    use crate::hotplug::test_support::rig;

    #[tokio::test]
    async fn test_unchanged_status_sends_no_event() {
        let rig = rig(Config::default());
        rig.crt.set_status(ConnectorStatus::Connected);

        rig.hotplug.report_hotplug(PinMask::CRT, PinMask::empty());
        rig.hotplug.flush().await;
        assert_eq!(rig.platform.calls().hotplug_events, 1);

        rig.hotplug.report_hotplug(PinMask::CRT, PinMask::empty());
        rig.hotplug.flush().await;
        assert_eq!(rig.crt.detect_count(), 2);
        assert_eq!(rig.platform.calls().hotplug_events, 1);
    }

    #[tokio::test]
    async fn test_failed_probe_records_unknown() {
        let rig = rig(Config::default());
        rig.crt.set_status(ConnectorStatus::Connected);
        rig.hotplug.report_hotplug(PinMask::CRT, PinMask::empty());
        rig.hotplug.flush().await;

        rig.crt.fail_next_detect();
        rig.hotplug.report_hotplug(PinMask::CRT, PinMask::empty());
        rig.hotplug.flush().await;

        let status = rig.hotplug.connector_status(0).await;
        assert_eq!(status, Some(ConnectorStatus::Unknown));
        assert_eq!(rig.platform.calls().hotplug_events, 2);
    }

    #[tokio::test]
    async fn test_pending_bits_probe_only_matching_connectors() {
        let rig = rig(Config::default());
        rig.crt.set_status(ConnectorStatus::Connected);

        // Port B has a registered handler, so only the CRT is probed here
        let pins = PinMask::CRT | PinMask::PORT_B;
        rig.hotplug.report_hotplug(pins, PinMask::empty());
        rig.hotplug.flush().await;

        assert_eq!(rig.crt.detect_count(), 1);
        assert_eq!(rig.dp.detect_count(), 0);
    }
}
