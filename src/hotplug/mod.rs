// SPDX-License-Identifier: GPL-3.0-only
//! Display hotplug interrupt handling
//!
//! Platform interrupt code decodes its registers into a mask of hotplug pins
//! that fired plus a mask of pins that may be long pulses, and hands both to
//! [`Hotplug::report_hotplug`]. From there:
//!
//! - the router does storm detection and splits the pins between the digital
//!   port work (DP short pulses and long pulses) and the regular hotplug work,
//! - the digital port work calls the DP pulse handlers, sending declined
//!   pulses on to the regular hotplug work,
//! - the regular hotplug work probes the affected connectors and sends a
//!   single hotplug event if anything changed,
//! - pins with an interrupt storm are switched to polling and get their
//!   interrupt back after [`STORM_REENABLE_DELAY`].
//!
//! All per-pin state and pending masks sit behind one lock that is only ever
//! held for short, non-blocking sections. Connector probing happens outside
//! of it on the blocking pool.

mod dig_port;
mod mitigation;
mod pins;
mod poll_init;
mod probe;
mod router;
mod state;
mod storm;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::config::Config;
use crate::connector::{Connector, ConnectorStatus, PollFlags};
use crate::error::{HpdError, Result};
use crate::platform::{DigitalPortHandler, DisplayPlatform, PlatformInfo};
use crate::work::{DelayedWork, Work};

pub use mitigation::STORM_REENABLE_DELAY;
pub use pins::{
    HPD_NUM_PINS, HpdPin, MAX_PORTS, PinMask, Port, PortMask, default_pin, pin_to_port,
};
pub use state::PinMode;
pub use storm::{DEFAULT_STORM_THRESHOLD, STORM_DETECT_PERIOD, StormPolicy};

use state::{PendingEvents, PinTable};

/// State guarded by the pipeline lock
struct Shared {
    pins: PinTable,
    pending: PendingEvents,
    storm: StormPolicy,
    /// Active polling flags, indexed like `Hotplug::connectors`
    polled: Vec<PollFlags>,
}

/// The hotplug pipeline
///
/// Built through [`Hotplug::builder`] and shared as an `Arc`. Deferred work
/// only holds weak references, so dropping the last `Arc` stops the pipeline.
pub struct Hotplug {
    info: PlatformInfo,
    platform: Arc<dyn DisplayPlatform>,
    connectors: Vec<Connector>,
    dig_ports: [Option<Arc<dyn DigitalPortHandler>>; MAX_PORTS],
    shared: Mutex<Shared>,
    /// Connector configuration lock, also holds the last probed status
    mode_config: tokio::sync::Mutex<Vec<ConnectorStatus>>,
    poll_enabled: AtomicBool,
    display_irqs_enabled: AtomicBool,
    warned_disabled_irq: AtomicBool,
    reenable_delay: Duration,
    dig_port_work: Work,
    hotplug_work: Work,
    poll_init_work: Work,
    reenable_work: DelayedWork,
}

pub struct HotplugBuilder {
    info: PlatformInfo,
    platform: Arc<dyn DisplayPlatform>,
    connectors: Vec<Connector>,
    dig_ports: [Option<Arc<dyn DigitalPortHandler>>; MAX_PORTS],
    config: Config,
    runtime: Option<Handle>,
}

impl HotplugBuilder {
    pub fn connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    /// Register the DP pulse handler of `port`
    pub fn digital_port(
        mut self,
        port: Port,
        handler: Arc<dyn DigitalPortHandler>,
    ) -> Result<Self> {
        let slot = &mut self.dig_ports[port.index()];
        if slot.is_some() {
            return Err(HpdError::DuplicateDigitalPort(port));
        }
        *slot = Some(handler);
        Ok(self)
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Runtime for deferred work, defaults to the current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Arc<Hotplug>> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| HpdError::NoRuntime)?,
        };
        let storm = self.config.storm_policy(&self.info);
        let polled = self.connectors.iter().map(|c| c.desired_poll).collect();
        let statuses = vec![ConnectorStatus::Unknown; self.connectors.len()];

        info!(
            "Hotplug pipeline with {} connector(s), storm threshold {}, short storm detection {}",
            self.connectors.len(),
            storm.threshold,
            if storm.short_storm_enabled { "on" } else { "off" }
        );

        Ok(Arc::new_cyclic(|weak| {
            let reenable = deferred(weak, "storm reenable", &runtime, |hp| async move {
                hp.storm_reenable_work()
            });

            Hotplug {
                info: self.info,
                platform: self.platform,
                connectors: self.connectors,
                dig_ports: self.dig_ports,
                shared: Mutex::new(Shared {
                    pins: PinTable::default(),
                    pending: PendingEvents::default(),
                    storm,
                    polled,
                }),
                mode_config: tokio::sync::Mutex::new(statuses),
                poll_enabled: AtomicBool::new(false),
                display_irqs_enabled: AtomicBool::new(false),
                warned_disabled_irq: AtomicBool::new(false),
                reenable_delay: self.config.reenable_delay(),
                dig_port_work: deferred(weak, "digital port", &runtime, |hp| async move {
                    hp.dig_port_work().await
                }),
                hotplug_work: deferred(weak, "hotplug", &runtime, |hp| async move {
                    hp.hotplug_work().await
                }),
                poll_init_work: deferred(weak, "poll init", &runtime, |hp| async move {
                    hp.poll_init_work().await
                }),
                reenable_work: DelayedWork::new(reenable),
            }
        }))
    }
}

/// Work item that runs `f` on the pipeline while it is still alive
fn deferred<F, Fut>(weak: &Weak<Hotplug>, name: &'static str, runtime: &Handle, f: F) -> Work
where
    F: Fn(Arc<Hotplug>) -> Fut + Copy + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let weak = weak.clone();
    Work::new(name, runtime.clone(), move || {
        let hotplug = weak.upgrade();
        async move {
            if let Some(hotplug) = hotplug {
                f(hotplug).await;
            }
        }
    })
}

impl Hotplug {
    pub fn builder(info: PlatformInfo, platform: Arc<dyn DisplayPlatform>) -> HotplugBuilder {
        HotplugBuilder {
            info,
            platform,
            connectors: Vec::new(),
            dig_ports: Default::default(),
            config: Config::default(),
            runtime: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock()
    }

    fn irqs_enabled(&self) -> bool {
        self.display_irqs_enabled.load(Ordering::Acquire)
    }

    /// Enable hotplug handling
    ///
    /// Resets every pin to enabled, recomputes connector polling with polling
    /// off and, if display interrupts are on, programs the interrupt masks.
    pub fn init(&self) {
        self.lock().pins.reset();

        self.poll_init(false);

        if self.irqs_enabled() {
            let shared = self.lock();
            self.platform.hpd_irq_setup(shared.pins.enabled_mask());
        }
    }

    /// Mark display interrupts as installed or torn down
    pub fn set_display_irqs_enabled(&self, enabled: bool) {
        self.display_irqs_enabled.store(enabled, Ordering::Release);
    }

    /// Turn `pin`'s hotplug handling off. Returns true if it was enabled.
    pub fn disable_pin(&self, pin: HpdPin) -> bool {
        if pin.is_none() {
            return false;
        }

        let mut shared = self.lock();
        if shared.pins.mode(pin) == PinMode::Enabled {
            shared.pins.set_mode(pin, PinMode::Disabled);
            true
        } else {
            false
        }
    }

    pub fn enable_pin(&self, pin: HpdPin) {
        if pin.is_none() {
            return;
        }
        self.lock().pins.set_mode(pin, PinMode::Enabled);
    }

    /// Drop all pending events and stop every deferred work item
    ///
    /// Waits for in-flight runs to complete. Safe to call at any time.
    pub async fn cancel_all(&self) {
        self.lock().pending.clear();

        self.dig_port_work.cancel().await;
        self.hotplug_work.cancel().await;
        self.poll_init_work.cancel().await;
        self.reenable_work.cancel().await;
        debug!("Hotplug work cancelled");
    }

    /// Wait until no deferred work is queued or running
    ///
    /// An armed but not yet expired re-enable timer does not count.
    pub async fn flush(&self) {
        loop {
            self.dig_port_work.flush().await;
            self.hotplug_work.flush().await;
            self.poll_init_work.flush().await;
            self.reenable_work.flush().await;

            if self.dig_port_work.is_idle()
                && self.hotplug_work.is_idle()
                && self.poll_init_work.is_idle()
                && self.reenable_work.is_idle()
            {
                break;
            }
        }
    }

    pub fn set_storm_threshold(&self, threshold: u32) {
        self.lock().storm.threshold = threshold;
    }

    pub fn set_short_storm_enabled(&self, enabled: bool) {
        self.lock().storm.short_storm_enabled = enabled;
    }

    pub fn storm_policy(&self) -> StormPolicy {
        self.lock().storm
    }

    pub fn pin_mode(&self, pin: HpdPin) -> PinMode {
        self.lock().pins.mode(pin)
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    /// Active polling flags of the connector at `index`
    pub fn connector_poll_flags(&self, index: usize) -> Option<PollFlags> {
        self.lock().polled.get(index).copied()
    }

    /// Last probed status of the connector at `index`
    pub async fn connector_status(&self, index: usize) -> Option<ConnectorStatus> {
        self.mode_config.lock().await.get(index).copied()
    }

    /// When the storm re-enable timer fires, if it is armed
    pub fn reenable_deadline(&self) -> Option<Instant> {
        self.reenable_work.armed_until()
    }

    pub fn platform_info(&self) -> &PlatformInfo {
        &self.info
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::platform::PulseOutcome;
    use crate::sim::{SimConnector, SimDigitalPort, SimPlatform};

    pub struct Rig {
        pub hotplug: Arc<Hotplug>,
        pub platform: Arc<SimPlatform>,
        pub crt: Arc<SimConnector>,
        pub dp: Arc<SimConnector>,
        pub port_b: Arc<SimDigitalPort>,
    }

    /// CRT on the analog pin and DP-1 on digital port B
    pub fn rig(config: Config) -> Rig {
        rig_with(PlatformInfo::default(), config)
    }

    pub fn rig_with(info: PlatformInfo, config: Config) -> Rig {
        let platform = Arc::new(SimPlatform::default());
        let crt = Arc::new(SimConnector::new(ConnectorStatus::Disconnected));
        let dp = Arc::new(SimConnector::new(ConnectorStatus::Disconnected));
        let port_b = Arc::new(SimDigitalPort::new(PulseOutcome::Handled));

        let hotplug = Hotplug::builder(info, platform.clone())
            .config(config)
            .connector(Connector::new("VGA-1", HpdPin::Crt, crt.clone()))
            .connector(Connector::new("DP-1", HpdPin::PortB, dp.clone()))
            .digital_port(Port::B, port_b.clone())
            .unwrap()
            .build()
            .unwrap();

        Rig {
            hotplug,
            platform,
            crt,
            dp,
            port_b,
        }
    }
}
