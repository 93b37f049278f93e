// SPDX-License-Identifier: GPL-3.0-only
//! Simulated hardware for replaying hotplug traces and for tests
//!
//! Every capability records what the pipeline asked of it, so callers can
//! inspect the effects of a run afterwards.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::anyhow;
use parking_lot::Mutex;

use crate::connector::{ConnectorProbe, ConnectorStatus};
use crate::hotplug::{PinMask, Port};
use crate::platform::{DigitalPortHandler, DisplayPlatform, PulseOutcome};

/// Platform calls seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimCalls {
    pub irq_setups: Vec<PinMask>,
    pub poll_enables: usize,
    pub hotplug_events: usize,
    pub reprobes: usize,
}

#[derive(Debug, Default)]
pub struct SimPlatform {
    calls: Mutex<SimCalls>,
}

impl SimPlatform {
    pub fn calls(&self) -> SimCalls {
        self.calls.lock().clone()
    }
}

impl DisplayPlatform for SimPlatform {
    fn hpd_irq_setup(&self, enabled: PinMask) {
        info!("irq setup: enabled pins {:?}", enabled);
        self.calls.lock().irq_setups.push(enabled);
    }

    fn poll_enable(&self) {
        info!("connector polling enabled");
        self.calls.lock().poll_enables += 1;
    }

    fn hotplug_event(&self) {
        info!("hotplug event sent");
        self.calls.lock().hotplug_events += 1;
    }

    fn reprobe_all(&self) {
        info!("reprobing all connectors");
        self.calls.lock().reprobes += 1;
    }
}

/// Connector whose sink can be plugged and unplugged at will
#[derive(Debug)]
pub struct SimConnector {
    status: Mutex<ConnectorStatus>,
    detects: AtomicUsize,
    fail_next: AtomicBool,
}

impl SimConnector {
    pub fn new(status: ConnectorStatus) -> Self {
        Self {
            status: Mutex::new(status),
            detects: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn set_status(&self, status: ConnectorStatus) {
        *self.status.lock() = status;
    }

    pub fn status(&self) -> ConnectorStatus {
        *self.status.lock()
    }

    /// Number of detect calls so far, failed ones included
    pub fn detect_count(&self) -> usize {
        self.detects.load(Ordering::SeqCst)
    }

    /// Make the next detect call fail
    pub fn fail_next_detect(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl ConnectorProbe for SimConnector {
    fn detect(&self) -> anyhow::Result<ConnectorStatus> {
        self.detects.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("sink did not answer"));
        }
        Ok(self.status())
    }
}

/// DP pulse handler with a fixed answer
#[derive(Debug)]
pub struct SimDigitalPort {
    outcome: Mutex<PulseOutcome>,
    pulses: Mutex<Vec<(Port, bool)>>,
}

impl SimDigitalPort {
    pub fn new(outcome: PulseOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            pulses: Mutex::new(Vec::new()),
        }
    }

    pub fn set_outcome(&self, outcome: PulseOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// Every `(port, long)` pulse handled so far
    pub fn pulses(&self) -> Vec<(Port, bool)> {
        self.pulses.lock().clone()
    }
}

impl DigitalPortHandler for SimDigitalPort {
    fn hpd_pulse(&self, port: Port, long: bool) -> PulseOutcome {
        let outcome = *self.outcome.lock();
        let kind = if long { "long" } else { "short" };
        debug!("port {} {} pulse: {:?}", port, kind, outcome);
        self.pulses.lock().push((port, long));
        outcome
    }
}
