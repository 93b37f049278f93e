// SPDX-License-Identifier: GPL-3.0-only
//! Display connectors as seen by the hotplug pipeline

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use bitflags::bitflags;

use crate::hotplug::HpdPin;

bitflags! {
    /// How a connector's status changes get noticed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollFlags: u8 {
        /// Hotplug interrupt
        const HPD = 1 << 0;
        /// Poll for connection
        const CONNECT = 1 << 1;
        /// Poll for disconnection
        const DISCONNECT = 1 << 2;
    }
}

impl PollFlags {
    /// Full polling, used while a pin's interrupt is off
    pub const POLL: PollFlags = PollFlags::CONNECT.union(PollFlags::DISCONNECT);
}

impl fmt::Display for PollFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<_> = self
            .iter_names()
            .map(|(name, _)| name.to_lowercase())
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// Connection status reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
    Unknown,
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectorStatus::Connected => "connected",
            ConnectorStatus::Disconnected => "disconnected",
            ConnectorStatus::Unknown => "unknown",
        })
    }
}

/// Connector detect hook
pub trait ConnectorProbe: Send + Sync {
    /// Query the sink. May block on bus I/O.
    fn detect(&self) -> Result<ConnectorStatus>;
}

/// Static description of one connector
#[derive(Clone)]
pub struct Connector {
    pub name: String,
    /// Hotplug line of the connector's encoder
    pub hpd_pin: HpdPin,
    /// Polling the display-management layer asked for
    pub desired_poll: PollFlags,
    /// Dynamic MST sub-connector, handled by the MST helpers
    pub mst: bool,
    pub probe: Arc<dyn ConnectorProbe>,
}

impl Connector {
    pub fn new(
        name: impl Into<String>,
        hpd_pin: HpdPin,
        probe: Arc<dyn ConnectorProbe>,
    ) -> Self {
        Self {
            name: name.into(),
            hpd_pin,
            desired_poll: PollFlags::empty(),
            mst: false,
            probe,
        }
    }

    pub fn with_desired_poll(mut self, flags: PollFlags) -> Self {
        self.desired_poll = flags;
        self
    }

    pub fn mst(mut self) -> Self {
        self.mst = true;
        self
    }

    /// Whether this connector answers to `pin`'s interrupt
    pub fn on_pin(&self, pin: HpdPin) -> bool {
        !self.mst && !pin.is_none() && self.hpd_pin == pin
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name)
            .field("hpd_pin", &self.hpd_pin)
            .field("desired_poll", &self.desired_poll)
            .field("mst", &self.mst)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl ConnectorProbe for Fixed {
        fn detect(&self) -> Result<ConnectorStatus> {
            Ok(ConnectorStatus::Connected)
        }
    }

    #[test]
    fn test_poll_flags_display() {
        assert_eq!(PollFlags::empty().to_string(), "none");
        assert_eq!(PollFlags::HPD.to_string(), "hpd");
        assert_eq!(PollFlags::POLL.to_string(), "connect|disconnect");
    }

    #[test]
    fn test_mst_connector_never_matches_a_pin() {
        let dp = Connector::new("DP-1", HpdPin::PortB, Arc::new(Fixed));
        assert!(dp.on_pin(HpdPin::PortB));
        assert!(!dp.on_pin(HpdPin::PortC));

        let sub = dp.clone().mst();
        assert!(!sub.on_pin(HpdPin::PortB));

        let pinless = Connector::new("VGA-1", HpdPin::None, Arc::new(Fixed));
        assert!(!pinless.on_pin(HpdPin::None));
    }
}
