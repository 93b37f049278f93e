// SPDX-License-Identifier: GPL-3.0-only
//! Hotplug pins, physical ports and the static map between them

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::platform::PlatformInfo;

/// Number of pin slots, including the `None` sentinel
pub const HPD_NUM_PINS: usize = 10;

/// Abstract hotplug detect line
///
/// The discriminant doubles as the bit index inside a [`PinMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum HpdPin {
    None = 0,
    Crt = 1,
    SdvoB = 2,
    SdvoC = 3,
    PortA = 4,
    PortB = 5,
    PortC = 6,
    PortD = 7,
    PortE = 8,
    PortF = 9,
}

impl HpdPin {
    /// Every real pin, in bit order. `None` is not part of it.
    pub const ALL: [HpdPin; HPD_NUM_PINS - 1] = [
        HpdPin::Crt,
        HpdPin::SdvoB,
        HpdPin::SdvoC,
        HpdPin::PortA,
        HpdPin::PortB,
        HpdPin::PortC,
        HpdPin::PortD,
        HpdPin::PortE,
        HpdPin::PortF,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_none(self) -> bool {
        self == HpdPin::None
    }

    /// Single-bit mask for this pin, empty for `None`
    pub fn mask(self) -> PinMask {
        match self {
            HpdPin::None => PinMask::empty(),
            pin => PinMask::from_bits_truncate(1 << pin.index()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HpdPin::None => "none",
            HpdPin::Crt => "crt",
            HpdPin::SdvoB => "sdvo-b",
            HpdPin::SdvoC => "sdvo-c",
            HpdPin::PortA => "port-a",
            HpdPin::PortB => "port-b",
            HpdPin::PortC => "port-c",
            HpdPin::PortD => "port-d",
            HpdPin::PortE => "port-e",
            HpdPin::PortF => "port-f",
        }
    }
}

impl fmt::Display for HpdPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HpdPin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        std::iter::once(HpdPin::None)
            .chain(HpdPin::ALL)
            .find(|pin| pin.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown hotplug pin '{s}'"))
    }
}

bitflags! {
    /// Set of hotplug pins, bit N is the pin with discriminant N
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PinMask: u32 {
        const CRT = 1 << 1;
        const SDVO_B = 1 << 2;
        const SDVO_C = 1 << 3;
        const PORT_A = 1 << 4;
        const PORT_B = 1 << 5;
        const PORT_C = 1 << 6;
        const PORT_D = 1 << 7;
        const PORT_E = 1 << 8;
        const PORT_F = 1 << 9;
    }
}

impl PinMask {
    pub fn has(self, pin: HpdPin) -> bool {
        !pin.is_none() && self.contains(pin.mask())
    }

    /// Pins present in the mask, in bit order
    pub fn pins(self) -> impl Iterator<Item = HpdPin> {
        HpdPin::ALL.into_iter().filter(move |pin| self.has(*pin))
    }
}

impl FromIterator<HpdPin> for PinMask {
    fn from_iter<I: IntoIterator<Item = HpdPin>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PinMask::empty(), |mask, pin| mask | pin.mask())
    }
}

/// Physical connector port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
}

/// Number of ports a [`PortMask`] can hold
pub const MAX_PORTS: usize = 6;

impl Port {
    pub const ALL: [Port; MAX_PORTS] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::F];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn mask(self) -> PortMask {
        PortMask::from_bits_truncate(1 << self.index())
    }

    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Port {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Port::ALL
                .into_iter()
                .find(|port| port.letter().eq_ignore_ascii_case(&c)),
            _ => None,
        }
        .ok_or_else(|| format!("unknown port '{s}'"))
    }
}

bitflags! {
    /// Set of ports, bit N is [`Port`] with index N
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PortMask: u32 {
        const A = 1 << 0;
        const B = 1 << 1;
        const C = 1 << 2;
        const D = 1 << 3;
        const E = 1 << 4;
        const F = 1 << 5;
    }
}

impl PortMask {
    pub fn has(self, port: Port) -> bool {
        self.contains(port.mask())
    }
}

/// Port hard-wired to `pin`, if any
///
/// On platforms where port F shares the port-E hotplug line, `PortE` resolves
/// to port F.
pub fn pin_to_port(info: &PlatformInfo, pin: HpdPin) -> Option<Port> {
    match pin {
        HpdPin::PortA => Some(Port::A),
        HpdPin::PortB => Some(Port::B),
        HpdPin::PortC => Some(Port::C),
        HpdPin::PortD => Some(Port::D),
        HpdPin::PortE if info.port_f_on_hpd_e => Some(Port::F),
        HpdPin::PortE => Some(Port::E),
        HpdPin::PortF => Some(Port::F),
        HpdPin::None | HpdPin::Crt | HpdPin::SdvoB | HpdPin::SdvoC => None,
    }
}

/// Default pin of a digital port
pub fn default_pin(info: &PlatformInfo, port: Port) -> HpdPin {
    match port {
        Port::A => HpdPin::PortA,
        Port::B => HpdPin::PortB,
        Port::C => HpdPin::PortC,
        Port::D => HpdPin::PortD,
        Port::E => HpdPin::PortE,
        Port::F if info.port_f_on_hpd_e => HpdPin::PortE,
        Port::F => HpdPin::PortF,
    }
}
