//! Static description of the control hardware and of how sequence channels
//! are wired to it.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::quant::{ChannelId, DeviceId, Frequency, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortRole {
    Unused,
    ReadIn,
    ReadOut,
    Pump,
    Control,
}

/// Mixing convention between the LO and the digital carrier stack.
///
/// With `coarse + fine + residual = offset`, the emitted frequency is
/// `lo + offset` for [`Sideband::Usb`] and [`Sideband::Direct`] and
/// `lo - offset` for [`Sideband::Lsb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sideband {
    #[serde(rename = "USB")]
    Usb,
    #[serde(rename = "LSB")]
    Lsb,
    Direct,
}

impl Sideband {
    /// Offset still missing after `lo`, `coarse` and `fine` to reach `target`.
    #[must_use]
    pub fn residual(
        self,
        lo: Frequency,
        coarse: Frequency,
        fine: Frequency,
        target: Frequency,
    ) -> Frequency {
        match self {
            Self::Usb | Self::Direct => target - lo - coarse - fine,
            Self::Lsb => lo - coarse - fine - target,
        }
    }

    /// Frequency emitted for a total digital offset.
    #[must_use]
    pub fn emitted(self, lo: Frequency, offset: Frequency) -> Frequency {
        match self {
            Self::Usb | Self::Direct => lo + offset,
            Self::Lsb => lo - offset,
        }
    }

    #[must_use]
    pub const fn is_inverted(self) -> bool {
        matches!(self, Self::Lsb)
    }
}

impl fmt::Display for Sideband {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Usb => "USB",
            Self::Lsb => "LSB",
            Self::Direct => "Direct",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalOscillator {
    pub frequency: Frequency,
    pub sideband: Sideband,
}

/// Limits and fixed settings of one instrument model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConstants {
    /// Role of each port, by port index.
    pub port_roles: Vec<PortRole>,
    /// Number of DAC lanes of each port, by port index.
    pub dac_lanes: Vec<usize>,
    pub qubit_lo: LocalOscillator,
    pub resonator_lo: LocalOscillator,
    pub pump_lo: LocalOscillator,
    pub nco_step: Frequency,
    pub nco_sampling: Frequency,
    pub nco_bandwidth: Frequency,
    pub dac_bandwidth: Frequency,
    pub adc_decimated: Frequency,
    pub dac_baseband: Frequency,
    pub adc_baseband: Frequency,
    pub fir_taps: usize,
    pub first_window_step: Time,
    pub window_min: Time,
    pub window_max: Time,
    pub window_step: Time,
    pub waveform_max: Time,
    pub waveform_step: Time,
    pub repetition_step: Time,
    pub synchronization_delay: Time,
}

fn mhz(value: f64) -> Frequency {
    Frequency::from_mhz(value).expect("Constant frequency should not be NaN")
}

fn ns(value: f64) -> Time {
    Time::from_ns(value).expect("Constant time should not be NaN")
}

impl InstrumentConstants {
    /// Low-frequency variant of the QuEL-1 SE control box.
    #[must_use]
    pub fn quel1se_low_freq() -> Self {
        use PortRole::{Control, Pump, ReadIn, ReadOut, Unused};
        Self {
            port_roles: vec![
                ReadIn, ReadOut, Pump, Unused, Unused, Unused, Control, Control, Control, Control,
                Unused, Unused,
            ],
            dac_lanes: vec![0, 1, 1, 0, 0, 0, 1, 3, 3, 1, 0, 0],
            qubit_lo: LocalOscillator {
                frequency: Frequency::ZERO,
                sideband: Sideband::Direct,
            },
            resonator_lo: LocalOscillator {
                frequency: mhz(9000.0),
                sideband: Sideband::Lsb,
            },
            pump_lo: LocalOscillator {
                frequency: mhz(9000.0),
                sideband: Sideband::Lsb,
            },
            nco_step: mhz(12000.0 / 512.0),
            nco_sampling: mhz(2000.0),
            nco_bandwidth: mhz(1600.0),
            dac_bandwidth: mhz(400.0),
            adc_decimated: mhz(125.0),
            dac_baseband: mhz(500.0),
            adc_baseband: mhz(500.0),
            fir_taps: 16,
            first_window_step: ns(128.0),
            window_min: ns(64.0),
            window_max: ns(2048.0),
            window_step: ns(8.0),
            waveform_max: ns(2_000_000.0),
            waveform_step: ns(128.0),
            repetition_step: ns(10240.0),
            synchronization_delay: Time::from_ms(100.0).expect("Constant time should not be NaN"),
        }
    }

    #[must_use]
    pub fn port_role(&self, port: usize) -> PortRole {
        self.port_roles.get(port).copied().unwrap_or(PortRole::Unused)
    }

    #[must_use]
    pub fn lanes(&self, port: usize) -> usize {
        self.dac_lanes.get(port).copied().unwrap_or_default()
    }

    /// LO driving ports of `role`, if the role transmits.
    #[must_use]
    pub const fn local_oscillator(&self, role: PortRole) -> Option<LocalOscillator> {
        match role {
            PortRole::ReadOut => Some(self.resonator_lo),
            PortRole::Control => Some(self.qubit_lo),
            PortRole::Pump => Some(self.pump_lo),
            PortRole::Unused | PortRole::ReadIn => None,
        }
    }
}

/// Physical port of one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortKey {
    pub device: DeviceId,
    pub port: usize,
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.port)
    }
}

/// DAC lane or capture unit of one port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub port: PortKey,
    pub index: usize,
}

impl UnitKey {
    #[must_use]
    pub const fn new(port: PortKey, index: usize) -> Self {
        Self { port, index }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.port, self.index)
    }
}

/// Where one sequence channel is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub device: DeviceId,
    pub port: usize,
    /// Channel whose target frequency this channel plays at, e.g. a
    /// cross-resonance drive playing at its partner qubit frequency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_reference: Option<ChannelId>,
}

/// Wiring table of sequence channels together with the instrument profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub constants: InstrumentConstants,
    pub wiring: IndexMap<ChannelId, Wire>,
}

impl Assignment {
    #[must_use]
    pub fn new(constants: InstrumentConstants) -> Self {
        Self {
            constants,
            wiring: IndexMap::new(),
        }
    }

    pub fn wire(
        &mut self,
        channel: impl Into<ChannelId>,
        device: impl Into<DeviceId>,
        port: usize,
    ) -> &mut Self {
        self.wiring.insert(
            channel.into(),
            Wire {
                device: device.into(),
                port,
                frequency_reference: None,
            },
        );
        self
    }

    /// Wires `channel` to play at the target frequency of `reference`.
    pub fn wire_with_reference(
        &mut self,
        channel: impl Into<ChannelId>,
        device: impl Into<DeviceId>,
        port: usize,
        reference: impl Into<ChannelId>,
    ) -> &mut Self {
        self.wiring.insert(
            channel.into(),
            Wire {
                device: device.into(),
                port,
                frequency_reference: Some(reference.into()),
            },
        );
        self
    }

    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.wiring.contains_key(channel)
    }

    #[must_use]
    pub fn port(&self, channel: &str) -> Option<PortKey> {
        self.wiring.get(channel).map(|w| PortKey {
            device: w.device.clone(),
            port: w.port,
        })
    }

    #[must_use]
    pub fn port_role(&self, channel: &str) -> Option<PortRole> {
        self.wiring
            .get(channel)
            .map(|w| self.constants.port_role(w.port))
    }

    /// Channel whose target frequency `channel` plays at, itself by default.
    #[must_use]
    pub fn frequency_reference<'a>(&'a self, channel: &'a ChannelId) -> &'a ChannelId {
        self.wiring
            .get(channel)
            .and_then(|w| w.frequency_reference.as_ref())
            .unwrap_or(channel)
    }
}
