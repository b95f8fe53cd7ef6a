//! Timelines of pulse, blank and capture commands over grouped channels.
//!
//! Scheduling keeps one cursor per channel, all starting at zero. Every
//! command is dispatched at the latest cursor among the channels it touches:
//!
//! - a pulse is sampled from there and its channels move to the end of it;
//! - a blank moves its channels to the dispatch point plus the wait, so a
//!   zero wait just levels them;
//! - a capture records the dispatch point on each channel and levels them.
pub mod config;
mod cursor;

use indexmap::IndexMap;
use itertools::Itertools as _;
use ndarray::{Array1, ArrayView1};
use num::complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::config::{GroupKey, GroupParameters, SequenceConfig};
use self::cursor::Cursors;
use crate::{
    pulse::{self, Parameters, PulseLibrary},
    quant::{ChannelId, GroupId, PulseId, Time},
};

/// Group of channels added without an explicit group.
pub const DEFAULT_GROUP: &str = "_default_";

/// Names used internally for blank and capture commands.
pub const RESERVED_NAMES: [&str; 2] = ["__SYNC__", "__CAPT__"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Channel not found: {0}")]
    UnknownChannel(ChannelId),
    #[error("Channel already exists: {0}")]
    DuplicateChannel(ChannelId),
    #[error("Pulse not found: {0}")]
    UnknownPulse(PulseId),
    #[error("Pulse {pulse} requires channels {expected:?}, got {found:?}")]
    ChannelMismatch {
        pulse: PulseId,
        expected: Vec<ChannelId>,
        found: Vec<ChannelId>,
    },
    #[error("Pulse name {0} is reserved")]
    ReservedName(PulseId),
    #[error("No parameters for group key {0}")]
    ConfigNotFound(GroupKey),
    #[error("No parameters for pulse {pulse} in group key {group}")]
    PulseConfigNotFound { group: GroupKey, pulse: PulseId },
    #[error("Unknown parameter {parameter} of pulse {pulse} in group key {group}")]
    UnknownParameter {
        group: GroupKey,
        pulse: PulseId,
        parameter: String,
    },
    #[error(transparent)]
    Pulse(#[from] pulse::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Plays `pulse` with its channels mapped onto sequence channels.
    Pulse {
        pulse: PulseId,
        channel_map: IndexMap<ChannelId, ChannelId>,
    },
    Blank {
        channels: Vec<ChannelId>,
        wait: Time,
    },
    Capture {
        channels: Vec<ChannelId>,
    },
}

impl Command {
    /// Sequence channels touched by the command.
    pub fn channels(&self) -> Box<dyn Iterator<Item = &ChannelId> + '_> {
        match self {
            Self::Pulse { channel_map, .. } => Box::new(channel_map.values()),
            Self::Blank { channels, .. } | Self::Capture { channels } => Box::new(channels.iter()),
        }
    }
}

/// Result of sampling a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub waveforms: IndexMap<ChannelId, Array1<Complex64>>,
    pub capture_points: IndexMap<ChannelId, Vec<Time>>,
    pub duration: Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SequenceRepr", into = "SequenceRepr")]
pub struct Sequence {
    pulses: PulseLibrary,
    channels: IndexMap<ChannelId, GroupId>,
    commands: Vec<Command>,
}

#[derive(Serialize, Deserialize)]
struct SequenceRepr {
    pulses: PulseLibrary,
    channels: IndexMap<ChannelId, GroupId>,
    commands: Vec<Command>,
}

impl TryFrom<SequenceRepr> for Sequence {
    type Error = Error;

    fn try_from(repr: SequenceRepr) -> Result<Self> {
        let mut sequence = Self::new(repr.pulses)?;
        for (channel, group) in repr.channels {
            sequence.add_channel(channel, group)?;
        }
        for command in repr.commands {
            sequence.push(command)?;
        }
        Ok(sequence)
    }
}

impl From<Sequence> for SequenceRepr {
    fn from(sequence: Sequence) -> Self {
        Self {
            pulses: sequence.pulses,
            channels: sequence.channels,
            commands: sequence.commands,
        }
    }
}

struct Timeline {
    capture_points: IndexMap<ChannelId, Vec<Time>>,
    duration: Time,
}

impl Sequence {
    /// # Errors
    ///
    /// Fails if `pulses` registers a reserved name.
    pub fn new(pulses: PulseLibrary) -> Result<Self> {
        if let Some(name) = RESERVED_NAMES.iter().find(|&&n| pulses.contains(n)) {
            return Err(Error::ReservedName((*name).into()));
        }
        Ok(Self {
            pulses,
            channels: IndexMap::new(),
            commands: Vec::new(),
        })
    }

    #[must_use]
    pub const fn pulses(&self) -> &PulseLibrary {
        &self.pulses
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.keys()
    }

    #[must_use]
    pub fn group(&self, channel: &str) -> Option<&GroupId> {
        self.channels.get(channel)
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// # Errors
    ///
    /// Fails if `channel` was already added.
    pub fn add_channel(
        &mut self,
        channel: impl Into<ChannelId>,
        group: impl Into<GroupId>,
    ) -> Result<()> {
        let channel = channel.into();
        if self.channels.contains_key(&channel) {
            return Err(Error::DuplicateChannel(channel));
        }
        self.channels.insert(channel, group.into());
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if `pulse` is reserved or unknown, if the keys of `channel_map`
    /// are not exactly the pulse's channels, or if a mapped channel is unknown.
    pub fn add_pulse<'a, I>(&mut self, pulse: &str, channel_map: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let channel_map = channel_map
            .into_iter()
            .map(|(p, s)| (p.into(), s.into()))
            .collect();
        self.push(Command::Pulse {
            pulse: pulse.into(),
            channel_map,
        })
    }

    /// # Errors
    ///
    /// Fails if any channel is unknown.
    pub fn add_blank<'a, I>(&mut self, channels: I, wait: Time) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.push(Command::Blank {
            channels: channels.into_iter().map(Into::into).collect(),
            wait,
        })
    }

    /// # Errors
    ///
    /// Fails if any channel is unknown.
    pub fn add_synchronize<'a, I>(&mut self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.add_blank(channels, Time::ZERO)
    }

    pub fn add_synchronize_all(&mut self) {
        self.commands.push(Command::Blank {
            channels: self.channels.keys().cloned().collect(),
            wait: Time::ZERO,
        });
    }

    /// # Errors
    ///
    /// Fails if any channel is unknown.
    pub fn add_capture<'a, I>(&mut self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.push(Command::Capture {
            channels: channels.into_iter().map(Into::into).collect(),
        })
    }

    /// Validates and appends a command.
    ///
    /// # Errors
    ///
    /// See [`Self::add_pulse`] and [`Self::add_blank`].
    pub fn push(&mut self, command: Command) -> Result<()> {
        if let Command::Pulse { pulse, channel_map } = &command {
            if RESERVED_NAMES.contains(&pulse.as_str()) {
                return Err(Error::ReservedName(pulse.clone()));
            }
            let expected = self
                .pulses
                .channels(pulse.as_str())
                .map_err(|_| Error::UnknownPulse(pulse.clone()))?;
            let matches = expected.len() == channel_map.len()
                && expected.iter().all(|c| channel_map.contains_key(c));
            if !matches {
                return Err(Error::ChannelMismatch {
                    pulse: pulse.clone(),
                    expected: expected.to_vec(),
                    found: channel_map.keys().cloned().collect(),
                });
            }
        }
        if let Some(channel) = command.channels().find(|c| !self.channels.contains_key(*c)) {
            return Err(Error::UnknownChannel(channel.clone()));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Group key of the channels touched by `command`.
    fn group_key(&self, command: &Command) -> GroupKey {
        command
            .channels()
            .filter_map(|c| self.channels.get(c))
            .cloned()
            .collect()
    }

    /// Default parameters of every pulse command, merged per group key.
    #[must_use]
    pub fn config(&self) -> SequenceConfig {
        let mut config = SequenceConfig::new();
        for command in &self.commands {
            if let Command::Pulse { pulse, .. } = command {
                let defaults = self
                    .pulses
                    .get(pulse.as_str())
                    .map(pulse::Pulse::defaults)
                    .unwrap_or_default();
                config.insert(self.group_key(command), pulse.clone(), defaults);
            }
        }
        config
    }

    fn run<F>(
        &self,
        config: &SequenceConfig,
        capture_duration: Time,
        mut play: F,
    ) -> Result<Timeline>
    where
        F: FnMut(&PulseId, &IndexMap<ChannelId, ChannelId>, Time, &Parameters) -> Result<Time>,
    {
        let mut cursors = Cursors::new(self.channels.keys());
        let mut capture_points: IndexMap<ChannelId, Vec<Time>> = self
            .channels
            .keys()
            .map(|c| (c.clone(), Vec::new()))
            .collect();
        let mut duration = Time::ZERO;
        for command in &self.commands {
            let point = cursors.latest(command.channels());
            let end = match command {
                Command::Pulse { pulse, channel_map } => {
                    let parameters = config.pulse_parameters(&self.group_key(command), pulse.as_str())?;
                    point + play(pulse, channel_map, point, parameters)?
                }
                Command::Blank { wait, .. } => point + *wait,
                Command::Capture { channels } => {
                    for channel in channels {
                        if let Some(points) = capture_points.get_mut(channel) {
                            points.push(point);
                        }
                    }
                    duration = duration.max(point + capture_duration);
                    point
                }
            };
            cursors.synchronize(command.channels(), end);
            duration = duration.max(end);
        }
        Ok(Timeline {
            capture_points,
            duration: duration.max(cursors.max()),
        })
    }

    /// Total duration, including `capture_duration` after the last capture.
    ///
    /// # Errors
    ///
    /// Fails if `config` lacks parameters of a pulse command.
    pub fn duration(&self, config: &SequenceConfig, capture_duration: Time) -> Result<Time> {
        let timeline = self.run(config, capture_duration, |pulse, _, _, parameters| {
            Ok(self.pulses.duration(pulse.as_str(), parameters)?)
        })?;
        Ok(timeline.duration)
    }

    /// Samples every channel at `times` and collects the capture points.
    ///
    /// # Errors
    ///
    /// Fails if `config` lacks parameters of a pulse command or a pulse
    /// cannot be sampled with them.
    pub fn schedule(
        &self,
        times: ArrayView1<'_, f64>,
        config: &SequenceConfig,
        capture_duration: Time,
    ) -> Result<Schedule> {
        let mut waveforms: IndexMap<ChannelId, Array1<Complex64>> = self
            .channels
            .keys()
            .map(|c| (c.clone(), Array1::zeros(times.len())))
            .collect();
        let timeline = self.run(
            config,
            capture_duration,
            |pulse, channel_map, start, parameters| {
                let (pulse_waveforms, duration) =
                    self.pulses.waveform(pulse.as_str(), times, start, parameters)?;
                for (pulse_channel, waveform) in pulse_waveforms {
                    if let Some(target) = channel_map
                        .get(&pulse_channel)
                        .and_then(|c| waveforms.get_mut(c))
                    {
                        *target += &waveform;
                    }
                }
                Ok(duration)
            },
        )?;
        Ok(Schedule {
            waveforms,
            capture_points: timeline.capture_points,
            duration: timeline.duration,
        })
    }

    /// Channels that capture at least once.
    pub fn capture_channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Capture { channels } => Some(channels),
                _ => None,
            })
            .flatten()
            .unique()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn t(v: f64) -> Time {
        Time::new(v).unwrap()
    }

    fn two_qubits() -> Sequence {
        let mut sequence = Sequence::new(PulseLibrary::preset()).unwrap();
        sequence.add_channel("Q0_qubit", "Q0").unwrap();
        sequence.add_channel("Q0_resonator", "Q0").unwrap();
        sequence.add_channel("Q1_qubit", "Q1").unwrap();
        sequence
    }

    #[test]
    fn duplicate_channel() {
        let mut sequence = two_qubits();
        assert_eq!(
            sequence.add_channel("Q0_qubit", DEFAULT_GROUP),
            Err(Error::DuplicateChannel("Q0_qubit".into()))
        );
    }

    #[test]
    fn pulse_channel_checks() {
        let mut sequence = two_qubits();
        assert_eq!(
            sequence.add_pulse("NOPE", [("qubit", "Q0_qubit")]),
            Err(Error::UnknownPulse("NOPE".into()))
        );
        assert_eq!(
            sequence.add_pulse("__SYNC__", [("qubit", "Q0_qubit")]),
            Err(Error::ReservedName("__SYNC__".into()))
        );
        assert!(matches!(
            sequence.add_pulse("CR", [("control", "Q0_qubit")]),
            Err(Error::ChannelMismatch { .. })
        ));
        assert!(matches!(
            sequence.add_pulse("HPI", [("resonator", "Q0_qubit")]),
            Err(Error::ChannelMismatch { .. })
        ));
        assert_eq!(
            sequence.add_pulse("HPI", [("qubit", "Q2_qubit")]),
            Err(Error::UnknownChannel("Q2_qubit".into()))
        );
        assert_eq!(
            sequence.add_capture(["Q9"]),
            Err(Error::UnknownChannel("Q9".into()))
        );
        assert!(sequence.commands().is_empty());
    }

    #[test]
    fn reserved_name_in_library() {
        let mut library = PulseLibrary::preset();
        let mut pulse = pulse::Pulse::new("__CAPT__", ["c"]);
        pulse.add_shape("c", "blank", [("width", crate::expr::Expr::from(1.0))]);
        library.add_pulse(pulse).unwrap();
        assert_eq!(
            Sequence::new(library),
            Err(Error::ReservedName("__CAPT__".into()))
        );
    }

    #[test]
    fn config_grouped_by_sorted_key() {
        let mut sequence = two_qubits();
        sequence
            .add_pulse("CR", [("control", "Q1_qubit"), ("target", "Q0_qubit")])
            .unwrap();
        sequence.add_pulse("HPI", [("qubit", "Q0_qubit")]).unwrap();
        sequence.add_pulse("MEAS", [("resonator", "Q0_resonator")]).unwrap();
        sequence.add_synchronize_all();
        let config = sequence.config();
        let keys: Vec<_> = config.group_keys().cloned().collect();
        assert_eq!(keys, vec![GroupKey::new(["Q0", "Q1"]), GroupKey::new(["Q0"])]);
        let q0 = config.parameters(&GroupKey::new(["Q0"])).unwrap();
        assert_eq!(q0.keys().map(PulseId::as_str).collect_vec(), vec!["HPI", "MEAS"]);
    }

    #[test]
    fn cursor_rules() {
        let mut sequence = two_qubits();
        sequence.add_pulse("HPI", [("qubit", "Q0_qubit")]).unwrap();
        sequence.add_blank(["Q1_qubit"], t(10.0)).unwrap();
        sequence.add_synchronize(["Q0_qubit", "Q1_qubit"]).unwrap();
        sequence.add_capture(["Q0_qubit", "Q0_resonator"]).unwrap();
        sequence.add_blank(["Q0_resonator"], t(5.0)).unwrap();
        sequence.add_capture(["Q0_resonator"]).unwrap();
        let config = sequence.config();

        let times = Array1::range(0.0, 200.0, 0.5);
        let schedule = sequence.schedule(times.view(), &config, t(50.0)).unwrap();
        assert_eq!(schedule.capture_points["Q0_qubit"], vec![t(80.0)]);
        assert_eq!(schedule.capture_points["Q0_resonator"], vec![t(80.0), t(85.0)]);
        assert!(schedule.capture_points["Q1_qubit"].is_empty());
        assert_eq!(schedule.duration, t(135.0));
        assert_eq!(sequence.duration(&config, t(50.0)), Ok(t(135.0)));

        let peak = schedule.waveforms["Q0_qubit"][80];
        assert_approx_eq!(f64, peak.re, 0.9, epsilon = 1e-9);
        assert!(schedule.waveforms["Q1_qubit"].iter().all(|v| v.norm() == 0.0));

        let captures: Vec<_> = sequence.capture_channels().map(ChannelId::as_str).collect();
        assert_eq!(captures, vec!["Q0_qubit", "Q0_resonator"]);
    }

    #[test]
    fn pulse_dispatch_waits_for_all_channels() {
        let mut sequence = two_qubits();
        sequence.add_blank(["Q1_qubit"], t(30.0)).unwrap();
        sequence
            .add_pulse("CR", [("control", "Q0_qubit"), ("target", "Q1_qubit")])
            .unwrap();
        sequence.add_capture(["Q0_qubit"]).unwrap();
        let config = sequence.config();
        let times = Array1::range(0.0, 500.0, 1.0);
        let schedule = sequence.schedule(times.view(), &config, Time::ZERO).unwrap();
        assert_eq!(schedule.capture_points["Q0_qubit"], vec![t(430.0)]);
        assert_approx_eq!(f64, schedule.waveforms["Q0_qubit"][29].re, 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, schedule.waveforms["Q0_qubit"][200].re, 0.9, epsilon = 1e-9);
    }

    #[test]
    fn missing_config() {
        let mut sequence = two_qubits();
        sequence.add_pulse("HPI", [("qubit", "Q0_qubit")]).unwrap();
        assert_eq!(
            sequence.duration(&SequenceConfig::new(), Time::ZERO),
            Err(Error::ConfigNotFound(GroupKey::new(["Q0"])))
        );
    }

    #[test]
    fn serde_round_trip() {
        let mut sequence = two_qubits();
        sequence.add_pulse("HPI", [("qubit", "Q0_qubit")]).unwrap();
        sequence.add_blank(["Q1_qubit"], t(10.0)).unwrap();
        sequence.add_capture(["Q0_resonator"]).unwrap();
        let json = serde_json::to_string(&sequence).unwrap();
        let back: Sequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sequence);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }
}
