//! One experiment iteration: a sequence, its parameters and the
//! per-channel settings needed to run it.
use std::str::FromStr;

use indexmap::IndexMap;
use itertools::Itertools as _;
use ndarray::Array1;
use num::complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    quant::{ChannelId, Frequency, PulseId, Time},
    sequence::{self, GroupKey, Sequence, SequenceConfig},
    serde_util,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown parameter category in {0}")]
    UnknownCategory(String),
    #[error("Malformed parameter name {0}")]
    MalformedParameter(String),
    #[error("Channel {0} has no frequency shift")]
    UnknownChannel(ChannelId),
    #[error(transparent)]
    Sequence(#[from] sequence::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub num_shot: usize,
    /// Idle time appended to the waveform before the next repetition.
    pub repetition_margin: Time,
    pub duration: Time,
    pub delay: Time,
    pub timeout: Time,
    pub average_waveform: bool,
    pub average_shots: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            num_shot: 1000,
            repetition_margin: Time::from_us(100.0).expect("Constant time should not be NaN"),
            duration: Time::from_ns(2048.0).expect("Constant time should not be NaN"),
            delay: Time::ZERO,
            timeout: Time::from_ms(1000.0).expect("Constant time should not be NaN"),
            average_waveform: false,
            average_shots: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub sequence: Sequence,
    pub config: SequenceConfig,
    /// Target frequency of each channel.
    pub frequencies: IndexMap<ChannelId, Frequency>,
    /// Detuning added on top of the planned carrier, zero when absent.
    #[serde(default)]
    pub frequency_shifts: IndexMap<ChannelId, Frequency>,
    /// Integration weights of each readout channel, in decimated ADC samples.
    #[serde(default, with = "serde_util::complex_array_map")]
    pub averaging_windows: IndexMap<ChannelId, Array1<Complex64>>,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

impl Job {
    /// Job over `sequence` with its default parameters and no channel
    /// settings.
    #[must_use]
    pub fn new(sequence: Sequence) -> Self {
        let config = sequence.config();
        Self {
            sequence,
            config,
            frequencies: IndexMap::new(),
            frequency_shifts: IndexMap::new(),
            averaging_windows: IndexMap::new(),
            acquisition: AcquisitionConfig::default(),
        }
    }

    #[must_use]
    pub fn frequency_shift(&self, channel: &str) -> Frequency {
        self.frequency_shifts
            .get(channel)
            .copied()
            .unwrap_or_default()
    }

    /// Sets one sweepable value. Frequency shifts are in hertz.
    ///
    /// # Errors
    ///
    /// Fails if the addressed channel, group key, pulse or parameter does
    /// not exist.
    pub fn update(&mut self, parameter: &JobParameter, value: f64) -> Result<()> {
        match parameter {
            JobParameter::FrequencyShift(channel) => {
                if !self.sequence.channels().any(|c| c == channel) {
                    return Err(Error::UnknownChannel(channel.clone()));
                }
                let shift = Frequency::from_hz(value)
                    .map_err(|_| Error::MalformedParameter(parameter.to_string()))?;
                self.frequency_shifts.insert(channel.clone(), shift);
            }
            JobParameter::Sequencer {
                group,
                pulse,
                parameter,
            } => {
                self.config.set(group, pulse.as_str(), parameter, value)?;
            }
        }
        Ok(())
    }
}

/// Address of one sweepable value of a [`Job`].
///
/// Textual form: `frequency_shift.<channel>` or
/// `sequencer.<group>[_<group>...].<pulse>.<parameter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobParameter {
    FrequencyShift(ChannelId),
    Sequencer {
        group: GroupKey,
        pulse: PulseId,
        parameter: String,
    },
}

impl FromStr for JobParameter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedParameter(s.to_string());
        let (category, handle) = s.split_once('.').ok_or_else(malformed)?;
        match category {
            "frequency_shift" if !handle.is_empty() && !handle.contains('.') => {
                Ok(Self::FrequencyShift(handle.into()))
            }
            "frequency_shift" => Err(malformed()),
            "sequencer" => {
                let mut parts = handle.split('.');
                let (Some(group), Some(pulse), Some(parameter), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(malformed());
                };
                Ok(Self::Sequencer {
                    group: group.split('_').collect(),
                    pulse: pulse.into(),
                    parameter: parameter.to_string(),
                })
            }
            _ => Err(Error::UnknownCategory(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrequencyShift(channel) => write!(f, "frequency_shift.{channel}"),
            Self::Sequencer {
                group,
                pulse,
                parameter,
            } => {
                let group = group.groups().iter().join("_");
                write!(f, "sequencer.{group}.{pulse}.{parameter}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::pulse::PulseLibrary;

    fn job() -> Job {
        let mut sequence = Sequence::new(PulseLibrary::preset()).unwrap();
        sequence.add_channel("Q0_qubit", "Q0").unwrap();
        sequence.add_channel("Q1_qubit", "Q1").unwrap();
        sequence
            .add_pulse("CR", [("control", "Q0_qubit"), ("target", "Q1_qubit")])
            .unwrap();
        Job::new(sequence)
    }

    #[test]
    fn parse_parameters() {
        assert_eq!(
            "frequency_shift.Q0_qubit".parse::<JobParameter>(),
            Ok(JobParameter::FrequencyShift("Q0_qubit".into()))
        );
        let parameter: JobParameter = "sequencer.Q1_Q0.CR.cr_width".parse().unwrap();
        assert_eq!(
            parameter,
            JobParameter::Sequencer {
                group: GroupKey::new(["Q0", "Q1"]),
                pulse: "CR".into(),
                parameter: "cr_width".into(),
            }
        );
        assert_eq!(parameter.to_string(), "sequencer.Q0_Q1.CR.cr_width");
        assert_eq!(
            "amplitude.Q0".parse::<JobParameter>(),
            Err(Error::UnknownCategory("amplitude.Q0".into()))
        );
        assert_eq!(
            "sequencer.Q0.CR".parse::<JobParameter>(),
            Err(Error::MalformedParameter("sequencer.Q0.CR".into()))
        );
    }

    #[test]
    fn update_sequencer_parameter() {
        let mut job = job();
        let parameter = "sequencer.Q0_Q1.CR.cr_width".parse().unwrap();
        job.update(&parameter, 300.0).unwrap();
        let params = job
            .config
            .pulse_parameters(&GroupKey::new(["Q0", "Q1"]), "CR")
            .unwrap();
        assert_approx_eq!(f64, params["cr_width"], 300.0);
        let missing = "sequencer.Q0_Q1.CR.nope".parse().unwrap();
        assert!(matches!(
            job.update(&missing, 1.0),
            Err(Error::Sequence(sequence::Error::UnknownParameter { .. }))
        ));
    }

    #[test]
    fn update_frequency_shift() {
        let mut job = job();
        assert_eq!(job.frequency_shift("Q0_qubit"), Frequency::ZERO);
        job.update(&JobParameter::FrequencyShift("Q0_qubit".into()), 1e6)
            .unwrap();
        assert_approx_eq!(f64, job.frequency_shift("Q0_qubit").mhz(), 1.0);
        assert_eq!(
            job.update(&JobParameter::FrequencyShift("Q9".into()), 1e6),
            Err(Error::UnknownChannel("Q9".into()))
        );
    }

    #[test]
    fn defaults_and_serde() {
        let job = job();
        assert_eq!(job.acquisition.num_shot, 1000);
        assert_approx_eq!(f64, job.acquisition.repetition_margin.ns(), 100_000.0);
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
