//! Translation of a [`Job`] into device-level settings.
//!
//! The translator fixes the waveform and repetition lengths, samples the
//! sequence, plans the NCOs of every port and folds the channels sharing a DAC
//! lane into one modulated waveform. Readout channels that capture also get a
//! capture unit with aligned window starts, a band-pass FIR and a modulated
//! averaging window.
mod capture;
mod filter;
mod modulation;

use indexmap::IndexMap;
use itertools::Itertools as _;
use ndarray::Array1;
use num::complex::Complex64;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub use self::capture::available_averaging_window_samples;
pub(crate) use self::{capture::preceding_samples, modulation::demodulate_inplace};
use crate::{
    hardware::{Assignment, LocalOscillator, PortKey, PortRole, Sideband, UnitKey},
    job::Job,
    mux::{self, MultiplexingResult},
    quant::{ChannelId, Frequency, Time},
    sequence,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Channel {0} is not wired")]
    UnassignedChannel(ChannelId),
    #[error("Channel {channel} has no {setting}")]
    MissingChannelSetting {
        channel: ChannelId,
        setting: &'static str,
    },
    #[error("Waveform length {length:?} exceeds {maximum:?}")]
    WaveformTooLong { length: Time, maximum: Time },
    #[error("Acquisition duration {duration:?} {reason}")]
    AcquisitionDuration {
        duration: Time,
        reason: &'static str,
    },
    #[error("Channel {channel} captures but its port has role {role:?}")]
    CaptureOnNonReadoutPort { channel: ChannelId, role: PortRole },
    #[error("Readout channel {channel} was multiplexed onto lane {lane}")]
    ReadoutLane { channel: ChannelId, lane: usize },
    #[error("Demodulation frequency {frequency:?} of {channel} is outside ±{limit:?}")]
    FrequencyOutOfRange {
        channel: ChannelId,
        frequency: Frequency,
        limit: Frequency,
    },
    #[error("Averaging window of {channel} does not fit: {samples} samples after {offset}")]
    AveragingWindowTooLong {
        channel: ChannelId,
        samples: usize,
        offset: usize,
    },
    #[error(transparent)]
    Sequence(#[from] sequence::Error),
    #[error(transparent)]
    Mux(#[from] mux::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Timing and averaging settings shared by every unit of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    pub num_shot: usize,
    /// Waveform length rounded up to the waveform step.
    pub waveform_length: Time,
    pub repetition_time: Time,
    pub duration: Time,
    pub timeout: Time,
    pub synchronization_delay: Time,
    pub average_waveform: bool,
    pub average_shots: bool,
    /// Sample rate of the decimated capture data.
    pub capture_sample_rate: Frequency,
}

/// Everything one capture unit needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSetting {
    pub channel: ChannelId,
    /// Window starts on the hardware grid.
    pub points: Vec<Time>,
    /// Part of the earliest point the first window cannot start at.
    pub preceding: Time,
    /// Demodulation frequency, the channel's residual plus its shift.
    pub frequency: Frequency,
    pub sideband: Sideband,
    pub fir: Array1<Complex64>,
    pub averaging_window: Array1<Complex64>,
}

/// Device-level description of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalJob {
    pub acquisition: AcquisitionSettings,
    pub dac_units: IndexMap<ChannelId, UnitKey>,
    pub modulation_frequencies: IndexMap<ChannelId, Frequency>,
    pub bandwidths: IndexMap<ChannelId, Frequency>,
    /// Sum of the modulated waveforms of every channel on a lane.
    pub waveforms: IndexMap<UnitKey, Array1<Complex64>>,
    pub fine_frequencies: IndexMap<UnitKey, Frequency>,
    pub coarse_frequencies: IndexMap<PortKey, Frequency>,
    pub local_oscillators: IndexMap<PortKey, LocalOscillator>,
    pub captures: IndexMap<UnitKey, CaptureSetting>,
}

impl PhysicalJob {
    /// Capture unit of each capturing channel.
    pub fn capture_units(&self) -> impl Iterator<Item = (&ChannelId, &UnitKey)> {
        self.captures.iter().map(|(unit, c)| (&c.channel, unit))
    }
}

fn port_of(assignment: &Assignment, channel: &ChannelId) -> Result<PortKey> {
    assignment
        .port(channel.as_str())
        .ok_or_else(|| Error::UnassignedChannel(channel.clone()))
}

fn local_oscillators(
    assignment: &Assignment,
    mux: &MultiplexingResult,
) -> Result<IndexMap<PortKey, LocalOscillator>> {
    mux.coarse
        .keys()
        .map(|port| {
            let role = assignment.constants.port_role(port.port);
            let lo = assignment.constants.local_oscillator(role).ok_or_else(|| {
                mux::Error::UnsupportedPortRole {
                    port: port.clone(),
                    role,
                }
            })?;
            Ok((port.clone(), lo))
        })
        .collect()
}

/// Translates `job` for the hardware described by `assignment`.
///
/// # Errors
///
/// Fails if a sequence channel is not wired or lacks a setting, the waveform
/// or capture windows break an instrument limit, or the sequence or the
/// multiplexing plan fails.
#[instrument(skip_all)]
pub fn translate(job: &Job, assignment: &Assignment) -> Result<PhysicalJob> {
    let constants = &assignment.constants;
    let config = &job.acquisition;
    if let Some(channel) = job.sequence.channels().find(|c| !assignment.contains(c.as_str())) {
        return Err(Error::UnassignedChannel(channel.clone()));
    }

    let duration = job.sequence.duration(&job.config, config.duration)?;
    let waveform_length = duration.ceil_to(constants.waveform_step);
    if waveform_length > constants.waveform_max {
        return Err(Error::WaveformTooLong {
            length: waveform_length,
            maximum: constants.waveform_max,
        });
    }
    let repetition_time =
        (waveform_length + config.repetition_margin).ceil_to(constants.repetition_step);
    capture::check_duration(config.duration, constants)?;

    let dt = constants.dac_baseband.period();
    let samples = constants.dac_baseband.samples_in(waveform_length).ceil() as usize;
    let times = Array1::from_iter((0..samples).map(|n| dt.ns() * n as f64));
    let schedule = job.sequence.schedule(times.view(), &job.config, config.duration)?;

    let targets = job
        .sequence
        .channels()
        .map(|channel| {
            let reference = assignment.frequency_reference(channel);
            let target = job.frequencies.get(reference).copied().ok_or_else(|| {
                Error::MissingChannelSetting {
                    channel: reference.clone(),
                    setting: "target frequency",
                }
            })?;
            Ok((channel.clone(), target))
        })
        .collect::<Result<IndexMap<_, _>>>()?;
    let mux = mux::plan(&targets, assignment)?;
    let local_oscillators = local_oscillators(assignment, &mux)?;

    let modulation_frequencies: IndexMap<ChannelId, Frequency> = mux
        .residuals
        .iter()
        .map(|(c, &residual)| (c.clone(), residual + job.frequency_shift(c.as_str())))
        .collect();
    let dac_units = mux
        .lanes
        .iter()
        .map(|(c, &lane)| Ok((c.clone(), UnitKey::new(port_of(assignment, c)?, lane))))
        .collect::<Result<IndexMap<_, _>>>()?;

    let modulated = dac_units
        .iter()
        .filter_map(|(c, unit)| {
            let waveform = schedule.waveforms.get(c)?;
            Some((unit, waveform, modulation_frequencies.get(c).copied()?))
        })
        .collect_vec()
        .into_par_iter()
        .map(|(unit, waveform, frequency)| {
            let waveform = modulation::modulate(waveform.view(), frequency, constants.dac_baseband);
            (unit.clone(), waveform)
        })
        .collect::<Vec<_>>();
    let mut waveforms: IndexMap<UnitKey, Array1<Complex64>> = IndexMap::new();
    for (unit, waveform) in modulated {
        match waveforms.get_mut(&unit) {
            Some(sum) => *sum += &waveform,
            None => {
                waveforms.insert(unit, waveform);
            }
        }
    }
    for (unit, waveform) in &mut waveforms {
        if local_oscillators
            .get(&unit.port)
            .is_some_and(|lo| lo.sideband.is_inverted())
        {
            waveform.mapv_inplace(|y| y.conj());
        }
    }

    let fine_frequencies = mux
        .fine
        .iter()
        .flat_map(|(port, lanes)| {
            lanes
                .iter()
                .map(|(&lane, &fine)| (UnitKey::new(port.clone(), lane), fine))
        })
        .collect();

    let mut captures = IndexMap::new();
    let mut next_capture_index: IndexMap<UnitKey, usize> = IndexMap::new();
    for channel in job.sequence.channels() {
        let role = assignment
            .port_role(channel.as_str())
            .unwrap_or(PortRole::Unused);
        let points = schedule
            .capture_points
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if role != PortRole::ReadOut {
            if !points.is_empty() {
                return Err(Error::CaptureOnNonReadoutPort {
                    channel: channel.clone(),
                    role,
                });
            }
            continue;
        }
        let Some(dac_unit) = dac_units.get(channel) else {
            continue;
        };
        if dac_unit.index != 0 {
            return Err(Error::ReadoutLane {
                channel: channel.clone(),
                lane: dac_unit.index,
            });
        }
        let index = next_capture_index.entry(dac_unit.clone()).or_default();
        let unit = UnitKey::new(dac_unit.port.clone(), *index);
        *index += 1;
        if points.is_empty() {
            continue;
        }
        let setting = capture_setting(job, assignment, channel, points, &modulation_frequencies)?;
        debug!(
            channel = %channel,
            unit = %unit,
            points = setting.points.len(),
            preceding_ns = setting.preceding.ns(),
            frequency_hz = setting.frequency.hz(),
            "capture unit"
        );
        captures.insert(unit, setting);
    }

    info!(
        duration_ns = duration.ns(),
        waveform_length_ns = waveform_length.ns(),
        repetition_ns = repetition_time.ns(),
        dac_units = waveforms.len(),
        capture_units = captures.len(),
        "translated job"
    );
    Ok(PhysicalJob {
        acquisition: AcquisitionSettings {
            num_shot: config.num_shot,
            waveform_length,
            repetition_time,
            duration: config.duration,
            timeout: config.timeout,
            synchronization_delay: constants.synchronization_delay,
            average_waveform: config.average_waveform,
            average_shots: config.average_shots,
            capture_sample_rate: constants.adc_decimated,
        },
        dac_units,
        modulation_frequencies,
        bandwidths: mux.bandwidths,
        waveforms,
        fine_frequencies,
        coarse_frequencies: mux.coarse,
        local_oscillators,
        captures,
    })
}

fn capture_setting(
    job: &Job,
    assignment: &Assignment,
    channel: &ChannelId,
    points: &[Time],
    modulation_frequencies: &IndexMap<ChannelId, Frequency>,
) -> Result<CaptureSetting> {
    let constants = &assignment.constants;
    let missing = |setting| Error::MissingChannelSetting {
        channel: channel.clone(),
        setting,
    };
    let frequency = modulation_frequencies
        .get(channel)
        .copied()
        .ok_or_else(|| missing("modulation frequency"))?;
    let sideband = constants.resonator_lo.sideband;
    let delayed = points
        .iter()
        .map(|&p| p + job.acquisition.delay)
        .collect_vec();
    let (points, preceding) = capture::align_points(&delayed, constants);

    let fir = filter::band_pass(frequency, constants).ok_or_else(|| Error::FrequencyOutOfRange {
        channel: channel.clone(),
        frequency,
        limit: constants.adc_baseband / 2.0,
    })?;
    let window = job
        .averaging_windows
        .get(channel)
        .ok_or_else(|| missing("averaging window"))?;
    let mut averaging_window = capture::place_averaging_window(window.view(), preceding, constants)
        .ok_or_else(|| Error::AveragingWindowTooLong {
            channel: channel.clone(),
            samples: window.len(),
            offset: capture::preceding_samples(preceding, constants.adc_decimated),
        })?;
    demodulate_inplace(
        averaging_window.view_mut(),
        frequency,
        constants.adc_decimated,
        Time::ZERO,
    );
    if sideband.is_inverted() {
        averaging_window.mapv_inplace(|y| y.conj());
    }
    Ok(CaptureSetting {
        channel: channel.clone(),
        points,
        preceding,
        frequency,
        sideband,
        fir: (*fir).clone(),
        averaging_window,
    })
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use ndarray::Array1;

    use super::*;
    use crate::{hardware::InstrumentConstants, pulse::PulseLibrary, sequence::Sequence};

    fn ghz(v: f64) -> Frequency {
        Frequency::from_ghz(v).unwrap()
    }

    fn assignment() -> Assignment {
        let mut assignment = Assignment::new(InstrumentConstants::quel1se_low_freq());
        assignment
            .wire("Q0_qubit", "box0", 7)
            .wire("Q1_qubit", "box0", 7)
            .wire("Q0_resonator", "box0", 1);
        assignment
    }

    fn readout_job() -> Job {
        let mut sequence = Sequence::new(PulseLibrary::preset()).unwrap();
        sequence.add_channel("Q0_qubit", "Q0").unwrap();
        sequence.add_channel("Q1_qubit", "Q1").unwrap();
        sequence.add_channel("Q0_resonator", "Q0").unwrap();
        sequence.add_pulse("HPI", [("qubit", "Q0_qubit")]).unwrap();
        sequence.add_pulse("HPI", [("qubit", "Q1_qubit")]).unwrap();
        sequence.add_synchronize_all();
        sequence.add_capture(["Q0_resonator"]).unwrap();
        sequence
            .add_pulse("MEAS", [("resonator", "Q0_resonator")])
            .unwrap();
        let mut job = Job::new(sequence);
        job.frequencies.insert("Q0_qubit".into(), ghz(4.2));
        job.frequencies.insert("Q1_qubit".into(), ghz(4.4));
        job.frequencies.insert("Q0_resonator".into(), ghz(6.1));
        job.averaging_windows.insert(
            "Q0_resonator".into(),
            Array1::from_elem(64, Complex64::new(1.0, 0.0)),
        );
        job.acquisition.num_shot = 10;
        job
    }

    #[test]
    fn lengths_on_instrument_grid() {
        let job = readout_job();
        let physical = translate(&job, &assignment()).unwrap();
        let acq = &physical.acquisition;
        assert_approx_eq!(f64, acq.waveform_length.ns() % 128.0, 0.0);
        assert_approx_eq!(f64, acq.repetition_time.ns() % 10240.0, 0.0);
        assert!(acq.repetition_time >= acq.waveform_length + job.acquisition.repetition_margin);
        let samples = (acq.waveform_length.ns() / 2.0).round() as usize;
        assert!(physical.waveforms.values().all(|w| w.len() == samples));
    }

    #[test]
    fn lanes_and_nco_settings() {
        let physical = translate(&readout_job(), &assignment()).unwrap();
        assert_eq!(physical.dac_units.len(), 3);
        assert_eq!(physical.waveforms.len(), 3);
        assert_eq!(physical.coarse_frequencies.len(), 2);
        assert_eq!(physical.fine_frequencies.len(), 3);
        assert_ne!(physical.dac_units["Q0_qubit"], physical.dac_units["Q1_qubit"]);
        let port = PortKey {
            device: "box0".into(),
            port: 1,
        };
        let lo = physical.local_oscillators[&port];
        assert_eq!(lo.sideband, Sideband::Lsb);
        let unit = &physical.dac_units["Q0_resonator"];
        let offset = physical.coarse_frequencies[&port]
            + physical.fine_frequencies[unit]
            + physical.modulation_frequencies["Q0_resonator"];
        assert_approx_eq!(f64, lo.sideband.emitted(lo.frequency, offset).ghz(), 6.1, epsilon = 1e-9);
    }

    #[test]
    fn capture_unit_settings() {
        let physical = translate(&readout_job(), &assignment()).unwrap();
        assert_eq!(physical.captures.len(), 1);
        let (channel, unit) = physical.capture_units().next().unwrap();
        assert_eq!(channel.as_str(), "Q0_resonator");
        assert_eq!(unit.index, 0);
        let setting = &physical.captures[unit];
        assert_eq!(setting.points.len(), 1);
        assert_approx_eq!(f64, setting.points[0].ns() % 8.0, 0.0);
        assert!(setting.preceding < Time::from_ns(128.0).unwrap());
        assert_eq!(setting.fir.len(), 16);
        assert_eq!(setting.averaging_window.len(), 256);
        assert_eq!(setting.sideband, Sideband::Lsb);
    }

    #[test]
    fn frequency_shift_moves_modulation_only() {
        let mut job = readout_job();
        let base = translate(&job, &assignment()).unwrap();
        job.frequency_shifts
            .insert("Q0_qubit".into(), Frequency::from_mhz(1.0).unwrap());
        let shifted = translate(&job, &assignment()).unwrap();
        assert_eq!(base.fine_frequencies, shifted.fine_frequencies);
        let delta = shifted.modulation_frequencies["Q0_qubit"] - base.modulation_frequencies["Q0_qubit"];
        assert_approx_eq!(f64, delta.mhz(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_settings() {
        let mut job = readout_job();
        job.averaging_windows.clear();
        assert_eq!(
            translate(&job, &assignment()),
            Err(Error::MissingChannelSetting {
                channel: "Q0_resonator".into(),
                setting: "averaging window",
            })
        );

        let mut job = readout_job();
        job.frequencies.shift_remove("Q1_qubit");
        assert!(matches!(
            translate(&job, &assignment()),
            Err(Error::MissingChannelSetting { .. })
        ));

        let mut wiring = assignment();
        wiring.wiring.shift_remove("Q1_qubit");
        assert_eq!(
            translate(&readout_job(), &wiring),
            Err(Error::UnassignedChannel("Q1_qubit".into()))
        );
    }

    #[test]
    fn capture_on_control_port_rejected() {
        let mut job = readout_job();
        job.sequence.add_capture(["Q0_qubit"]).unwrap();
        assert!(matches!(
            translate(&job, &assignment()),
            Err(Error::CaptureOnNonReadoutPort {
                role: PortRole::Control,
                ..
            })
        ));
    }

    #[test]
    fn acquisition_duration_checked() {
        let mut job = readout_job();
        job.acquisition.duration = Time::from_ns(100.0).unwrap();
        assert!(matches!(
            translate(&job, &assignment()),
            Err(Error::AcquisitionDuration { .. })
        ));
    }
}
