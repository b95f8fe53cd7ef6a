//! Reshaping and demodulation of downloaded capture data.
//!
//! Each capture unit returns a buffer whose layout depends on which averaging
//! stages ran on the instrument. [`extract`] turns every buffer into a
//! per-channel array with the capture points on the first axis, removes the
//! residual carrier and normalizes the sums the hardware accumulated.
use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, Axis, Ix1, Ix2, Ix3, s};
use num::complex::Complex64;
use thiserror::Error;
use tracing::debug;

use crate::{
    hardware::UnitKey,
    quant::ChannelId,
    translate::{
        AcquisitionSettings, CaptureSetting, PhysicalJob, demodulate_inplace, preceding_samples,
    },
};

/// Which averaging stages the capture units run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionMode {
    /// One value per capture point, averaged over shots and integrated over
    /// the window. Layout `[points]`.
    Integrated,
    /// Time trace per capture point averaged over shots. Layout
    /// `[points, samples]`.
    AveragedTrace,
    /// One integrated value per shot. Layout `[shots, points]`.
    SingleShot,
    /// Every sample of every shot. Layout `[shots, points, samples]`.
    Raw,
}

impl AcquisitionMode {
    #[must_use]
    pub const fn new(average_waveform: bool, average_shots: bool) -> Self {
        match (average_waveform, average_shots) {
            (true, true) => Self::Integrated,
            (false, true) => Self::AveragedTrace,
            (true, false) => Self::SingleShot,
            (false, false) => Self::Raw,
        }
    }

    /// Mode code understood by the capture units.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Integrated => 'B',
            Self::AveragedTrace => '3',
            Self::SingleShot => 'A',
            Self::Raw => '2',
        }
    }

    /// Whether shots are summed on the instrument.
    #[must_use]
    pub const fn sums_shots(self) -> bool {
        matches!(self, Self::Integrated | Self::AveragedTrace)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("No data was downloaded for capture unit {0}")]
    MissingBuffer(UnitKey),
    #[error("Data of capture unit {unit} has shape {found:?}, expected {mode:?} layout with {points} points")]
    ShapeMismatch {
        unit: UnitKey,
        mode: AcquisitionMode,
        points: usize,
        found: Vec<usize>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Demodulates one capture buffer. Returns `None` on a layout mismatch.
fn demodulate(
    raw: ArrayViewD<'_, Complex64>,
    capture: &CaptureSetting,
    acquisition: &AcquisitionSettings,
    mode: AcquisitionMode,
) -> Option<ArrayD<Complex64>> {
    let points = capture.points.len();
    let rate = acquisition.capture_sample_rate;
    let frequency = capture.frequency;
    let preceding = preceding_samples(capture.preceding, rate);
    let mut data = raw.to_owned();
    if capture.sideband.is_inverted() {
        data.mapv_inplace(|y| y.conj());
    }
    let point_axis = match mode {
        AcquisitionMode::Integrated | AcquisitionMode::AveragedTrace => 0,
        AcquisitionMode::SingleShot | AcquisitionMode::Raw => 1,
    };
    if data.shape().get(point_axis) != Some(&points) {
        return None;
    }

    let mut data = match mode {
        AcquisitionMode::Integrated => {
            let mut data = data.into_dimensionality::<Ix1>().ok()?;
            for (y, &t) in data.iter_mut().zip(&capture.points) {
                *y *= (frequency * t).phasor().conj();
            }
            data.into_dyn()
        }
        AcquisitionMode::AveragedTrace => {
            let mut data = data.into_dimensionality::<Ix2>().ok()?;
            for (row, &t) in data.outer_iter_mut().zip(&capture.points) {
                demodulate_inplace(row, frequency, rate, t);
            }
            let trim = preceding.min(data.len_of(Axis(1)));
            data.slice_move(s![.., trim..]).into_dyn()
        }
        AcquisitionMode::SingleShot => {
            let mut data = data.into_dimensionality::<Ix2>().ok()?.reversed_axes();
            for (mut row, &t) in data.outer_iter_mut().zip(&capture.points) {
                let carrier = (frequency * t).phasor().conj();
                row.mapv_inplace(|y| y * carrier);
            }
            data.as_standard_layout().into_owned().into_dyn()
        }
        AcquisitionMode::Raw => {
            let mut data = data.into_dimensionality::<Ix3>().ok()?.permuted_axes([1, 0, 2]);
            for (mut block, &t) in data.outer_iter_mut().zip(&capture.points) {
                for row in block.outer_iter_mut() {
                    demodulate_inplace(row, frequency, rate, t);
                }
            }
            let trim = preceding.min(data.len_of(Axis(2)));
            data.slice_move(s![.., .., trim..])
                .as_standard_layout()
                .into_owned()
                .into_dyn()
        }
    };
    if mode.sums_shots() && acquisition.num_shot > 0 {
        let shots = acquisition.num_shot as f64;
        data.mapv_inplace(|y| y / shots);
    }
    Some(data)
}

/// Turns the buffers downloaded from every capture unit of `job` into
/// per-channel results.
///
/// # Errors
///
/// Fails if a capture unit has no buffer or its buffer does not have the
/// layout of the job's acquisition mode.
pub fn extract(
    job: &PhysicalJob,
    buffers: &IndexMap<UnitKey, ArrayD<Complex64>>,
) -> Result<IndexMap<ChannelId, ArrayD<Complex64>>> {
    let acquisition = &job.acquisition;
    let mode = AcquisitionMode::new(acquisition.average_waveform, acquisition.average_shots);
    job.captures
        .iter()
        .map(|(unit, capture)| {
            let raw = buffers
                .get(unit)
                .ok_or_else(|| Error::MissingBuffer(unit.clone()))?;
            let data = demodulate(raw.view(), capture, acquisition, mode).ok_or_else(|| {
                Error::ShapeMismatch {
                    unit: unit.clone(),
                    mode,
                    points: capture.points.len(),
                    found: raw.shape().to_vec(),
                }
            })?;
            debug!(channel = %capture.channel, unit = %unit, shape = ?data.shape(), "extracted");
            Ok((capture.channel.clone(), data))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use float_cmp::assert_approx_eq;
    use ndarray::{Array, Array1, IxDyn, array};

    use super::*;
    use crate::{
        hardware::{PortKey, Sideband},
        quant::{Frequency, Time},
    };

    fn ns(v: f64) -> Time {
        Time::from_ns(v).unwrap()
    }

    fn unit() -> UnitKey {
        UnitKey::new(
            PortKey {
                device: "box0".into(),
                port: 0,
            },
            0,
        )
    }

    fn physical(mode: AcquisitionMode, points: &[f64], frequency: Frequency) -> PhysicalJob {
        let (average_waveform, average_shots) = match mode {
            AcquisitionMode::Integrated => (true, true),
            AcquisitionMode::AveragedTrace => (false, true),
            AcquisitionMode::SingleShot => (true, false),
            AcquisitionMode::Raw => (false, false),
        };
        let capture = CaptureSetting {
            channel: "Q0_resonator".into(),
            points: points.iter().map(|&p| ns(p)).collect(),
            preceding: ns(16.0),
            frequency,
            sideband: Sideband::Lsb,
            fir: Array1::zeros(16),
            averaging_window: Array1::zeros(256),
        };
        PhysicalJob {
            acquisition: AcquisitionSettings {
                num_shot: 4,
                waveform_length: ns(1024.0),
                repetition_time: ns(10240.0),
                duration: ns(64.0),
                timeout: ns(1e9),
                synchronization_delay: ns(0.0),
                average_waveform,
                average_shots,
                capture_sample_rate: Frequency::from_mhz(125.0).unwrap(),
            },
            dac_units: IndexMap::new(),
            modulation_frequencies: IndexMap::new(),
            bandwidths: IndexMap::new(),
            waveforms: IndexMap::new(),
            fine_frequencies: IndexMap::new(),
            coarse_frequencies: IndexMap::new(),
            local_oscillators: IndexMap::new(),
            captures: IndexMap::from([(unit(), capture)]),
        }
    }

    fn buffers(data: ArrayD<Complex64>) -> IndexMap<UnitKey, ArrayD<Complex64>> {
        IndexMap::from([(unit(), data)])
    }

    #[test]
    fn mode_codes() {
        assert_eq!(AcquisitionMode::new(true, true).code(), 'B');
        assert_eq!(AcquisitionMode::new(false, true).code(), '3');
        assert_eq!(AcquisitionMode::new(true, false).code(), 'A');
        assert_eq!(AcquisitionMode::new(false, false).code(), '2');
    }

    #[test]
    fn integrated_removes_carrier_and_averages() {
        let frequency = Frequency::from_mhz(10.0).unwrap();
        let job = physical(AcquisitionMode::Integrated, &[128.0, 512.0], frequency);
        // Lower sideband data arrives conjugated.
        let raw = Array1::from_iter([128.0, 512.0].map(|t| {
            Complex64::from_polar(4.0, -TAU * frequency.ghz() * t)
        }));
        let result = extract(&job, &buffers(raw.into_dyn())).unwrap();
        let data = &result["Q0_resonator"];
        assert_eq!(data.shape(), &[2]);
        for y in data {
            assert_approx_eq!(f64, y.re, 1.0, epsilon = 1e-9);
            assert_approx_eq!(f64, y.im, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn averaged_trace_trims_preceding_samples() {
        let job = physical(AcquisitionMode::AveragedTrace, &[128.0], Frequency::ZERO);
        let raw = Array::from_elem(IxDyn(&[1, 10]), Complex64::new(8.0, 0.0));
        let result = extract(&job, &buffers(raw)).unwrap();
        let data = &result["Q0_resonator"];
        assert_eq!(data.shape(), &[1, 8]);
        assert!(data.iter().all(|y| (y - Complex64::new(2.0, 0.0)).norm() < 1e-12));
    }

    #[test]
    fn single_shot_puts_points_first() {
        let job = physical(AcquisitionMode::SingleShot, &[128.0, 256.0], Frequency::ZERO);
        let raw = array![
            [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(2.0, 0.0), Complex64::new(3.0, 0.0)],
            [Complex64::new(4.0, 0.0), Complex64::new(5.0, 0.0)],
        ];
        let result = extract(&job, &buffers(raw.into_dyn())).unwrap();
        let data = &result["Q0_resonator"];
        assert_eq!(data.shape(), &[2, 3]);
        assert_eq!(data[[1, 2]], Complex64::new(5.0, 0.0));
        assert_eq!(data[[0, 1]], Complex64::new(2.0, 0.0));
    }

    #[test]
    fn raw_keeps_every_shot() {
        let job = physical(AcquisitionMode::Raw, &[128.0], Frequency::ZERO);
        let raw = Array::from_shape_fn(IxDyn(&[3, 1, 6]), |i| Complex64::new(i[0] as f64, 0.0));
        let result = extract(&job, &buffers(raw)).unwrap();
        let data = &result["Q0_resonator"];
        assert_eq!(data.shape(), &[1, 3, 4]);
        assert_eq!(data[[0, 2, 0]], Complex64::new(2.0, 0.0));
    }

    #[test]
    fn layout_errors() {
        let job = physical(AcquisitionMode::SingleShot, &[128.0, 256.0], Frequency::ZERO);
        let raw = Array::zeros(IxDyn(&[3, 5]));
        assert_eq!(
            extract(&job, &buffers(raw)),
            Err(Error::ShapeMismatch {
                unit: unit(),
                mode: AcquisitionMode::SingleShot,
                points: 2,
                found: vec![3, 5],
            })
        );
        assert_eq!(
            extract(&job, &IndexMap::new()),
            Err(Error::MissingBuffer(unit()))
        );
    }
}
