use ndarray::{Array1, ArrayView1, s};
use num::complex::Complex64;

use super::{Error, Result};
use crate::{
    hardware::InstrumentConstants,
    quant::{Frequency, Time},
};

/// Checks a capture window length against the instrument limits.
pub fn check_duration(duration: Time, constants: &InstrumentConstants) -> Result<()> {
    let reason = if duration > constants.window_max {
        "exceeds the longest capture window"
    } else if duration < constants.window_min {
        "is shorter than the shortest capture window"
    } else if duration.ns() % constants.window_step.ns() >= 0.5 {
        "is not a multiple of the capture window step"
    } else {
        return Ok(());
    };
    Err(Error::AcquisitionDuration { duration, reason })
}

/// Moves capture points onto the hardware window grid.
///
/// The first window may only open on a multiple of the first-window step, so
/// the part of the earliest point past that multiple is returned separately
/// as the preceding time. The remaining offsets are rounded to the decimated
/// ADC sample period.
pub fn align_points(points: &[Time], constants: &InstrumentConstants) -> (Vec<Time>, Time) {
    let Some(&first) = points.iter().min() else {
        return (Vec::new(), Time::ZERO);
    };
    let preceding = first - first.floor_to(constants.first_window_step);
    let period = constants.adc_decimated.period();
    let aligned = points
        .iter()
        .map(|&p| (p - preceding).round_to(period))
        .collect();
    (aligned, preceding)
}

/// Number of capture samples the preceding time occupies.
pub fn preceding_samples(preceding: Time, sample_rate: Frequency) -> usize {
    sample_rate.samples_in(preceding).round() as usize
}

/// Longest averaging window that fits whatever the preceding time is.
#[must_use]
pub fn available_averaging_window_samples(constants: &InstrumentConstants) -> usize {
    let span = constants.window_max - constants.first_window_step;
    constants.adc_decimated.samples_in(span).round() as usize
}

/// Pads `window` to the full averaging buffer, delayed by the preceding time.
///
/// Returns `None` if the delayed window does not fit.
pub fn place_averaging_window(
    window: ArrayView1<'_, Complex64>,
    preceding: Time,
    constants: &InstrumentConstants,
) -> Option<Array1<Complex64>> {
    let offset = preceding_samples(preceding, constants.adc_decimated);
    let total = constants
        .adc_decimated
        .samples_in(constants.window_max)
        .round() as usize;
    let end = offset + window.len();
    if end > total {
        return None;
    }
    let mut placed = Array1::zeros(total);
    placed.slice_mut(s![offset..end]).assign(&window);
    Some(placed)
}
