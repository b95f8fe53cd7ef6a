use std::{f64::consts::TAU, sync::Arc};

use cached::proc_macro::cached;
use ndarray::Array1;
use num::complex::Complex64;

use crate::{hardware::InstrumentConstants, quant::Frequency};

/// Gaussian width of the low-pass envelope in nanoseconds.
const SIGMA: f64 = 6.0;
/// Keeps the coefficients strictly inside the fixed-point range.
const ATTENUATION: f64 = 1.0 - 1e-3;

#[cached(size = 64)]
fn band_coefficients(band: i64, taps: usize, adc_baseband: Frequency) -> Arc<Array1<Complex64>> {
    let band_step = adc_baseband / taps as f64;
    let center = (band_step * band as f64).ghz();
    let middle = (taps as f64 - 1.0) / 2.0;
    let coefficients = (0..taps)
        .map(|k| {
            let x = (k as f64 - middle) / adc_baseband.ghz();
            let envelope = (-0.5 * x * x / (SIGMA * SIGMA)).exp();
            Complex64::from_polar(envelope * ATTENUATION, -TAU * center * x)
        })
        .collect();
    Arc::new(coefficients)
}

/// Band-pass FIR around `frequency`, built from a Gaussian low-pass shifted to
/// the nearest of the `taps` evenly spaced bands.
///
/// Returns `None` if `frequency` is outside the ADC Nyquist band.
pub fn band_pass(
    frequency: Frequency,
    constants: &InstrumentConstants,
) -> Option<Arc<Array1<Complex64>>> {
    let adc = constants.adc_baseband;
    if frequency.abs() >= adc / 2.0 || constants.fir_taps == 0 {
        return None;
    }
    let band_step = adc / constants.fir_taps as f64;
    let band = (frequency / band_step).round() as i64;
    Some(band_coefficients(band, constants.fir_taps, adc))
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn mhz(v: f64) -> Frequency {
        Frequency::from_mhz(v).unwrap()
    }

    #[test]
    fn center_band_is_symmetric_lowpass() {
        let constants = InstrumentConstants::quel1se_low_freq();
        let taps = band_pass(mhz(3.0), &constants).unwrap();
        assert_eq!(taps.len(), 16);
        for k in 0..8 {
            assert_approx_eq!(f64, taps[k].im, 0.0, epsilon = 1e-12);
            assert_approx_eq!(f64, taps[k].re, taps[15 - k].re, epsilon = 1e-12);
        }
        assert!(taps[7].re > taps[0].re);
        assert!(taps.iter().all(|c| c.norm() < 1.0));
    }

    #[test]
    fn shifted_band_peaks_at_its_center() {
        let constants = InstrumentConstants::quel1se_low_freq();
        let taps = band_pass(mhz(-60.0), &constants).unwrap();
        let response = |f: Frequency| {
            taps.iter()
                .enumerate()
                .map(|(k, c)| {
                    let x = (k as f64 - 7.5) / constants.adc_baseband.ghz();
                    c * Complex64::from_polar(1.0, TAU * f.ghz() * x)
                })
                .sum::<Complex64>()
                .norm()
        };
        assert!(response(mhz(-62.5)) > response(mhz(62.5)));
    }

    #[test]
    fn nyquist_limit() {
        let constants = InstrumentConstants::quel1se_low_freq();
        assert!(band_pass(mhz(250.0), &constants).is_none());
        assert!(band_pass(mhz(-250.0), &constants).is_none());
        assert!(band_pass(mhz(249.0), &constants).is_some());
    }

    #[test]
    fn bands_are_shared() {
        let constants = InstrumentConstants::quel1se_low_freq();
        let a = band_pass(mhz(30.0), &constants).unwrap();
        let b = band_pass(mhz(32.0), &constants).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
