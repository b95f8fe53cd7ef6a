use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use num::complex::Complex64;

use crate::quant::{Frequency, Time};

/// Carrier of `frequency` at sample `index` of a clock running at
/// `sample_rate`, starting at `start`.
fn carrier(frequency: Frequency, sample_rate: Frequency, start: Time, index: usize) -> Complex64 {
    let time = start + sample_rate.period() * index as f64;
    (frequency * time).phasor()
}

/// Multiplies `waveform` by `exp(i 2π f n / fs)`.
pub fn modulate(
    waveform: ArrayView1<'_, Complex64>,
    frequency: Frequency,
    sample_rate: Frequency,
) -> Array1<Complex64> {
    waveform
        .indexed_iter()
        .map(|(n, &y)| y * carrier(frequency, sample_rate, Time::ZERO, n))
        .collect()
}

/// Multiplies `samples` by `exp(-i 2π f t)` where sample `n` is taken at
/// `start + n / fs`.
pub fn demodulate_inplace(
    mut samples: ArrayViewMut1<'_, Complex64>,
    frequency: Frequency,
    sample_rate: Frequency,
    start: Time,
) {
    for (n, y) in samples.indexed_iter_mut() {
        *y *= carrier(frequency, sample_rate, start, n).conj();
    }
}
