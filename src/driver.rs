//! Instrument collaborator and the fixed order in which a translated job is
//! pushed to it.
use anyhow::Context as _;
use indexmap::IndexMap;
use itertools::Itertools as _;
#[cfg(test)]
use mockall::automock;
use ndarray::{Array1, ArrayD};
use num::complex::Complex64;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    extract::{AcquisitionMode, extract},
    hardware::{Assignment, LocalOscillator, PortKey, Sideband, UnitKey},
    job::Job,
    quant::{ChannelId, DeviceId, Frequency, Time},
    translate::{AcquisitionSettings, PhysicalJob, translate},
};

/// Largest accepted difference between the configured and the planned LO.
const LO_TOLERANCE_HZ: f64 = 1.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Acquisition did not finish within {0:?}")]
    AcquisitionTimeout(Time),
    #[error("Lost connection to {device}: {message}")]
    Connection { device: DeviceId, message: String },
    #[error("Instrument rejected {operation}: {message}")]
    Rejected { operation: String, message: String },
    #[error("Port {port} mixes with {found}, expected {expected}")]
    SidebandMismatch {
        port: PortKey,
        expected: Sideband,
        found: Sideband,
    },
    #[error("LO of port {port} is at {found:?}, expected {expected:?}")]
    LoFrequencyMismatch {
        port: PortKey,
        expected: Frequency,
        found: Frequency,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Raw capture data of every capture unit.
pub type Buffers = IndexMap<UnitKey, ArrayD<Complex64>>;

/// Device operations needed to run a [`PhysicalJob`].
#[cfg_attr(test, automock)]
pub trait Driver {
    /// Applies the timing shared by every unit: waveform and repetition
    /// lengths, timeout and synchronization delay.
    fn configure(&mut self, settings: &AcquisitionSettings) -> Result<()>;
    fn set_shot_count(&mut self, shots: usize) -> Result<()>;
    fn upload_waveform(&mut self, unit: &UnitKey, waveform: &Array1<Complex64>) -> Result<()>;
    fn set_fine_frequency(&mut self, unit: &UnitKey, frequency: Frequency) -> Result<()>;
    /// Sets the coarse NCO of a port, and of its paired capture port if it
    /// reads out.
    fn set_coarse_frequency(&mut self, port: &PortKey, frequency: Frequency) -> Result<()>;
    fn sideband(&mut self, port: &PortKey) -> Result<Sideband>;
    fn lo_frequency(&mut self, port: &PortKey) -> Result<Frequency>;
    /// Opens one capture window per `(start, end)` pair.
    fn set_capture_windows(&mut self, unit: &UnitKey, windows: &[(Time, Time)]) -> Result<()>;
    fn set_fir_coefficients(
        &mut self,
        unit: &UnitKey,
        coefficients: &Array1<Complex64>,
    ) -> Result<()>;
    fn set_averaging_window(
        &mut self,
        unit: &UnitKey,
        coefficients: &Array1<Complex64>,
    ) -> Result<()>;
    fn set_acquisition_mode(&mut self, unit: &UnitKey, mode: AcquisitionMode) -> Result<()>;
    /// Starts every unit and blocks until `units` delivered their data.
    fn trigger_and_wait(&mut self, timeout: Time, units: &[UnitKey]) -> Result<Buffers>;
}

fn check_local_oscillator<D: Driver + ?Sized>(
    driver: &mut D,
    port: &PortKey,
    lo: LocalOscillator,
) -> Result<()> {
    if lo.sideband == Sideband::Direct {
        return Ok(());
    }
    let found = driver.sideband(port)?;
    if found != lo.sideband {
        return Err(Error::SidebandMismatch {
            port: port.clone(),
            expected: lo.sideband,
            found,
        });
    }
    let found = driver.lo_frequency(port)?;
    if (found - lo.frequency).hz().abs() >= LO_TOLERANCE_HZ {
        return Err(Error::LoFrequencyMismatch {
            port: port.clone(),
            expected: lo.frequency,
            found,
        });
    }
    Ok(())
}

/// Configures the instrument for `job`, runs it and downloads the capture
/// buffers.
///
/// # Errors
///
/// Propagates driver failures and fails if a port's LO does not match the
/// plan. Nothing is triggered after a failure.
#[instrument(skip_all)]
pub fn execute<D: Driver + ?Sized>(driver: &mut D, job: &PhysicalJob) -> Result<Buffers> {
    let acquisition = &job.acquisition;
    driver.configure(acquisition)?;
    driver.set_shot_count(acquisition.num_shot)?;
    for (unit, waveform) in &job.waveforms {
        driver.upload_waveform(unit, waveform)?;
    }
    for (unit, &frequency) in &job.fine_frequencies {
        driver.set_fine_frequency(unit, frequency)?;
    }
    for (port, &frequency) in &job.coarse_frequencies {
        driver.set_coarse_frequency(port, frequency)?;
    }
    for (port, &lo) in &job.local_oscillators {
        check_local_oscillator(driver, port, lo)?;
    }
    debug!(
        dac_units = job.waveforms.len(),
        ports = job.coarse_frequencies.len(),
        "generators configured"
    );

    for (unit, capture) in &job.captures {
        let windows = capture
            .points
            .iter()
            .map(|&start| (start, start + acquisition.duration))
            .collect_vec();
        driver.set_capture_windows(unit, &windows)?;
    }
    for (unit, capture) in &job.captures {
        driver.set_fir_coefficients(unit, &capture.fir)?;
    }
    if acquisition.average_waveform {
        for (unit, capture) in &job.captures {
            driver.set_averaging_window(unit, &capture.averaging_window)?;
        }
    }
    let mode = AcquisitionMode::new(acquisition.average_waveform, acquisition.average_shots);
    for unit in job.captures.keys() {
        driver.set_acquisition_mode(unit, mode)?;
    }

    let units = job.captures.keys().cloned().collect_vec();
    info!(
        shots = acquisition.num_shot,
        capture_units = units.len(),
        mode = %mode.code(),
        "triggering"
    );
    driver.trigger_and_wait(acquisition.timeout, &units)
}

/// Translates `job`, runs it on `driver` and extracts per-channel results.
///
/// # Errors
///
/// Fails if any of the three stages fails.
pub fn run<D: Driver + ?Sized>(
    driver: &mut D,
    job: &Job,
    assignment: &Assignment,
) -> anyhow::Result<IndexMap<ChannelId, ArrayD<Complex64>>> {
    let physical = translate(job, assignment).context("Failed to translate job")?;
    let buffers = execute(driver, &physical).context("Failed to execute job")?;
    let results = extract(&physical, &buffers).context("Failed to extract results")?;
    Ok(results)
}
