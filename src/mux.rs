//! Frequency multiplexing of logical channels onto DAC lanes.
//!
//! Every transmitting port carries one LO, one coarse NCO shared by the whole
//! port and one fine NCO per DAC lane. Both NCOs are quantized to the NCO
//! step; what is left over for each channel is the residual frequency,
//! applied digitally by modulating the waveform.
mod grouping;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

pub use self::grouping::assign_lanes;
use crate::{
    hardware::{Assignment, InstrumentConstants, LocalOscillator, PortKey, PortRole, Sideband},
    quant::{ChannelId, Frequency},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Port {port} has no LO but its LO frequency is set to {frequency:?}")]
    InvalidLoConfiguration { port: PortKey, frequency: Frequency },
    #[error("Port {port} with role {role:?} cannot transmit")]
    UnsupportedPortRole { port: PortKey, role: PortRole },
    #[error("Port {0} has no channel to multiplex")]
    EmptyPort(PortKey),
    #[error("Port {0} has no DAC lane")]
    NoLanes(PortKey),
    #[error("Channel {0} is not wired")]
    UnassignedChannel(ChannelId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// NCO settings and per-channel leftovers of one port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortPlan {
    pub lanes: IndexMap<ChannelId, usize>,
    pub residuals: IndexMap<ChannelId, Frequency>,
    pub bandwidths: IndexMap<ChannelId, Frequency>,
    pub coarse: Frequency,
    /// Fine NCO frequency of every used lane.
    pub fine: IndexMap<usize, Frequency>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiplexingResult {
    pub lanes: IndexMap<ChannelId, usize>,
    pub residuals: IndexMap<ChannelId, Frequency>,
    /// Usable pulse bandwidth around each channel's target frequency.
    pub bandwidths: IndexMap<ChannelId, Frequency>,
    pub coarse: IndexMap<PortKey, Frequency>,
    pub fine: IndexMap<PortKey, IndexMap<usize, Frequency>>,
}

fn mean<'a>(frequencies: impl IntoIterator<Item = &'a Frequency>) -> Frequency {
    let (sum, count) = frequencies
        .into_iter()
        .fold((Frequency::ZERO, 0usize), |(s, n), &f| (s + f, n + 1));
    sum / count.max(1) as f64
}

/// Plans the NCOs of one port carrying `targets`.
///
/// # Errors
///
/// Fails if `targets` is empty, the port has no lane, or a direct port has a
/// non-zero LO frequency.
pub fn plan_port(
    port: &PortKey,
    targets: &IndexMap<ChannelId, Frequency>,
    lo: LocalOscillator,
    lanes: usize,
    constants: &InstrumentConstants,
) -> Result<PortPlan> {
    if targets.is_empty() {
        return Err(Error::EmptyPort(port.clone()));
    }
    if lanes == 0 {
        return Err(Error::NoLanes(port.clone()));
    }
    if lo.sideband == Sideband::Direct && lo.frequency != Frequency::ZERO {
        return Err(Error::InvalidLoConfiguration {
            port: port.clone(),
            frequency: lo.frequency,
        });
    }
    let LocalOscillator {
        frequency: lo_freq,
        sideband,
    } = lo;
    let step = constants.nco_step;
    let offset = |coarse, fine, target| sideband.residual(lo_freq, coarse, fine, target);

    let (coarse, _) = offset(Frequency::ZERO, Frequency::ZERO, mean(targets.values()))
        .approximate_by_step(step);
    let assigned = assign_lanes(targets, step / 4.0, lanes);

    let mut plan = PortPlan {
        lanes: IndexMap::new(),
        residuals: IndexMap::new(),
        bandwidths: IndexMap::new(),
        coarse,
        fine: IndexMap::new(),
    };
    for lane in 0..lanes {
        let members: Vec<_> = targets
            .iter()
            .filter(|&(c, _)| assigned.get(c) == Some(&lane))
            .collect();
        if members.is_empty() {
            continue;
        }
        let (fine, _) = offset(coarse, Frequency::ZERO, mean(members.iter().map(|(_, f)| *f)))
            .approximate_by_step(step);
        plan.fine.insert(lane, fine);
        for (channel, &target) in members {
            let residual = offset(coarse, fine, target);
            let by_dac = (constants.dac_bandwidth / 2.0 - residual.abs()) * 2.0;
            let by_nco = (constants.nco_bandwidth / 2.0 - (fine + residual).abs()) * 2.0;
            plan.lanes.insert(channel.clone(), lane);
            plan.residuals.insert(channel.clone(), residual);
            plan.bandwidths.insert(channel.clone(), by_dac.min(by_nco));
        }
    }
    Ok(plan)
}

/// Plans every port used by the channels of `targets`.
///
/// # Errors
///
/// Fails if a channel is not wired, a port cannot transmit, or a port plan
/// fails.
pub fn plan(
    targets: &IndexMap<ChannelId, Frequency>,
    assignment: &Assignment,
) -> Result<MultiplexingResult> {
    let mut ports: IndexMap<PortKey, IndexMap<ChannelId, Frequency>> = IndexMap::new();
    for (channel, &target) in targets {
        let port = assignment
            .port(channel.as_str())
            .ok_or_else(|| Error::UnassignedChannel(channel.clone()))?;
        ports.entry(port).or_default().insert(channel.clone(), target);
    }

    let constants = &assignment.constants;
    let mut result = MultiplexingResult::default();
    for (port, port_targets) in ports {
        let role = constants.port_role(port.port);
        let lo = constants
            .local_oscillator(role)
            .ok_or_else(|| Error::UnsupportedPortRole {
                port: port.clone(),
                role,
            })?;
        let lanes = constants.lanes(port.port);
        let plan = plan_port(&port, &port_targets, lo, lanes, constants)?;
        for (channel, residual) in &plan.residuals {
            let lane = plan.lanes[channel];
            let fine = plan.fine[&lane];
            debug!(
                channel = %channel,
                port = %port,
                lane,
                lo_hz = lo.frequency.hz(),
                sideband = %lo.sideband,
                coarse_hz = plan.coarse.hz(),
                fine_hz = fine.hz(),
                residual_hz = residual.hz(),
                target_hz = port_targets[channel].hz(),
                bandwidth_hz = plan.bandwidths[channel].hz(),
                "multiplexed channel"
            );
        }
        result.lanes.extend(plan.lanes);
        result.residuals.extend(plan.residuals);
        result.bandwidths.extend(plan.bandwidths);
        result.coarse.insert(port.clone(), plan.coarse);
        result.fine.insert(port, plan.fine);
    }
    Ok(result)
}
