//! Pulse sequencing and frequency-multiplexed job translation for
//! superconducting-qubit control hardware.
//!
//! Pulses are built from analytic [`shape::Shape`]s over symbolic
//! [`expr::Expr`] parameters. A [`sequence::Sequence`] places them on logical
//! channels with per-channel cursors. [`translate::translate`] binds the
//! channels of a [`job::Job`] to physical ports, plans the LO and NCO stack
//! with [`mux`] and produces a [`translate::PhysicalJob`]. A
//! [`driver::Driver`] runs it and [`extract::extract`] turns the raw capture
//! buffers back into demodulated per-channel data.
//!
//! Times are in nanoseconds and frequencies in hertz throughout, see
//! [`quant`].
pub mod driver;
pub mod expr;
pub mod extract;
pub mod hardware;
pub mod job;
pub mod mux;
pub mod pulse;
pub mod quant;
pub mod sequence;
pub mod serde_util;
pub mod shape;
pub mod translate;

pub use num::complex::Complex64;

pub use crate::{
    driver::{Driver, execute, run},
    extract::{AcquisitionMode, extract},
    hardware::{Assignment, InstrumentConstants, PortRole, Sideband},
    job::{AcquisitionConfig, Job, JobParameter},
    pulse::{Pulse, PulseLibrary},
    quant::{ChannelId, Frequency, Time},
    sequence::{Sequence, SequenceConfig},
    shape::{Shape, ShapeLibrary},
    translate::{PhysicalJob, translate},
};
