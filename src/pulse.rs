//! Multi-channel pulses composed of shape placements.
pub mod preset;

use hashbrown::HashMap;
use indexmap::IndexMap;
use itertools::Itertools as _;
use ndarray::{Array1, ArrayView1};
use num::complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    expr::Expr,
    quant::{ChannelId, PulseId, ShapeId, Time},
    shape::{self, Bindings, ShapeLibrary},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Shape {shape} used by pulse {pulse} is not in the shape library")]
    UnknownShape { pulse: PulseId, shape: ShapeId },
    #[error("Pulse {pulse} places a shape on channel {channel} outside its channel list")]
    UndeclaredChannel { pulse: PulseId, channel: ChannelId },
    #[error("Parameters {parameters:?} of shape {shape} are not provided in pulse {pulse}")]
    MissingParameter {
        pulse: PulseId,
        shape: ShapeId,
        parameters: Vec<String>,
    },
    #[error("Undefined variables {variables:?} in pulse {pulse}")]
    UndefinedVariable {
        pulse: PulseId,
        variables: Vec<String>,
    },
    #[error("Pulse already registered: {0}")]
    DuplicatePulse(PulseId),
    #[error("Invalid pulse {pulse}: {source}")]
    InvalidPulse {
        pulse: PulseId,
        #[source]
        source: Box<Error>,
    },
    #[error("Pulse not found: {0}")]
    UnknownPulse(PulseId),
    #[error(transparent)]
    Shape(#[from] shape::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Values of a pulse's tunable variables, by variable name.
pub type Parameters = IndexMap<String, f64>;

/// Per-channel waveforms of one pulse, in the pulse's channel order.
pub type Waveforms = IndexMap<ChannelId, Array1<Complex64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub channel: ChannelId,
    pub shape: ShapeId,
    pub parameters: IndexMap<String, Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub default: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    name: PulseId,
    channels: Vec<ChannelId>,
    placements: Vec<Placement>,
    variables: IndexMap<String, Variable>,
}

impl Pulse {
    pub fn new<I, C>(name: impl Into<PulseId>, channels: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChannelId>,
    {
        Self {
            name: name.into(),
            channels: channels.into_iter().map(Into::into).collect(),
            placements: Vec::new(),
            variables: IndexMap::new(),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &PulseId {
        &self.name
    }

    #[must_use]
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    #[must_use]
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Declares a tunable variable and returns it as an expression for use in
    /// placement parameters.
    pub fn add_variable(&mut self, name: &str, default: f64, description: &str) -> Expr {
        self.variables.insert(
            name.to_string(),
            Variable {
                default,
                description: description.to_string(),
            },
        );
        Expr::var(name)
    }

    pub fn add_shape<'a, I>(&mut self, channel: &str, shape: &str, parameters: I)
    where
        I: IntoIterator<Item = (&'a str, Expr)>,
    {
        self.placements.push(Placement {
            channel: channel.into(),
            shape: shape.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        });
    }

    /// Checks every placement against `shapes`.
    ///
    /// # Errors
    ///
    /// Fails if a placement refers to an unknown shape or a channel outside
    /// the channel list, or does not provide every parameter of its shape.
    pub fn validate(&self, shapes: &ShapeLibrary) -> Result<()> {
        for placement in &self.placements {
            let Ok(shape) = shapes.get(placement.shape.as_str()) else {
                return Err(Error::UnknownShape {
                    pulse: self.name.clone(),
                    shape: placement.shape.clone(),
                });
            };
            if !self.channels.contains(&placement.channel) {
                return Err(Error::UndeclaredChannel {
                    pulse: self.name.clone(),
                    channel: placement.channel.clone(),
                });
            }
            let missing = shape
                .parameters()
                .into_iter()
                .filter(|&p| !placement.parameters.contains_key(p))
                .map(str::to_string)
                .collect_vec();
            if !missing.is_empty() {
                return Err(Error::MissingParameter {
                    pulse: self.name.clone(),
                    shape: placement.shape.clone(),
                    parameters: missing,
                });
            }
        }
        Ok(())
    }

    /// Default value of every declared variable.
    #[must_use]
    pub fn defaults(&self) -> Parameters {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), v.default))
            .collect()
    }

    #[must_use]
    pub fn descriptions(&self) -> IndexMap<String, String> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), v.description.clone()))
            .collect()
    }

    fn bind<'a>(&self, placement: &'a Placement, config: &Parameters) -> Result<Bindings<'a>> {
        let lookup = |name: &str| config.get(name).map(|&v| Complex64::new(v, 0.0));
        placement
            .parameters
            .iter()
            .map(|(key, expr)| {
                let value = expr.substitute(&lookup);
                value.as_const().map(|v| (key.as_str(), v)).ok_or_else(|| {
                    Error::UndefinedVariable {
                        pulse: self.name.clone(),
                        variables: value
                            .free_variables()
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                    }
                })
            })
            .collect()
    }

    /// Walks the placements in order, advancing a cursor per channel from
    /// `start`, and returns the pulse duration.
    fn walk<F>(
        &self,
        start: Time,
        config: &Parameters,
        shapes: &ShapeLibrary,
        mut f: F,
    ) -> Result<Time>
    where
        F: FnMut(&Placement, &Bindings<'_>, Time) -> Result<()>,
    {
        let mut cursors: HashMap<&ChannelId, Time> =
            self.channels.iter().map(|c| (c, start)).collect();
        for placement in &self.placements {
            let bindings = self.bind(placement, config)?;
            let cursor = cursors
                .get_mut(&placement.channel)
                .ok_or_else(|| Error::UndeclaredChannel {
                    pulse: self.name.clone(),
                    channel: placement.channel.clone(),
                })?;
            f(placement, &bindings, *cursor)?;
            *cursor += shapes.progress(placement.shape.as_str(), &bindings)?;
        }
        let end = cursors.into_values().max().unwrap_or(start);
        Ok(end - start)
    }

    /// Samples every channel of the pulse at `times`, with the pulse starting
    /// at `start`.
    ///
    /// # Errors
    ///
    /// Fails if `config` leaves a placement parameter undefined or a shape
    /// cannot be instantiated.
    pub fn waveform(
        &self,
        times: ArrayView1<'_, f64>,
        start: Time,
        config: &Parameters,
        shapes: &ShapeLibrary,
    ) -> Result<(Waveforms, Time)> {
        let mut waveforms: Waveforms = self
            .channels
            .iter()
            .map(|c| (c.clone(), Array1::zeros(times.len())))
            .collect();
        let duration = self.walk(start, config, shapes, |placement, bindings, cursor| {
            let function = shapes.function(placement.shape.as_str(), bindings)?;
            if let Some(waveform) = waveforms.get_mut(&placement.channel) {
                function.mix_add(times, cursor, waveform.view_mut());
            }
            Ok(())
        })?;
        Ok((waveforms, duration))
    }

    /// Duration of the pulse without sampling it.
    ///
    /// # Errors
    ///
    /// Fails if `config` leaves a placement parameter undefined.
    pub fn duration(&self, config: &Parameters, shapes: &ShapeLibrary) -> Result<Time> {
        self.walk(Time::ZERO, config, shapes, |_, _, _| Ok(()))
    }
}

/// Validated pulses over one shape library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PulseLibraryRepr", into = "PulseLibraryRepr")]
pub struct PulseLibrary {
    shapes: ShapeLibrary,
    pulses: IndexMap<PulseId, Pulse>,
}

#[derive(Serialize, Deserialize)]
struct PulseLibraryRepr {
    shapes: ShapeLibrary,
    pulses: Vec<Pulse>,
}

impl TryFrom<PulseLibraryRepr> for PulseLibrary {
    type Error = Error;

    fn try_from(repr: PulseLibraryRepr) -> Result<Self> {
        let mut library = Self::new(repr.shapes);
        for pulse in repr.pulses {
            library.add_pulse(pulse)?;
        }
        Ok(library)
    }
}

impl From<PulseLibrary> for PulseLibraryRepr {
    fn from(library: PulseLibrary) -> Self {
        Self {
            shapes: library.shapes,
            pulses: library.pulses.into_values().collect(),
        }
    }
}

impl PulseLibrary {
    #[must_use]
    pub fn new(shapes: ShapeLibrary) -> Self {
        Self {
            shapes,
            pulses: IndexMap::new(),
        }
    }

    /// Preset shapes with every preset pulse registered.
    #[must_use]
    pub fn preset() -> Self {
        let mut library = Self::new(ShapeLibrary::preset());
        for pulse in preset::all() {
            library
                .add_pulse(pulse)
                .expect("Preset pulses should validate against preset shapes");
        }
        library
    }

    #[must_use]
    pub const fn shapes(&self) -> &ShapeLibrary {
        &self.shapes
    }

    /// Validates `pulse` and registers it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicatePulse`] if the name is taken and with
    /// [`Error::InvalidPulse`] if validation fails.
    pub fn add_pulse(&mut self, pulse: Pulse) -> Result<()> {
        if self.pulses.contains_key(&pulse.name) {
            return Err(Error::DuplicatePulse(pulse.name));
        }
        pulse
            .validate(&self.shapes)
            .map_err(|e| Error::InvalidPulse {
                pulse: pulse.name.clone(),
                source: Box::new(e),
            })?;
        self.pulses.insert(pulse.name.clone(), pulse);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if no pulse is registered as `name`.
    pub fn get(&self, name: &str) -> Result<&Pulse> {
        self.pulses
            .get(name)
            .ok_or_else(|| Error::UnknownPulse(name.into()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.pulses.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &PulseId> {
        self.pulses.keys()
    }

    /// # Errors
    ///
    /// Fails if no pulse is registered as `name`.
    pub fn channels(&self, name: &str) -> Result<&[ChannelId]> {
        Ok(self.get(name)?.channels())
    }

    /// # Errors
    ///
    /// Fails if no pulse is registered as `name`.
    pub fn defaults(&self, name: &str) -> Result<Parameters> {
        Ok(self.get(name)?.defaults())
    }

    #[must_use]
    pub fn descriptions(&self) -> IndexMap<PulseId, IndexMap<String, String>> {
        self.pulses
            .iter()
            .map(|(name, pulse)| (name.clone(), pulse.descriptions()))
            .collect()
    }

    /// # Errors
    ///
    /// See [`Pulse::waveform`].
    pub fn waveform(
        &self,
        name: &str,
        times: ArrayView1<'_, f64>,
        start: Time,
        config: &Parameters,
    ) -> Result<(Waveforms, Time)> {
        self.get(name)?.waveform(times, start, config, &self.shapes)
    }

    /// # Errors
    ///
    /// See [`Pulse::duration`].
    pub fn duration(&self, name: &str, config: &Parameters) -> Result<Time> {
        self.get(name)?.duration(config, &self.shapes)
    }
}
