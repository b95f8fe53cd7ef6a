//! Analytic pulse templates.
//!
//! A [`Shape`] is a complex function of the time variable [`TIME`] plus a
//! progress expression telling how far the channel cursor advances after the
//! shape is placed. Both may depend on further named parameters which are
//! bound when the shape is instantiated with [`Shape::function`] and
//! [`Shape::progress`].
pub mod preset;

use std::collections::BTreeSet;

use hashbrown::HashMap;
use indexmap::IndexMap;
use ndarray::{ArrayView1, ArrayViewMut1, Zip};
use num::complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    expr::Expr,
    quant::{ShapeId, Time},
};

/// Reserved name of the time variable.
pub const TIME: &str = "t";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Shape not found: {0}")]
    UnknownShape(ShapeId),
    #[error("Unbound variables {variables:?} in shape {shape}")]
    UnboundVariable {
        shape: ShapeId,
        variables: Vec<String>,
    },
    #[error("Time variable 't' used in progress of shape {0}")]
    TimeInProgress(ShapeId),
    #[error("Time variable 't' cannot be bound for shape {0}")]
    TimeBound(ShapeId),
    #[error("Progress of shape {0} is not a finite real number")]
    InvalidProgress(ShapeId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parameter values used to instantiate a shape.
pub type Bindings<'a> = HashMap<&'a str, Complex64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ShapeRepr")]
pub struct Shape {
    name: ShapeId,
    expr: Expr,
    progress: Expr,
}

#[derive(Deserialize)]
struct ShapeRepr {
    name: ShapeId,
    expr: Expr,
    progress: Expr,
}

impl TryFrom<ShapeRepr> for Shape {
    type Error = Error;

    fn try_from(repr: ShapeRepr) -> Result<Self> {
        Self::new(repr.name, repr.expr, repr.progress)
    }
}

impl Shape {
    /// # Errors
    ///
    /// Fails if `progress` depends on the time variable.
    pub fn new(name: ShapeId, expr: Expr, progress: Expr) -> Result<Self> {
        if progress.has_variable(TIME) {
            return Err(Error::TimeInProgress(name));
        }
        Ok(Self {
            name,
            expr,
            progress,
        })
    }

    #[must_use]
    pub const fn name(&self) -> &ShapeId {
        &self.name
    }

    #[must_use]
    pub const fn expr(&self) -> &Expr {
        &self.expr
    }

    #[must_use]
    pub const fn progress_expr(&self) -> &Expr {
        &self.progress
    }

    /// Parameters that must be bound before the shape can be used, i.e. all
    /// variables of both expressions except the time.
    #[must_use]
    pub fn parameters(&self) -> BTreeSet<&str> {
        let mut vars = self.expr.free_variables();
        vars.extend(self.progress.free_variables());
        vars.remove(TIME);
        vars
    }

    /// Binds every parameter and returns the remaining function of time.
    ///
    /// # Errors
    ///
    /// Fails if `bindings` tries to bind the time variable or leaves any other
    /// variable of the time expression free.
    pub fn function(&self, bindings: &Bindings<'_>) -> Result<ShapeFunction> {
        if bindings.contains_key(TIME) {
            return Err(Error::TimeBound(self.name.clone()));
        }
        let expr = self.expr.substitute(&|name| bindings.get(name).copied());
        let unbound: Vec<String> = expr
            .free_variables()
            .into_iter()
            .filter(|&v| v != TIME)
            .map(str::to_string)
            .collect();
        if !unbound.is_empty() {
            return Err(Error::UnboundVariable {
                shape: self.name.clone(),
                variables: unbound,
            });
        }
        Ok(ShapeFunction(expr))
    }

    /// Evaluates the progress expression.
    ///
    /// # Errors
    ///
    /// Fails if any variable of the progress expression is left unbound.
    pub fn progress(&self, bindings: &Bindings<'_>) -> Result<Time> {
        let value = self
            .progress
            .substitute(&|name| bindings.get(name).copied());
        let Some(value) = value.as_const() else {
            return Err(Error::UnboundVariable {
                shape: self.name.clone(),
                variables: value
                    .free_variables()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            });
        };
        if !value.re.is_finite() {
            return Err(Error::InvalidProgress(self.name.clone()));
        }
        Time::new(value.re).map_err(|_| Error::InvalidProgress(self.name.clone()))
    }
}

/// A shape with all parameters bound, a pure function of time.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFunction(Expr);

impl ShapeFunction {
    #[must_use]
    pub fn eval(&self, t: f64) -> Complex64 {
        self.0
            .eval(&|name| (name == TIME).then_some(Complex64::new(t, 0.0)))
            .expect("Only the time variable should be free")
    }

    /// Adds `f(time - offset)` for every sample time into `waveform`.
    pub fn mix_add(
        &self,
        times: ArrayView1<'_, f64>,
        offset: Time,
        waveform: ArrayViewMut1<'_, Complex64>,
    ) {
        if let Some(value) = self.0.as_const() {
            if value != Complex64::new(0.0, 0.0) {
                waveform.into_iter().for_each(|w| *w += value);
            }
            return;
        }
        let offset = offset.ns();
        Zip::from(waveform)
            .and(times)
            .par_for_each(|w, &t| *w += self.eval(t - offset));
    }
}

/// Registry of shapes by name, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Shape>", into = "Vec<Shape>")]
pub struct ShapeLibrary {
    shapes: IndexMap<ShapeId, Shape>,
}

impl ShapeLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with every preset shape.
    #[must_use]
    pub fn preset() -> Self {
        let mut library = Self::new();
        for shape in preset::all() {
            library.add_shape(shape);
        }
        library
    }

    /// Registers `shape`, replacing and returning any shape of the same name.
    pub fn add_shape(&mut self, shape: Shape) -> Option<Shape> {
        self.shapes.insert(shape.name.clone(), shape)
    }

    /// # Errors
    ///
    /// Fails if no shape is registered as `name`.
    pub fn get(&self, name: &str) -> Result<&Shape> {
        self.shapes
            .get(name)
            .ok_or_else(|| Error::UnknownShape(name.into()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &ShapeId> {
        self.shapes.keys()
    }

    /// # Errors
    ///
    /// See [`Shape::function`].
    pub fn function(&self, name: &str, bindings: &Bindings<'_>) -> Result<ShapeFunction> {
        self.get(name)?.function(bindings)
    }

    /// # Errors
    ///
    /// See [`Shape::progress`].
    pub fn progress(&self, name: &str, bindings: &Bindings<'_>) -> Result<Time> {
        self.get(name)?.progress(bindings)
    }
}

impl From<Vec<Shape>> for ShapeLibrary {
    fn from(shapes: Vec<Shape>) -> Self {
        Self {
            shapes: shapes.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }
}

impl From<ShapeLibrary> for Vec<Shape> {
    fn from(library: ShapeLibrary) -> Self {
        library.shapes.into_values().collect()
    }
}
