//! Physical quantities and identifiers.
//!
//! Times are stored in nanoseconds and frequencies in hertz. The two families
//! never mix through `+`/`-`; the only cross-unit products are
//! [`Frequency`] × [`Time`] = [`Phase`] and the explicit ratio helpers.
use std::{
    borrow::Borrow,
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
    sync::Arc,
};

use num::complex::Complex64;
use ordered_float::{FloatIsNan, NotNan};
use serde::{Deserialize, Serialize};

macro_rules! forward_ref_binop {
    ($trait:ident, $method:ident, $t:ty) => {
        impl<'a> $trait<$t> for &'a $t {
            type Output = $t;

            fn $method(self, rhs: $t) -> Self::Output {
                $trait::$method(*self, rhs)
            }
        }

        impl<'a> $trait<&'a $t> for $t {
            type Output = $t;

            fn $method(self, rhs: &'a $t) -> Self::Output {
                $trait::$method(self, *rhs)
            }
        }
    };
}

macro_rules! impl_quant {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        #[serde(try_from = "f64", into = "f64")]
        pub struct $t(NotNan<f64>);

        impl $t {
            /// # Errors
            ///
            /// Returns an error if `value` is NaN.
            pub fn new(value: f64) -> Result<Self, FloatIsNan> {
                Ok(Self(NotNan::new(value)?))
            }

            #[must_use]
            pub fn value(self) -> f64 {
                self.0.into_inner()
            }

            #[must_use]
            pub fn abs(self) -> Self {
                Self(NotNan::new(self.value().abs()).expect("abs of a non-NaN value"))
            }

            pub const ZERO: Self = Self(unsafe { NotNan::new_unchecked(0.0) });
        }

        impl Add for $t {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        forward_ref_binop!(Add, add, $t);

        impl AddAssign for $t {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $t {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        forward_ref_binop!(Sub, sub, $t);

        impl SubAssign for $t {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Neg for $t {
            type Output = Self;

            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $t {
            type Output = Self;

            fn mul(self, rhs: f64) -> Self::Output {
                Self(NotNan::new(self.0 * rhs).expect("product of a non-NaN value"))
            }
        }

        impl Mul<$t> for f64 {
            type Output = $t;

            fn mul(self, rhs: $t) -> Self::Output {
                rhs * self
            }
        }

        impl Div<f64> for $t {
            type Output = Self;

            fn div(self, rhs: f64) -> Self::Output {
                Self(NotNan::new(self.0 / rhs).expect("quotient of a non-NaN value"))
            }
        }

        /// Dimensionless ratio of two quantities of the same unit.
        impl Div for $t {
            type Output = f64;

            fn div(self, rhs: Self) -> Self::Output {
                self.value() / rhs.value()
            }
        }

        impl Sum for $t {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, Add::add)
            }
        }

        impl<'a> Sum<&'a $t> for $t {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                iter.copied().sum()
            }
        }

        impl From<$t> for f64 {
            fn from(q: $t) -> Self {
                q.value()
            }
        }

        impl TryFrom<f64> for $t {
            type Error = FloatIsNan;

            fn try_from(value: f64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }
    };
}

impl_quant!(
    /// Time in nanoseconds.
    Time
);
impl_quant!(
    /// Frequency in hertz.
    Frequency
);
impl_quant!(
    /// Phase in cycles.
    Phase
);

impl Time {
    /// # Errors
    ///
    /// Returns an error if `value` is NaN.
    pub fn from_ns(value: f64) -> Result<Self, FloatIsNan> {
        Self::new(value)
    }

    /// # Errors
    ///
    /// Returns an error if `value` is NaN.
    pub fn from_us(value: f64) -> Result<Self, FloatIsNan> {
        Self::new(value * 1e3)
    }

    /// # Errors
    ///
    /// Returns an error if `value` is NaN.
    pub fn from_ms(value: f64) -> Result<Self, FloatIsNan> {
        Self::new(value * 1e6)
    }

    #[must_use]
    pub fn ns(self) -> f64 {
        self.value()
    }

    /// Rounds up to the next multiple of `step`.
    #[must_use]
    pub fn ceil_to(self, step: Self) -> Self {
        step * (self / step).ceil()
    }

    /// Rounds down to the previous multiple of `step`.
    #[must_use]
    pub fn floor_to(self, step: Self) -> Self {
        step * (self / step).floor()
    }

    /// Rounds to the nearest multiple of `step`.
    #[must_use]
    pub fn round_to(self, step: Self) -> Self {
        step * (self / step).round()
    }
}

impl Frequency {
    /// # Errors
    ///
    /// Returns an error if `value` is NaN.
    pub fn from_hz(value: f64) -> Result<Self, FloatIsNan> {
        Self::new(value)
    }

    /// # Errors
    ///
    /// Returns an error if `value` is NaN.
    pub fn from_mhz(value: f64) -> Result<Self, FloatIsNan> {
        Self::new(value * 1e6)
    }

    /// # Errors
    ///
    /// Returns an error if `value` is NaN.
    pub fn from_ghz(value: f64) -> Result<Self, FloatIsNan> {
        Self::new(value * 1e9)
    }

    #[must_use]
    pub fn hz(self) -> f64 {
        self.value()
    }

    #[must_use]
    pub fn mhz(self) -> f64 {
        self.value() * 1e-6
    }

    #[must_use]
    pub fn ghz(self) -> f64 {
        self.value() * 1e-9
    }

    /// Sample period of a clock running at this frequency.
    #[must_use]
    pub fn period(self) -> Time {
        Time::new(1e9 / self.value()).expect("Frequency should be non-zero")
    }

    /// Number of samples of a clock at this frequency that fit in `time`.
    #[must_use]
    pub fn samples_in(self, time: Time) -> f64 {
        self.ghz() * time.ns()
    }

    /// Splits `self` into the nearest multiple of `step` and the leftover.
    #[must_use]
    pub fn approximate_by_step(self, step: Self) -> (Self, Self) {
        let approx = step * (self / step).round();
        (approx, self - approx)
    }
}

impl Phase {
    #[must_use]
    pub fn radians(self) -> f64 {
        self.value() * std::f64::consts::TAU
    }

    #[must_use]
    pub fn phasor(self) -> Complex64 {
        Complex64::from_polar(1.0, self.radians())
    }
}

impl Mul<Time> for Frequency {
    type Output = Phase;

    fn mul(self, rhs: Time) -> Self::Output {
        Phase::new(self.ghz() * rhs.ns()).expect("Should be a valid phase value")
    }
}

impl Mul<Frequency> for Time {
    type Output = Phase;

    fn mul(self, rhs: Frequency) -> Self::Output {
        rhs * self
    }
}

macro_rules! impl_id {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Arc<str>);

        impl $t {
            pub fn new(name: impl Into<Arc<str>>) -> Self {
                Self(name.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl Borrow<str> for $t {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $t {
            fn from(name: &str) -> Self {
                Self::new(name)
            }
        }

        impl From<String> for $t {
            fn from(name: String) -> Self {
                Self::new(name)
            }
        }
    };
}

impl_id!(
    /// Logical sequence channel, e.g. `Q0_qubit`.
    ChannelId
);
impl_id!(
    /// Parameter-sharing group of sequence channels, usually one qubit.
    GroupId
);
impl_id!(ShapeId);
impl_id!(PulseId);
impl_id!(
    /// Instrument box name used by the wiring table.
    DeviceId
);

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn frequency_times_time() {
        let f = Frequency::from_mhz(125.0).unwrap();
        let t = Time::from_ns(8.0).unwrap();
        assert_approx_eq!(f64, (f * t).value(), 1.0);
        assert_approx_eq!(f64, f.period().ns(), 8.0);
    }

    #[test]
    fn approximate_by_step() {
        let step = Frequency::from_mhz(12000.0 / 512.0).unwrap();
        let f = Frequency::from_ghz(2.9).unwrap();
        let (approx, residual) = f.approximate_by_step(step);
        assert_approx_eq!(f64, (approx / step).fract(), 0.0);
        assert!(residual.abs() <= step / 2.0);
        assert_approx_eq!(f64, (approx + residual).hz(), f.hz(), epsilon = 1e-3);
    }

    #[test]
    fn time_rounding() {
        let step = Time::from_ns(128.0).unwrap();
        let t = Time::from_ns(300.0).unwrap();
        assert_eq!(t.ceil_to(step), Time::from_ns(384.0).unwrap());
        assert_eq!(t.floor_to(step), Time::from_ns(256.0).unwrap());
        assert_eq!(t.round_to(step), Time::from_ns(256.0).unwrap());
    }

    #[test]
    fn nan_rejected() {
        assert!(Time::new(f64::NAN).is_err());
        assert!(serde_json::from_str::<Frequency>("1e9").is_ok());
    }

    #[test]
    fn id_lookup_by_str() {
        let mut map = hashbrown::HashMap::new();
        map.insert(ChannelId::from("Q0_qubit"), 1);
        assert_eq!(map.get("Q0_qubit"), Some(&1));
    }
}
