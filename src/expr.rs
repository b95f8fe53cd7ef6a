//! Minimal symbolic expressions over complex numbers.
//!
//! An [`Expr`] is an immutable tree of constants, named variables, arithmetic,
//! a handful of elementary functions and two-way piecewise branches. It only
//! supports what analytic pulse templates need: listing free variables,
//! substituting named values and evaluating to a number.
//!
//! Constructors fold constant subtrees, so substituting every variable but the
//! time leaves a tree whose time-independent parts are already evaluated.
mod lexer;
mod parser;

use std::{
    collections::BTreeSet,
    fmt,
    ops::{Add, Div, Mul, Neg, Sub},
    str::FromStr,
    sync::Arc,
};

use num::complex::Complex64;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unbound variable: {0}")]
    Unbound(String),
    #[error("Parse error at {position}: {message}")]
    Parse { position: usize, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Complex64),
    Var(Arc<str>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `then` where the condition holds, `otherwise` elsewhere.
    Piecewise(Box<Cond>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
}

/// Branch condition. Comparisons look at real parts only.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Cond>, Box<Cond>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    pub fn var(name: impl Into<Arc<str>>) -> Self {
        Self::Var(name.into())
    }

    #[must_use]
    pub fn constant(value: impl Into<Complex64>) -> Self {
        Self::Const(value.into())
    }

    #[must_use]
    pub fn unary(op: UnaryOp, arg: Self) -> Self {
        match arg {
            Self::Const(a) => Self::Const(op.apply(a)),
            arg => Self::Unary(op, Box::new(arg)),
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        match (lhs, rhs) {
            (Self::Const(a), Self::Const(b)) => Self::Const(op.apply(a, b)),
            (lhs, rhs) => Self::Binary(op, Box::new(lhs), Box::new(rhs)),
        }
    }

    #[must_use]
    pub fn piecewise(cond: Cond, then: Self, otherwise: Self) -> Self {
        match cond.constant_value() {
            Some(true) => then,
            Some(false) => otherwise,
            None => Self::Piecewise(Box::new(cond), Box::new(then), Box::new(otherwise)),
        }
    }

    #[must_use]
    pub fn pow(self, exponent: Self) -> Self {
        Self::binary(BinaryOp::Pow, self, exponent)
    }

    #[must_use]
    pub fn exp(self) -> Self {
        Self::unary(UnaryOp::Exp, self)
    }

    #[must_use]
    pub fn cos(self) -> Self {
        Self::unary(UnaryOp::Cos, self)
    }

    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::binary(BinaryOp::Min, self, other)
    }

    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::binary(BinaryOp::Max, self, other)
    }

    #[must_use]
    pub const fn as_const(&self) -> Option<Complex64> {
        match self {
            Self::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Names of all variables in the tree, sorted.
    #[must_use]
    pub fn free_variables(&self) -> BTreeSet<&str> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables<'a>(&'a self, vars: &mut BTreeSet<&'a str>) {
        match self {
            Self::Const(_) => {}
            Self::Var(name) => {
                vars.insert(name);
            }
            Self::Unary(_, arg) => arg.collect_variables(vars),
            Self::Binary(_, lhs, rhs) => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars);
            }
            Self::Piecewise(cond, then, otherwise) => {
                cond.collect_variables(vars);
                then.collect_variables(vars);
                otherwise.collect_variables(vars);
            }
        }
    }

    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.free_variables().contains(name)
    }

    /// Replaces every variable for which `lookup` returns a value.
    ///
    /// Variables without a value stay free.
    #[must_use]
    pub fn substitute<F>(&self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<Complex64>,
    {
        match self {
            Self::Const(v) => Self::Const(*v),
            Self::Var(name) => lookup(name).map_or_else(|| self.clone(), Self::Const),
            Self::Unary(op, arg) => Self::unary(*op, arg.substitute(lookup)),
            Self::Binary(op, lhs, rhs) => {
                Self::binary(*op, lhs.substitute(lookup), rhs.substitute(lookup))
            }
            Self::Piecewise(cond, then, otherwise) => Self::piecewise(
                cond.substitute(lookup),
                then.substitute(lookup),
                otherwise.substitute(lookup),
            ),
        }
    }

    /// Evaluates the tree, failing on the first variable `lookup` cannot bind.
    pub fn eval<F>(&self, lookup: &F) -> Result<Complex64>
    where
        F: Fn(&str) -> Option<Complex64>,
    {
        match self {
            Self::Const(v) => Ok(*v),
            Self::Var(name) => lookup(name).ok_or_else(|| Error::Unbound(name.to_string())),
            Self::Unary(op, arg) => Ok(op.apply(arg.eval(lookup)?)),
            Self::Binary(op, lhs, rhs) => Ok(op.apply(lhs.eval(lookup)?, rhs.eval(lookup)?)),
            Self::Piecewise(cond, then, otherwise) => {
                if cond.eval(lookup)? {
                    then.eval(lookup)
                } else {
                    otherwise.eval(lookup)
                }
            }
        }
    }

    /// Evaluates an expression that must not contain any variable.
    pub fn eval_const(&self) -> Result<Complex64> {
        self.eval(&|_| None)
    }

    const fn precedence(&self) -> u8 {
        match self {
            Self::Unary(UnaryOp::Neg, _) => 3,
            Self::Binary(op, _, _) => op.precedence(),
            _ => 5,
        }
    }
}

impl UnaryOp {
    fn apply(self, a: Complex64) -> Complex64 {
        match self {
            Self::Neg => -a,
            Self::Exp => a.exp(),
            Self::Log => a.ln(),
            Self::Sqrt => {
                if a.im == 0.0 && a.re >= 0.0 {
                    Complex64::new(a.re.sqrt(), 0.0)
                } else {
                    a.sqrt()
                }
            }
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Abs => Complex64::new(a.norm(), 0.0),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Abs => "abs",
        }
    }
}

impl BinaryOp {
    fn apply(self, a: Complex64, b: Complex64) -> Complex64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => {
                let real = a.im == 0.0 && b.im == 0.0;
                if real && (a.re >= 0.0 || b.re.fract() == 0.0) {
                    Complex64::new(a.re.powf(b.re), 0.0)
                } else {
                    a.powc(b)
                }
            }
            Self::Min => {
                if b.re < a.re {
                    b
                } else {
                    a
                }
            }
            Self::Max => {
                if b.re > a.re {
                    b
                } else {
                    a
                }
            }
        }
    }

    const fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Pow => 4,
            Self::Min | Self::Max => 5,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl CmpOp {
    fn apply(self, a: Complex64, b: Complex64) -> bool {
        match self {
            Self::Lt => a.re < b.re,
            Self::Le => a.re <= b.re,
            Self::Gt => a.re > b.re,
            Self::Ge => a.re >= b.re,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl Cond {
    #[must_use]
    pub fn compare(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    fn constant_value(&self) -> Option<bool> {
        match self {
            Self::Compare(op, lhs, rhs) => Some(op.apply(lhs.as_const()?, rhs.as_const()?)),
            Self::And(lhs, rhs) => match (lhs.constant_value(), rhs.constant_value()) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
        }
    }

    fn collect_variables<'a>(&'a self, vars: &mut BTreeSet<&'a str>) {
        match self {
            Self::Compare(_, lhs, rhs) => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars);
            }
            Self::And(lhs, rhs) => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars);
            }
        }
    }

    fn substitute<F>(&self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<Complex64>,
    {
        match self {
            Self::Compare(op, lhs, rhs) => {
                Self::compare(*op, lhs.substitute(lookup), rhs.substitute(lookup))
            }
            Self::And(lhs, rhs) => lhs.substitute(lookup).and(rhs.substitute(lookup)),
        }
    }

    fn eval<F>(&self, lookup: &F) -> Result<bool>
    where
        F: Fn(&str) -> Option<Complex64>,
    {
        match self {
            Self::Compare(op, lhs, rhs) => Ok(op.apply(lhs.eval(lookup)?, rhs.eval(lookup)?)),
            Self::And(lhs, rhs) => Ok(lhs.eval(lookup)? && rhs.eval(lookup)?),
        }
    }
}

fn fmt_const(v: Complex64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if v.im == 0.0 {
        if v.re.is_sign_negative() {
            write!(f, "({})", v.re)
        } else {
            write!(f, "{}", v.re)
        }
    } else if v.re == 0.0 {
        write!(f, "({} * I)", v.im)
    } else {
        write!(f, "({} + {} * I)", v.re, v.im)
    }
}

fn fmt_operand(expr: &Expr, wrap: bool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if wrap {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => fmt_const(*v, f),
            Self::Var(name) => write!(f, "{name}"),
            Self::Unary(UnaryOp::Neg, arg) => {
                write!(f, "-")?;
                fmt_operand(arg, arg.precedence() < 3, f)
            }
            Self::Unary(op, arg) => write!(f, "{}({arg})", op.name()),
            Self::Binary(op @ (BinaryOp::Min | BinaryOp::Max), lhs, rhs) => {
                write!(f, "{}({lhs}, {rhs})", op.symbol())
            }
            Self::Binary(BinaryOp::Pow, lhs, rhs) => {
                fmt_operand(lhs, lhs.precedence() < 5, f)?;
                write!(f, " ** ")?;
                fmt_operand(rhs, rhs.precedence() < 3, f)
            }
            Self::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                fmt_operand(lhs, lhs.precedence() < prec, f)?;
                write!(f, " {} ", op.symbol())?;
                fmt_operand(rhs, rhs.precedence() <= prec, f)
            }
            Self::Piecewise(cond, then, otherwise) => {
                write!(f, "if({cond}, {then}, {otherwise})")
            }
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(op, lhs, rhs) => write!(f, "{lhs} {} {rhs}", op.symbol()),
            Self::And(lhs, rhs) => write!(f, "{lhs} && {rhs}"),
        }
    }
}

impl FromStr for Expr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parser::parse(s)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Const(Complex64::new(value, 0.0))
    }
}

impl From<Complex64> for Expr {
    fn from(value: Complex64) -> Self {
        Self::Const(value)
    }
}

macro_rules! impl_expr_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Expr {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self::binary($op, self, rhs)
            }
        }
    };
}

impl_expr_binop!(Add, add, BinaryOp::Add);
impl_expr_binop!(Sub, sub, BinaryOp::Sub);
impl_expr_binop!(Mul, mul, BinaryOp::Mul);
impl_expr_binop!(Div, div, BinaryOp::Div);

impl Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::unary(UnaryOp::Neg, self)
    }
}
