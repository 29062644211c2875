mod add;
mod div;
mod mul;
mod rem;
mod sub;

use crate::impl_from;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl_from! {
    Number {
        i64 => Number::Int;
        f64 => Number::Float;
        i32 as i64 => Number::Int;
        u32 as i64 => Number::Int;
        f32 as f64 => Number::Float;
    }
}

// Equal numbers must hash equally, 2 == 2.0
impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match *self {
            Number::Int(i) => i.hash(state),
            Number::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (f as i64).hash(state)
            }
            Number::Float(f) => f.to_bits().hash(state),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Eq for Number {}

impl PartialEq for Number {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (&Number::Int(a), &Number::Int(b)) => a == b,
            (&Number::Float(a), &Number::Float(b)) => a == b,
            (&Number::Int(a), &Number::Float(b)) => a as f64 == b,
            (&Number::Float(a), &Number::Int(b)) => a == b as f64,
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            (Number::Float(a), Number::Float(b)) => a.partial_cmp(b),
            (Number::Int(a), Number::Float(b)) => (*a as f64).partial_cmp(b),
            (Number::Float(a), Number::Int(b)) => a.partial_cmp(&(*b as f64)),
        }
    }
}

impl FromStr for Number {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.replace('_', "");
        if s.contains('.') {
            s.parse::<f64>().map(Number::Float).map_err(|e| e.to_string())
        } else {
            s.parse::<i64>().map(Number::Int).map_err(|e| e.to_string())
        }
    }
}

impl Number {
    #[inline]
    pub fn zero() -> Number {
        Number::Int(0)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    #[inline]
    pub fn to_float(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    #[inline]
    pub fn to_int(self) -> i64 {
        match self {
            Number::Int(i) => i,
            Number::Float(f) => f as i64,
        }
    }

    /// Rounds floats to `digits` significant digits, integers are exact and left alone.
    pub fn round_to_precision(self, digits: u32) -> Number {
        let Number::Float(f) = self else {
            return self;
        };
        if f == 0.0 || !f.is_finite() || digits == 0 {
            return self;
        }
        let magnitude = f.abs().log10().floor() as i32;
        let shift = digits as i32 - 1 - magnitude;
        let factor = 10f64.powi(shift);
        Number::Float((f * factor).round() / factor)
    }
}

/// Numeric precision applied to results produced by arithmetic instructions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MathContext {
    pub precision: Option<u32>,
}

impl MathContext {
    pub const UNLIMITED: MathContext = MathContext { precision: None };

    pub fn new(precision: u32) -> Self {
        MathContext {
            precision: Some(precision),
        }
    }

    #[inline]
    pub fn apply(&self, number: Number) -> Number {
        match self.precision {
            None => number,
            Some(p) => number.round_to_precision(p),
        }
    }
}
