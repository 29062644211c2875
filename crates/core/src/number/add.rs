use crate::number::Number;
use std::ops::Add;

impl Add for &Number {
    type Output = Number;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        match (*self, *rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(i) => Number::Int(i),
                None => Number::Float(a as f64 + b as f64),
            },
            (a, b) => Number::Float(a.to_float() + b.to_float()),
        }
    }
}
