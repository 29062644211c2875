use crate::number::Number;
use std::ops::Sub;

impl Sub for &Number {
    type Output = Number;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        match (*self, *rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_sub(b) {
                Some(i) => Number::Int(i),
                None => Number::Float(a as f64 - b as f64),
            },
            (a, b) => Number::Float(a.to_float() - b.to_float()),
        }
    }
}
