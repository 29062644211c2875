use crate::number::Number;
use crate::VMError;

impl Number {
    pub fn checked_rem(self, rhs: Number) -> Result<Number, VMError> {
        match (self, rhs) {
            (Number::Int(_), Number::Int(0)) => Err(VMError::UnsupportedOperation(format!(
                "Cannot take {self} % 0"
            ))),
            (Number::Int(a), Number::Int(b)) => Ok(a
                .checked_rem(b)
                .map_or_else(|| Number::Float(a as f64 % b as f64), Number::Int)),
            (a, b) => Ok(Number::Float(a.to_float() % b.to_float())),
        }
    }
}
