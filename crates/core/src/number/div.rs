use crate::number::Number;
use crate::VMError;

impl Number {
    /// Integer division truncates and overflow promotes to float. Dividing an integer by zero
    /// is an error.
    pub fn checked_div(self, rhs: Number) -> Result<Number, VMError> {
        match (self, rhs) {
            (Number::Int(_), Number::Int(0)) => Err(VMError::UnsupportedOperation(format!(
                "Cannot divide {self} by 0"
            ))),
            (Number::Int(a), Number::Int(b)) => Ok(a
                .checked_div(b)
                .map_or_else(|| Number::Float(a as f64 / b as f64), Number::Int)),
            (a, b) => Ok(Number::Float(a.to_float() / b.to_float())),
        }
    }
}
