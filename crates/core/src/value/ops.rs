use crate::{BinaryOperation, MathContext, UnaryOperation, VMError, Value};
use std::cmp::Ordering;

impl Value {
    pub fn binary(
        &self,
        op: BinaryOperation,
        rhs: &Value,
        context: &MathContext,
    ) -> Result<Value, VMError> {
        let v = match op {
            BinaryOperation::Add => return self.add(rhs, context),
            BinaryOperation::Sub => self.arithmetic(op, rhs, |a, b| Ok(&a - &b))?,
            BinaryOperation::Mul => self.arithmetic(op, rhs, |a, b| Ok(&a * &b))?,
            BinaryOperation::Div => self.arithmetic(op, rhs, |a, b| a.checked_div(b))?,
            BinaryOperation::Rem => self.arithmetic(op, rhs, |a, b| a.checked_rem(b))?,
            BinaryOperation::Eq => return Ok(Value::Bool(self == rhs)),
            BinaryOperation::Neq => return Ok(Value::Bool(self != rhs)),
            BinaryOperation::Lt => return self.compare(op, rhs, Ordering::is_lt),
            BinaryOperation::Lte => return self.compare(op, rhs, Ordering::is_le),
            BinaryOperation::Gt => return self.compare(op, rhs, Ordering::is_gt),
            BinaryOperation::Gte => return self.compare(op, rhs, Ordering::is_ge),
            BinaryOperation::And => return Ok(Value::Bool(self.is_truthy() && rhs.is_truthy())),
            BinaryOperation::Or => return Ok(Value::Bool(self.is_truthy() || rhs.is_truthy())),
        };
        Ok(Value::Number(context.apply(v)))
    }

    pub fn unary(&self, op: UnaryOperation, context: &MathContext) -> Result<Value, VMError> {
        match op {
            UnaryOperation::Not => Ok(Value::Bool(!self.is_truthy())),
            UnaryOperation::Neg => {
                let n = self.numeric(op)?;
                let zero = crate::Number::zero();
                Ok(Value::Number(context.apply(&zero - &n)))
            }
        }
    }

    fn add(&self, rhs: &Value, context: &MathContext) -> Result<Value, VMError> {
        match (self, rhs) {
            (Value::String(a), b) => Ok(Value::String(format!("{a}{b}"))),
            (a, Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut l = a.clone();
                l.extend(b.iter().cloned());
                Ok(Value::List(l))
            }
            _ => {
                let v = self.arithmetic(BinaryOperation::Add, rhs, |a, b| Ok(&a + &b))?;
                Ok(Value::Number(context.apply(v)))
            }
        }
    }

    fn arithmetic<F>(
        &self,
        op: BinaryOperation,
        rhs: &Value,
        apply: F,
    ) -> Result<crate::Number, VMError>
    where
        F: FnOnce(crate::Number, crate::Number) -> Result<crate::Number, VMError>,
    {
        let a = self.numeric(op)?;
        let b = rhs.numeric(op)?;
        apply(a, b)
    }

    fn numeric<T: std::fmt::Display>(&self, op: T) -> Result<crate::Number, VMError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(crate::Number::Int(*b as i64)),
            v => Err(VMError::UnsupportedOperation(format!(
                "Cannot apply {op} to {}",
                v.type_name()
            ))),
        }
    }

    fn compare(
        &self,
        op: BinaryOperation,
        rhs: &Value,
        check: fn(Ordering) -> bool,
    ) -> Result<Value, VMError> {
        let ordering = match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (a, b) => {
                return Err(VMError::UnsupportedOperation(format!(
                    "Cannot compare {} {op} {}",
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
        Ok(Value::Bool(ordering.is_some_and(check)))
    }
}
