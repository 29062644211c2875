mod ops;

use crate::{impl_from, Number, VMError, VMObject};
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    /// Yielded by every read of a closed channel
    EndOfStream,
    Object(Arc<dyn VMObject>),
}

impl_from! {
    Value {
        bool => Value::Bool;
        String => Value::String;
        Vec<Value> => Value::List;
    }
}

impl From<&'_ str> for Value {
    #[inline]
    fn from(value: &'_ str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T: Into<Number>> From<T> for Value {
    #[inline]
    fn from(value: T) -> Self {
        Value::Number(value.into())
    }
}

impl From<()> for Value {
    #[inline]
    fn from(_value: ()) -> Self {
        Value::None
    }
}

#[inline]
fn object_address(o: &Arc<dyn VMObject>) -> *const () {
    Arc::as_ptr(o) as *const ()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::EndOfStream, Value::EndOfStream) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => object_address(a) == object_address(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::None | Value::EndOfStream => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => n.hash(state),
            Value::String(s) => s.hash(state),
            Value::List(l) => l.hash(state),
            Value::Object(o) => object_address(o).hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(l) => write!(f, "[{}]", l.iter().join(", ")),
            Value::EndOfStream => write!(f, "<end of stream>"),
            Value::Object(o) => write!(f, "{o}"),
        }
    }
}

impl Value {
    pub fn object<T: VMObject>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::EndOfStream => "EndOfStream",
            Value::Object(o) => o.type_name(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None | Value::EndOfStream => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> Result<Number, VMError> {
        match self {
            Value::None => Ok(Number::zero()),
            Value::Bool(b) => Ok(Number::Int(*b as i64)),
            Value::Number(n) => Ok(*n),
            Value::String(s) => s.parse().map_err(|e| {
                VMError::ConversionError(format!("Cannot convert {s} to Number: {e}"))
            }),
            v => Err(VMError::ConversionError(format!(
                "Cannot convert {} to Number",
                v.type_name()
            ))),
        }
    }

    /// Borrows the host object inside this value when it has type `T`.
    pub fn downcast<T: VMObject>(&self) -> Option<&T> {
        match self {
            Value::Object(o) => o.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use wasm_bindgen_test::*;

    #[derive(Debug)]
    struct Handle(usize);

    impl Display for Handle {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "Handle({})", self.0)
        }
    }

    impl VMObject for Handle {
        fn type_name(&self) -> &'static str {
            "Handle"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn objects_compare_by_identity() {
        let a = Value::object(Handle(1));
        let b = Value::object(Handle(1));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.downcast::<Handle>().map(|h| h.0), Some(1));
        assert_eq!(a.to_string(), "Handle(1)");
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::EndOfStream.is_truthy());
        assert!(Value::from(1).is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(Value::from("a").is_truthy());
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn list_display() {
        let v: Value = vec![Value::from(1), Value::from("a"), Value::None].into();
        assert_eq!(v.to_string(), "[1, a, none]");
    }
}
