mod error;
mod macros;
mod number;
mod object;
mod operations;
mod reference;
mod value;

pub use error::{SourceLocation, TraceFrame, VMError};
pub use number::{MathContext, Number};
pub use object::VMObject;
pub use operations::{BinaryOperation, UnaryOperation};
pub use reference::MutableReference;
pub use value::Value;
