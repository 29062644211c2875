use std::any::Any;
use std::fmt::{Debug, Display};

/// Host handles carried through the VM as values (channels, futures).
pub trait VMObject: Any + Debug + Display + Send + Sync {
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}
