use crate::VMFuture;
use quill_core::{VMError, Value};
use std::fmt::Display;

/// An operand stack slot, either materialized or waiting on a future.
#[derive(Clone, Debug, PartialEq)]
pub enum StackValue {
    Value(Value),
    Pending(VMFuture),
}

impl<T: Into<Value>> From<T> for StackValue {
    #[inline]
    fn from(value: T) -> Self {
        StackValue::Value(value.into())
    }
}

impl From<VMFuture> for StackValue {
    #[inline]
    fn from(value: VMFuture) -> Self {
        StackValue::Pending(value)
    }
}

#[derive(Debug, Default)]
pub struct VMStack(Vec<StackValue>);

impl VMStack {
    pub fn new(stack: Vec<StackValue>) -> Self {
        VMStack(stack)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn push(&mut self, value: StackValue) {
        self.0.push(value)
    }

    #[inline]
    pub fn pop(&mut self) -> Option<StackValue> {
        self.0.pop()
    }

    pub fn next_value<T: Display>(&mut self, location: T) -> Result<StackValue, VMError> {
        self.pop()
            .ok_or_else(|| VMError::EmptyStack(format!("Stack is empty for {location}")))
    }

    /// Slot `depth` positions below the top, `0` being the top.
    #[inline]
    pub(crate) fn peek_mut(&mut self, depth: usize) -> Option<&mut StackValue> {
        let len = self.0.len();
        if depth >= len {
            return None;
        }
        self.0.get_mut(len - 1 - depth)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }
}
