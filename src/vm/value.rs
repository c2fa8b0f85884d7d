use std::fmt;

use super::heap::{GcRef, Heap};
use super::object::HeapObject;

// Boxed bit patterns used to hash non-object values. These mirror a NaN-boxed
// layout so that nil, true and false never collide with a real number.
const QNAN: u64 = 0x7ffc_0000_0000_0000;
const TAG_NIL: u64 = 1;
const TAG_FALSE: u64 = 2;
const TAG_TRUE: u64 = 3;

/// A dynamically typed value.
///
/// - Nil: the absent value
/// - Bool: true/false
/// - Number: 64-bit IEEE 754 double
/// - Obj: handle to a heap object (string, list, closure, ...)
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Obj(GcRef),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<GcRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }

    /// The 64-bit pattern hashed for scalar keys. `None` for objects.
    ///
    /// `-0.0` is folded onto `0.0` since the two compare equal.
    pub fn boxed_bits(&self) -> Option<u64> {
        match self {
            Value::Nil => Some(QNAN | TAG_NIL),
            Value::Bool(false) => Some(QNAN | TAG_FALSE),
            Value::Bool(true) => Some(QNAN | TAG_TRUE),
            Value::Number(n) if *n == 0.0 => Some(0.0f64.to_bits()),
            Value::Number(n) => Some(n.to_bits()),
            Value::Obj(_) => None,
        }
    }

    /// Falsiness: nil, false, 0, and empty strings, lists and dicts.
    /// Every other object is truthy.
    pub fn is_falsey(&self, heap: &Heap) -> bool {
        match self {
            Value::Nil => true,
            Value::Bool(b) => !b,
            Value::Number(n) => *n == 0.0,
            Value::Obj(r) => match heap.get(*r) {
                Some(HeapObject::String(s)) => s.chars.is_empty(),
                Some(HeapObject::List(l)) => l.values.is_empty(),
                Some(HeapObject::Dict(d)) => d.is_empty(),
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Obj(r) => write!(f, "Obj({:?})", r),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<GcRef> for Value {
    fn from(r: GcRef) -> Self {
        Value::Obj(r)
    }
}
