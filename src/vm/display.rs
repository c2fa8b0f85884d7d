//! Printing values the way `print` shows them, and the type names used in
//! error messages.

use std::fmt;

use super::heap::{GcRef, Heap};
use super::object::{HeapObject, ObjectType};
use super::value::Value;

/// Containers nested deeper than this print as `...`, which also stops
/// self-referencing lists from recursing forever.
const MAX_DEPTH: usize = 32;

/// Format a number like C's `printf("%g")`: six significant digits, trailing
/// zeros dropped, scientific notation outside `1e-4 <= |n| < 1e6`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Round to six significant digits first; the exponent of the rounded
    // value picks the notation.
    let sci = format!("{:.5e}", n);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if !(-4..6).contains(&exp) {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (5 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// The type name shown in `'<type>' is not subscriptable` style errors.
/// Instances report their class name.
pub fn type_name(heap: &Heap, value: Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Obj(r) => match heap.get(r) {
            Some(HeapObject::Instance(instance)) => heap
                .get(instance.class)
                .and_then(HeapObject::as_class)
                .and_then(|class| heap.string(class.name))
                .unwrap_or(ObjectType::Instance.name())
                .to_string(),
            Some(object) => object.object_type().name().to_string(),
            None => "unknown".to_string(),
        },
    }
}

/// Display adapter for a value. Resolves object handles through the heap.
///
/// Top-level strings and list elements print raw. Inside a dict, string keys
/// and values are quoted.
pub struct ValueDisplay<'a> {
    heap: &'a Heap,
    value: Value,
    quoted: bool,
    depth: usize,
}

impl<'a> ValueDisplay<'a> {
    pub fn new(heap: &'a Heap, value: Value) -> Self {
        Self {
            heap,
            value,
            quoted: false,
            depth: 0,
        }
    }

    fn nested(&self, value: Value, quoted: bool) -> Self {
        Self {
            heap: self.heap,
            value,
            quoted,
            depth: self.depth + 1,
        }
    }

    fn function_name(&self, function: GcRef) -> Option<&'a str> {
        let function = self.heap.get(function)?.as_function()?;
        self.heap.string(function.name?)
    }

    fn write_function(&self, f: &mut fmt::Formatter<'_>, function: GcRef) -> fmt::Result {
        match self.function_name(function) {
            Some(name) => write!(f, "<fn {}>", name),
            None => write!(f, "<script>"),
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = match self.value {
            Value::Nil => return write!(f, "nil"),
            Value::Bool(b) => return write!(f, "{}", b),
            Value::Number(n) => return write!(f, "{}", format_number(n)),
            Value::Obj(r) => r,
        };
        let Some(object) = self.heap.get(r) else {
            return write!(f, "<freed>");
        };
        let heap = self.heap;

        match object {
            HeapObject::String(s) if self.quoted => write!(f, "\"{}\"", s.chars),
            HeapObject::String(s) => write!(f, "{}", s.chars),
            HeapObject::Function(_) => self.write_function(f, r),
            HeapObject::Closure(c) => self.write_function(f, c.function),
            HeapObject::BoundMethod(b) => {
                match heap.get(b.method).and_then(HeapObject::as_closure) {
                    Some(closure) => self.write_function(f, closure.function),
                    None => write!(f, "<fn>"),
                }
            }
            HeapObject::Class(c) => write!(f, "{}", heap.string(c.name).unwrap_or("")),
            HeapObject::Enum(e) => write!(f, "{}", heap.string(e.name).unwrap_or("")),
            HeapObject::Instance(i) => {
                let name = heap
                    .get(i.class)
                    .and_then(HeapObject::as_class)
                    .and_then(|class| heap.string(class.name))
                    .unwrap_or("");
                write!(f, "{} instance", name)
            }
            HeapObject::Native(_) => write!(f, "<native fn>"),
            HeapObject::Upvalue(_) => write!(f, "upvalue"),
            HeapObject::List(_) | HeapObject::Dict(_) if self.depth >= MAX_DEPTH => {
                write!(f, "...")
            }
            HeapObject::List(list) => {
                write!(f, "[")?;
                for (i, element) in list.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.nested(*element, self.quoted))?;
                }
                write!(f, "]")
            }
            HeapObject::Dict(dict) => {
                write!(f, "{{")?;
                for (i, (key, value)) in dict.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", self.nested(key, true), self.nested(value, true))?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Dict;

    #[test]
    fn test_format_number_matches_printf_g() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(123456.0), "123456");
        assert_eq!(format_number(1234567.0), "1.23457e+06");
        assert_eq!(format_number(1e100), "1e+100");
        assert_eq!(format_number(0.0001), "0.0001");
        assert_eq!(format_number(0.00001), "1e-05");
        assert_eq!(format_number(999999.5), "1e+06");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(f64::INFINITY), "inf");
    }

    #[test]
    fn test_list_prints_strings_raw() {
        let mut heap = Heap::new();
        let s = heap.intern("a");
        let list = heap.alloc_list(vec![Value::Number(1.0), Value::Obj(s), Value::Nil]);
        let shown = ValueDisplay::new(&heap, Value::Obj(list)).to_string();
        assert_eq!(shown, "[1, a, nil]");
    }

    #[test]
    fn test_dict_quotes_strings() {
        let mut heap = Heap::new();
        let k = heap.intern("k");
        let v = heap.intern("v");
        let mut dict = Dict::new();
        let hash = heap.hash_key(Value::Obj(k)).unwrap();
        dict.set(Value::Obj(k), hash, Value::Obj(v));
        let dict = heap.alloc_dict(dict);
        let shown = ValueDisplay::new(&heap, Value::Obj(dict)).to_string();
        assert_eq!(shown, "{\"k\": \"v\"}");
    }

    #[test]
    fn test_self_referencing_list_terminates() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(Vec::new());
        if let Some(HeapObject::List(l)) = heap.get_mut(list) {
            l.values.push(Value::Obj(list));
        }
        let shown = ValueDisplay::new(&heap, Value::Obj(list)).to_string();
        assert!(shown.ends_with("...]]]"));
    }

    #[test]
    fn test_type_names() {
        let mut heap = Heap::new();
        let name = heap.intern("Point");
        let class = heap.alloc_class(name);
        let instance = heap.alloc_instance(class);
        let list = heap.alloc_list(Vec::new());
        assert_eq!(type_name(&heap, Value::Number(1.0)), "number");
        assert_eq!(type_name(&heap, Value::Obj(class)), "class");
        assert_eq!(type_name(&heap, Value::Obj(instance)), "Point");
        assert_eq!(type_name(&heap, Value::Obj(name)), "string");
        assert_eq!(type_name(&heap, Value::Obj(list)), "list");
    }
}
