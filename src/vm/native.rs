//! Host functions callable from bytecode.

use std::time::{SystemTime, UNIX_EPOCH};

use super::value::Value;

/// Signature of a native function: argument count and the argument window.
pub type NativeFn = fn(usize, &[Value]) -> Value;

/// `clock()`: wall-clock seconds since the Unix epoch.
pub fn clock_native(_arg_count: usize, _args: &[Value]) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Value::Number(seconds)
}
