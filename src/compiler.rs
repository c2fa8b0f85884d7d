//! The seam between source text and the VM.
//!
//! Kiln does not ship a front end. A host plugs one in through [`Compiler`];
//! it must return a top-level function object allocated on the VM's heap.

use thiserror::Error;

use crate::vm::{GcRef, Heap};

/// Compile errors, one message per diagnostic, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .messages.join("\n"))]
pub struct CompileError {
    pub messages: Vec<String>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

/// Turns source text into a top-level function (arity 0, no name).
///
/// The returned handle must be reachable from nothing but the caller; the
/// VM roots it as soon as execution starts. Collection never runs while a
/// compiler holds the heap.
pub trait Compiler {
    fn compile(&mut self, source: &str, heap: &mut Heap) -> Result<GcRef, CompileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_join_lines() {
        let err = CompileError {
            messages: vec![
                "[line 1] Error at 'x': Expect ';'.".to_string(),
                "[line 2] Error at end: Expect '}'.".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "[line 1] Error at 'x': Expect ';'.\n[line 2] Error at end: Expect '}'."
        );
    }
}
