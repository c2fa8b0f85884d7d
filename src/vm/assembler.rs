//! Hand assembly of bytecode functions.
//!
//! Used by embedders without a front end, by the integration tests and by
//! the bench harness. Encoding errors (too many constants, jumps that do not
//! fit in 16 bits) are collected and reported by [`Assembler::finish`].

use super::heap::{GcRef, Heap};
use super::ops::OpCode;
use super::{Chunk, Value};
use crate::compiler::CompileError;

/// A forward jump whose offset has not been patched yet.
///
/// Created by [`Assembler::jump`]; resolve it with [`Assembler::bind`].
#[derive(Debug)]
#[must_use]
pub struct Label {
    /// Position of the two offset bytes.
    offset_pos: usize,
}

/// Builds one function's chunk.
pub struct Assembler {
    chunk: Chunk,
    line: u32,
    errors: Vec<String>,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            line: 1,
            errors: Vec::new(),
        }
    }

    /// Set the source line recorded for subsequently emitted bytes.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Current byte offset; the target for [`Assembler::loop_to`].
    pub fn offset(&self) -> usize {
        self.chunk.len()
    }

    // ── emit helpers ───────────────────────────────────────────────

    pub fn op(&mut self, op: OpCode) -> &mut Self {
        self.chunk.write_op(op, self.line);
        self
    }

    pub fn byte(&mut self, byte: u8) -> &mut Self {
        self.chunk.write(byte, self.line);
        self
    }

    /// An opcode with a single `u8` operand (slot, argument count, ...).
    pub fn op_with(&mut self, op: OpCode, operand: u8) -> &mut Self {
        self.op(op).byte(operand)
    }

    /// Add a constant to the pool and return its index.
    pub fn add_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk.add_constant(value);
        match u8::try_from(index) {
            Ok(index) => index,
            Err(_) => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    /// `OP_CONSTANT` pushing `value`.
    pub fn constant(&mut self, value: Value) -> &mut Self {
        let index = self.add_constant(value);
        self.op_with(OpCode::Constant, index)
    }

    pub fn number(&mut self, n: f64) -> &mut Self {
        self.constant(Value::Number(n))
    }

    /// `OP_CONSTANT` pushing an interned string.
    pub fn string(&mut self, heap: &mut Heap, s: &str) -> &mut Self {
        let r = heap.intern(s);
        self.constant(Value::Obj(r))
    }

    /// An opcode whose operand names a string constant: globals, properties,
    /// `OP_CLASS`, `OP_METHOD`, `OP_ENUM`, `OP_SET_ENUM_VALUE`, `OP_GET_SUPER`.
    pub fn named(&mut self, op: OpCode, heap: &mut Heap, name: &str) -> &mut Self {
        let r = heap.intern(name);
        let index = self.add_constant(Value::Obj(r));
        self.op_with(op, index)
    }

    /// `OP_INVOKE` / `OP_SUPER_INVOKE` with a method name and argument count.
    pub fn invoke(&mut self, op: OpCode, heap: &mut Heap, name: &str, argc: u8) -> &mut Self {
        self.named(op, heap, name).byte(argc)
    }

    /// `OP_CLOSURE` over `function`. Each capture is `(is_local, index)`.
    pub fn closure(&mut self, function: GcRef, captures: &[(bool, u8)]) -> &mut Self {
        let index = self.add_constant(Value::Obj(function));
        self.op_with(OpCode::Closure, index);
        for &(is_local, slot) in captures {
            self.byte(is_local as u8).byte(slot);
        }
        self
    }

    // ── control flow ───────────────────────────────────────────────

    /// Emit `OP_JUMP` or `OP_JUMP_IF_FALSE` with a placeholder offset.
    pub fn jump(&mut self, op: OpCode) -> Label {
        self.op(op);
        let offset_pos = self.offset();
        self.byte(0xff).byte(0xff);
        Label { offset_pos }
    }

    /// Point a forward jump at the current position.
    pub fn bind(&mut self, label: Label) {
        let jump = self.offset() - label.offset_pos - 2;
        match u16::try_from(jump) {
            Ok(jump) => {
                let [hi, lo] = jump.to_be_bytes();
                self.chunk.code[label.offset_pos] = hi;
                self.chunk.code[label.offset_pos + 1] = lo;
            }
            Err(_) => self.error("Too much code to jump over."),
        }
    }

    /// Emit `OP_LOOP` back to `target`.
    pub fn loop_to(&mut self, target: usize) -> &mut Self {
        self.op(OpCode::Loop);
        let back = self.offset() + 2 - target;
        let back = match u16::try_from(back) {
            Ok(back) => back,
            Err(_) => {
                self.error("Loop body too large.");
                0
            }
        };
        let [hi, lo] = back.to_be_bytes();
        self.byte(hi).byte(lo)
    }

    fn error(&mut self, message: &str) {
        self.errors
            .push(format!("[line {}] Error: {}", self.line, message));
    }

    /// The chunk built so far, unless an encoding error occurred.
    pub fn into_chunk(self) -> Result<Chunk, CompileError> {
        if self.errors.is_empty() {
            Ok(self.chunk)
        } else {
            Err(CompileError {
                messages: self.errors,
            })
        }
    }

    /// Allocate the function object. `name` is `None` for the top-level
    /// script.
    pub fn finish(
        self,
        heap: &mut Heap,
        name: Option<&str>,
        arity: usize,
        upvalue_count: usize,
    ) -> Result<GcRef, CompileError> {
        let chunk = self.into_chunk()?;
        Ok(heap.alloc_function(name, arity, upvalue_count, chunk))
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_jump_is_patched_big_endian() {
        let mut asm = Assembler::new();
        let label = asm.jump(OpCode::JumpIfFalse);
        asm.op(OpCode::Pop).op(OpCode::Nil).op(OpCode::Pop);
        asm.bind(label);
        let chunk = asm.into_chunk().unwrap();
        assert_eq!(
            chunk.code,
            vec![OpCode::JumpIfFalse as u8, 0, 3, 4, 1, 4]
        );
    }

    #[test]
    fn test_loop_offset_lands_on_target() {
        let mut asm = Assembler::new();
        asm.op(OpCode::Nil);
        let start = asm.offset();
        asm.op(OpCode::Pop);
        asm.loop_to(start);
        let chunk = asm.into_chunk().unwrap();
        // After reading the operand, ip is 5; 5 - 4 = 1.
        assert_eq!(&chunk.code[2..], &[OpCode::Loop as u8, 0, 4]);
    }

    #[test]
    fn test_constant_overflow_is_reported() {
        let mut asm = Assembler::new();
        for i in 0..257 {
            asm.number(i as f64);
        }
        let err = asm.into_chunk().unwrap_err();
        assert_eq!(
            err.messages,
            vec!["[line 1] Error: Too many constants in one chunk.".to_string()]
        );
    }

    #[test]
    fn test_lines_follow_line_setting() {
        let mut asm = Assembler::new();
        asm.line(3).op(OpCode::Nil);
        asm.line(4).op(OpCode::Return);
        let chunk = asm.into_chunk().unwrap();
        assert_eq!(chunk.lines, vec![3, 4]);
    }

    #[test]
    fn test_finish_allocates_named_function() {
        let mut heap = Heap::new();
        let mut asm = Assembler::new();
        asm.op(OpCode::Nil).op(OpCode::Return);
        let f = asm.finish(&mut heap, Some("f"), 2, 0).unwrap();
        let function = heap.get(f).and_then(|o| o.as_function()).unwrap();
        assert_eq!(function.arity, 2);
        assert_eq!(heap.string(function.name.unwrap()), Some("f"));
    }
}
