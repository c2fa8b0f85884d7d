mod call;
mod dict;
mod display;
mod error;
mod gc;
mod hash;
mod heap;
mod native;
mod object;
mod ops;
mod table;
mod value;
mod vm;
pub mod assembler;

pub use dict::Dict;
pub use display::{ValueDisplay, format_number, type_name};
pub use error::{InterpretError, RuntimeError, TraceEntry, VmError};
pub use gc::GcStats;
pub use hash::{hash_bits, hash_string};
pub use heap::{GcRef, Heap, SweepResult};
pub use native::{NativeFn, clock_native};
pub use object::{
    HeapObject, ObjBoundMethod, ObjClass, ObjClosure, ObjEnum, ObjFunction, ObjInstance, ObjList,
    ObjNative, ObjString, ObjUpvalue, ObjectType, UpvalueState,
};
pub use ops::OpCode;
pub use table::Table;
pub use value::Value;
pub use vm::VM;

/// A compiled chunk of bytecode: the instruction stream, its constant pool
/// and the source line of every byte.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    /// Parallel to `code`.
    pub lines: Vec<u32>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write(op.into(), line);
    }

    /// Append a constant and return its pool index.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Source line of the byte at `offset`, or 0 if out of range.
    pub fn line_at(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_tracks_lines_per_byte() {
        let mut chunk = Chunk::new();
        let index = chunk.add_constant(Value::Number(1.5));
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(index as u8, 1);
        chunk.write_op(OpCode::Return, 2);
        assert_eq!(chunk.code, vec![0, 0, OpCode::Return as u8]);
        assert_eq!(chunk.line_at(1), 1);
        assert_eq!(chunk.line_at(2), 2);
        assert_eq!(chunk.line_at(99), 0);
    }
}
