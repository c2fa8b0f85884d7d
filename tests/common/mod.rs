//! Shared test helpers for kiln integration tests.
//!
//! # Usage
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! Programs are assembled by hand: `Harness::run` hands the builder an
//! [`Assembler`] for the top-level script plus the VM heap, appends the
//! implicit `nil; return`, and runs it with captured output and errors.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

pub use kiln::vm::assembler::Assembler;
pub use kiln::{GcRef, Heap, OpCode, RuntimeError, VM, Value, VmConfig, VmError};

/// A `Write` sink whose contents stay readable after the VM takes ownership
/// of a clone.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A VM with captured output and error streams.
pub struct Harness {
    pub vm: VM,
    out: SharedBuffer,
    err: SharedBuffer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        init_logging();
        let out = SharedBuffer::default();
        let err = SharedBuffer::default();
        let mut vm = VM::with_config(config);
        vm.set_output(Box::new(out.clone()));
        vm.set_error_output(Box::new(err.clone()));
        Self { vm, out, err }
    }

    /// Assemble a top-level script and run it.
    pub fn run(
        &mut self,
        build: impl FnOnce(&mut Assembler, &mut Heap),
    ) -> Result<(), RuntimeError> {
        let script = self.script(build);
        self.vm.run_function(script)
    }

    /// Assemble a top-level script without running it.
    pub fn script(&mut self, build: impl FnOnce(&mut Assembler, &mut Heap)) -> GcRef {
        let heap = self.vm.heap_mut();
        let mut asm = Assembler::new();
        build(&mut asm, &mut *heap);
        asm.op(OpCode::Nil).op(OpCode::Return);
        asm.finish(heap, None, 0, 0).expect("script assembles")
    }

    pub fn output(&self) -> String {
        self.out.contents()
    }

    pub fn errors(&self) -> String {
        self.err.contents()
    }

    pub fn clear(&self) {
        self.out.clear();
        self.err.clear();
    }
}

/// Assemble a named function. The body must end with its own `RETURN`.
pub fn function(
    heap: &mut Heap,
    name: &str,
    arity: usize,
    upvalue_count: usize,
    build: impl FnOnce(&mut Assembler, &mut Heap),
) -> GcRef {
    let mut asm = Assembler::new();
    build(&mut asm, &mut *heap);
    asm.finish(heap, Some(name), arity, upvalue_count)
        .expect("function assembles")
}

/// A zero-arity function that prints `text` and returns nil.
pub fn printer(heap: &mut Heap, name: &str, text: &str) -> GcRef {
    function(heap, name, 0, 0, |asm, heap| {
        asm.string(heap, text)
            .op(OpCode::Print)
            .op(OpCode::Nil)
            .op(OpCode::Return);
    })
}

/// `counter = 0; while (counter < limit) { body; counter = counter + 1; }`
/// using a global counter.
pub fn counted_loop(
    asm: &mut Assembler,
    heap: &mut Heap,
    counter: &str,
    limit: f64,
    body: impl FnOnce(&mut Assembler, &mut Heap),
) {
    asm.number(0.0).named(OpCode::DefineGlobal, heap, counter);
    let start = asm.offset();
    asm.named(OpCode::GetGlobal, heap, counter)
        .number(limit)
        .op(OpCode::Less);
    let exit = asm.jump(OpCode::JumpIfFalse);
    asm.op(OpCode::Pop);
    body(&mut *asm, &mut *heap);
    asm.named(OpCode::GetGlobal, heap, counter)
        .number(1.0)
        .op(OpCode::Add)
        .named(OpCode::SetGlobal, heap, counter)
        .op(OpCode::Pop);
    asm.loop_to(start);
    asm.bind(exit);
    asm.op(OpCode::Pop);
}

/// Push a list literal of numbers.
pub fn number_list(asm: &mut Assembler, values: &[f64]) {
    asm.op(OpCode::NewList);
    for &v in values {
        asm.number(v).op(OpCode::AddList);
    }
}
