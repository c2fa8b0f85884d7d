//! Kiln - a stack-based bytecode virtual machine for a small dynamic language
//!
//! This library provides the kiln virtual machine: values and heap objects,
//! closures and classes, lists, dictionaries and enums, and a tracing garbage
//! collector. Source compilation is supplied by the host through the
//! [`Compiler`] trait; [`vm::assembler::Assembler`] builds bytecode by hand.

pub mod compiler;
pub mod config;
pub mod vm;

// Re-export commonly used types
pub use compiler::{CompileError, Compiler};
pub use config::{ConfigError, VmConfig};
pub use vm::{Chunk, GcRef, Heap, InterpretError, OpCode, RuntimeError, VM, Value, VmError};
