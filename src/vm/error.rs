//! Runtime and interpretation errors.

use std::fmt;

use thiserror::Error;

use crate::compiler::CompileError;

/// What went wrong while executing an instruction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be two numbers or two strings.")]
    InvalidAddOperands,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("'{enum_name}' enum has no property '{name}'.")]
    UndefinedEnumVariable { enum_name: String, name: String },
    #[error("Only instances have properties.")]
    OnlyInstancesHaveProperties,
    #[error("Only instances have fields.")]
    OnlyInstancesHaveFields,
    #[error("Only instances have methods.")]
    OnlyInstancesHaveMethods,
    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: usize, got: usize },
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Superclass must be a class.")]
    SuperclassMustBeClass,
    #[error("Cannot unpack a value which is not of type list.")]
    UnpackNonList,
    #[error("Too many values to unpack.")]
    TooManyValuesToUnpack,
    #[error("Not enough values to unpack.")]
    NotEnoughValuesToUnpack,
    #[error("'{0}' is not subscriptable")]
    NotSubscriptable(String),
    #[error("'{0}' does not support item assignment")]
    NotAssignable(String),
    #[error("List index must be an integer value.")]
    ListIndexNotInteger,
    #[error("List index out of range.")]
    ListIndexOutOfRange,
    #[error("Type of Dictionary key must be immutable.")]
    InvalidDictKey,
    #[error("Key '{0}' does not exist inside dictionary.")]
    MissingDictKey(String),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),
    #[error("internal error: {0}")]
    Internal(&'static str),
    #[error("output error: {0}")]
    Output(String),
}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        VmError::Output(err.to_string())
    }
}

/// One line of a runtime stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub line: u32,
    /// `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// A runtime error together with the call stack at the point it was raised,
/// innermost frame first.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub error: VmError,
    pub trace: Vec<TraceEntry>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for entry in &self.trace {
            write!(f, "\n{}", entry)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of [`VM::interpret`](crate::vm::VM::interpret).
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
