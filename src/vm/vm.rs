use std::io::{self, Write};
use std::rc::Rc;

use crate::compiler::{CompileError, Compiler};
use crate::config::VmConfig;
use crate::vm::display::{ValueDisplay, type_name};
use crate::vm::error::{InterpretError, RuntimeError, TraceEntry, VmError};
use crate::vm::gc::GcStats;
use crate::vm::native::{NativeFn, clock_native};
use crate::vm::object::{HeapObject, ObjClosure, UpvalueState};
use crate::vm::{Chunk, Dict, GcRef, Heap, OpCode, Table, Value};

/// A call frame for the VM.
#[derive(Debug)]
pub(super) struct CallFrame {
    pub(super) closure: GcRef,
    /// Shared with the function object so dispatch never goes through the
    /// heap to fetch the next byte.
    pub(super) chunk: Rc<Chunk>,
    /// Index of the next byte to execute.
    pub(super) ip: usize,
    /// Stack index of slot 0 (the callee or receiver).
    pub(super) slots: usize,
}

enum ControlFlow {
    Continue,
    Halt,
}

/// The kiln virtual machine.
///
/// Each VM owns its stack, frames, heap and globals; separate VMs share
/// nothing.
pub struct VM {
    pub(super) stack: Vec<Value>,
    pub(super) frames: Vec<CallFrame>,
    pub(super) heap: Heap,
    pub(super) globals: Table,
    /// Head of the open upvalue chain, highest stack slot first.
    pub(super) open_upvalues: Option<GcRef>,
    pub(super) init_string: GcRef,
    pub(super) config: VmConfig,
    pub(super) gc_stats: GcStats,
    compiler: Option<Box<dyn Compiler>>,
    /// Output stream for print statements
    output: Box<dyn Write>,
    /// Stream runtime error reports are written to
    errors: Box<dyn Write>,
}

impl VM {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut heap = Heap::with_config(&config);
        let init_string = heap.intern("init");
        let mut vm = Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(config.frames_max),
            heap,
            globals: Table::new(),
            open_upvalues: None,
            init_string,
            config,
            gc_stats: GcStats::default(),
            compiler: None,
            output: Box::new(io::stdout()),
            errors: Box::new(io::stderr()),
        };
        vm.define_native("clock", clock_native);
        vm
    }

    /// Create a VM with a custom output stream.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        let mut vm = Self::new();
        vm.output = output;
        vm
    }

    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    pub fn set_error_output(&mut self, errors: Box<dyn Write>) {
        self.errors = errors;
    }

    pub fn set_compiler(&mut self, compiler: Box<dyn Compiler>) {
        self.compiler = Some(compiler);
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable heap access, for building functions before running them.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        let key = self.heap.find_string(name)?;
        let hash = self.heap.string_hash(key)?;
        self.globals.get(key, hash)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        let key = self.heap.intern(name);
        if let Some(hash) = self.heap.string_hash(key) {
            self.globals.set(key, hash, value);
        }
    }

    /// Bind a host function to a global name.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let native = self.heap.alloc_native(function);
        self.set_global(name, Value::Obj(native));
    }

    /// Compile `source` with the installed compiler and run it.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = match self.compiler.as_mut() {
            Some(compiler) => compiler.compile(source, &mut self.heap)?,
            None => return Err(CompileError::new("no compiler installed").into()),
        };
        self.run_function(function)?;
        Ok(())
    }

    /// Run an already compiled top-level function.
    ///
    /// On a runtime error the report (message, then one trace line per frame,
    /// innermost first) goes to the error stream, the stack is reset and the
    /// VM is ready for the next run.
    pub fn run_function(&mut self, function: GcRef) -> Result<(), RuntimeError> {
        let result = self.start(function).and_then(|()| self.run());
        match result {
            Ok(()) => Ok(()),
            Err(error) => Err(self.report(error)),
        }
    }

    fn start(&mut self, function: GcRef) -> Result<(), VmError> {
        let upvalue_count = self
            .heap
            .get(function)
            .and_then(HeapObject::as_function)
            .map(|f| f.upvalue_count)
            .ok_or(VmError::Internal("top-level value is not a function"))?;
        if upvalue_count != 0 {
            return Err(VmError::Internal("top-level function captures upvalues"));
        }
        let closure = self.heap.alloc(HeapObject::Closure(ObjClosure {
            function,
            upvalues: Vec::new(),
        }));
        self.push(Value::Obj(closure));
        self.call_value(Value::Obj(closure), 0)
    }

    fn report(&mut self, error: VmError) -> RuntimeError {
        let trace: Vec<TraceEntry> = self
            .frames
            .iter()
            .rev()
            .map(|frame| TraceEntry {
                line: frame.chunk.line_at(frame.ip.saturating_sub(1)),
                function: self.function_name(frame.closure),
            })
            .collect();
        let error = RuntimeError { error, trace };

        log::warn!("runtime error: {}", error.error);
        if let Err(e) = writeln!(self.errors, "{}", error) {
            log::error!("failed to write error report: {}", e);
        }
        self.reset_stack();
        error
    }

    fn function_name(&self, closure: GcRef) -> Option<String> {
        let closure = self.heap.get(closure)?.as_closure()?;
        let function = self.heap.get(closure.function)?.as_function()?;
        self.heap.string(function.name?).map(str::to_string)
    }

    fn reset_stack(&mut self) {
        // Closures that escaped the failed run keep the values they saw.
        if let Err(e) = self.close_upvalues(0) {
            log::error!("failed to close upvalues on reset: {}", e);
        }
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
    }

    // ========================================
    // Stack and operand helpers
    // ========================================

    pub(super) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(super) fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub(super) fn peek(&self, distance: usize) -> Result<Value, VmError> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|index| self.stack[index])
            .ok_or(VmError::StackUnderflow)
    }

    /// Overwrite the value `distance` slots below the top.
    pub(super) fn poke(&mut self, distance: usize, value: Value) -> Result<(), VmError> {
        let index = self
            .stack
            .len()
            .checked_sub(distance + 1)
            .ok_or(VmError::StackUnderflow)?;
        self.stack[index] = value;
        Ok(())
    }

    fn frame(&self) -> Result<&CallFrame, VmError> {
        self.frames.last().ok_or(VmError::Internal("no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, VmError> {
        self.frames
            .last_mut()
            .ok_or(VmError::Internal("no active frame"))
    }

    fn read_byte(&mut self) -> Result<u8, VmError> {
        let frame = self.frame_mut()?;
        let byte = *frame
            .chunk
            .code
            .get(frame.ip)
            .ok_or(VmError::Internal("instruction pointer out of range"))?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_short(&mut self) -> Result<u16, VmError> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_constant(&mut self) -> Result<Value, VmError> {
        let index = self.read_byte()? as usize;
        self.frame()?
            .chunk
            .constants
            .get(index)
            .copied()
            .ok_or(VmError::Internal("constant index out of range"))
    }

    fn read_string(&mut self) -> Result<(GcRef, u32), VmError> {
        let constant = self.read_constant()?;
        constant
            .as_obj()
            .and_then(|r| Some((r, self.heap.string_hash(r)?)))
            .ok_or(VmError::Internal("name constant is not a string"))
    }

    pub(super) fn object(&self, r: GcRef) -> Result<&HeapObject, VmError> {
        self.heap
            .get(r)
            .ok_or(VmError::Internal("dangling object handle"))
    }

    pub(super) fn object_mut(&mut self, r: GcRef) -> Result<&mut HeapObject, VmError> {
        self.heap
            .get_mut(r)
            .ok_or(VmError::Internal("dangling object handle"))
    }

    pub(super) fn name(&self, r: GcRef) -> String {
        self.heap.string(r).unwrap_or_default().to_string()
    }

    fn local_index(&mut self) -> Result<usize, VmError> {
        let slot = self.read_byte()? as usize;
        let index = self.frame()?.slots + slot;
        if index >= self.stack.len() {
            return Err(VmError::Internal("local slot out of range"));
        }
        Ok(index)
    }

    fn current_upvalue(&mut self) -> Result<GcRef, VmError> {
        let index = self.read_byte()? as usize;
        let closure = self.frame()?.closure;
        match self.object(closure)? {
            HeapObject::Closure(c) => c
                .upvalues
                .get(index)
                .copied()
                .ok_or(VmError::Internal("upvalue index out of range")),
            _ => Err(VmError::Internal("frame does not hold a closure")),
        }
    }

    fn pop_number_pair(&mut self) -> Result<(f64, f64), VmError> {
        match (self.peek(1)?, self.peek(0)?) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.truncate(self.stack.len() - 2);
                Ok((a, b))
            }
            _ => Err(VmError::OperandsMustBeNumbers),
        }
    }

    // ========================================
    // Dispatch
    // ========================================

    fn run(&mut self) -> Result<(), VmError> {
        loop {
            // Check if GC should run
            if self.heap.should_gc() {
                self.collect_garbage();
            }

            let ip = self.frame()?.ip;
            let op = OpCode::try_from(self.read_byte()?)?;
            if self.config.trace_execution {
                log::trace!("{:04} {:<20} depth={}", ip, op.name(), self.stack.len());
            }

            match self.execute_op(op)? {
                ControlFlow::Continue => {}
                ControlFlow::Halt => return Ok(()),
            }
        }
    }

    fn execute_op(&mut self, op: OpCode) -> Result<ControlFlow, VmError> {
        match op {
            OpCode::Constant => {
                let constant = self.read_constant()?;
                self.push(constant);
            }
            OpCode::Nil => self.push(Value::Nil),
            OpCode::True => self.push(Value::Bool(true)),
            OpCode::False => self.push(Value::Bool(false)),
            OpCode::Pop => {
                self.pop()?;
            }

            OpCode::GetLocal => {
                let index = self.local_index()?;
                let value = self.stack[index];
                self.push(value);
            }
            OpCode::SetLocal => {
                let index = self.local_index()?;
                let value = self.peek(0)?;
                self.stack[index] = value;
            }
            OpCode::GetGlobal => {
                let (name, hash) = self.read_string()?;
                let value = self
                    .globals
                    .get(name, hash)
                    .ok_or_else(|| VmError::UndefinedVariable(self.name(name)))?;
                self.push(value);
            }
            OpCode::DefineGlobal => {
                let (name, hash) = self.read_string()?;
                let value = self.peek(0)?;
                self.globals.set(name, hash, value);
                self.pop()?;
            }
            OpCode::SetGlobal => {
                let (name, hash) = self.read_string()?;
                let value = self.peek(0)?;
                if self.globals.set(name, hash, value) {
                    self.globals.delete(name, hash);
                    return Err(VmError::UndefinedVariable(self.name(name)));
                }
            }
            OpCode::GetUpvalue => {
                let upvalue = self.current_upvalue()?;
                let value = match self.upvalue_state(upvalue)? {
                    UpvalueState::Open(slot) => *self
                        .stack
                        .get(slot)
                        .ok_or(VmError::Internal("open upvalue past stack top"))?,
                    UpvalueState::Closed(value) => value,
                };
                self.push(value);
            }
            OpCode::SetUpvalue => {
                let upvalue = self.current_upvalue()?;
                let value = self.peek(0)?;
                match self.upvalue_state(upvalue)? {
                    UpvalueState::Open(slot) => {
                        let cell = self
                            .stack
                            .get_mut(slot)
                            .ok_or(VmError::Internal("open upvalue past stack top"))?;
                        *cell = value;
                    }
                    UpvalueState::Closed(_) => {
                        self.set_upvalue_state(upvalue, UpvalueState::Closed(value))?;
                    }
                }
            }

            OpCode::GetProperty => self.get_property()?,
            OpCode::SetProperty => {
                let (name, hash) = self.read_string()?;
                let target = self.peek(1)?;
                let value = self.peek(0)?;
                let fields = match target {
                    Value::Obj(r) => match self.object_mut(r)? {
                        HeapObject::Instance(instance) => &mut instance.fields,
                        _ => return Err(VmError::OnlyInstancesHaveFields),
                    },
                    _ => return Err(VmError::OnlyInstancesHaveFields),
                };
                fields.set(name, hash, value);
                self.pop()?;
                self.pop()?;
                self.push(value);
            }
            OpCode::GetSuper => {
                let (name, hash) = self.read_string()?;
                let superclass = self.pop_class()?;
                self.bind_method(superclass, name, hash)?;
            }

            OpCode::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a == b));
            }
            OpCode::Greater => {
                let (a, b) = self.pop_number_pair()?;
                self.push(Value::Bool(a > b));
            }
            OpCode::Less => {
                let (a, b) = self.pop_number_pair()?;
                self.push(Value::Bool(a < b));
            }
            OpCode::Add => self.add()?,
            OpCode::Subtract => {
                let (a, b) = self.pop_number_pair()?;
                self.push(Value::Number(a - b));
            }
            OpCode::Multiply => {
                let (a, b) = self.pop_number_pair()?;
                self.push(Value::Number(a * b));
            }
            OpCode::Divide => {
                let (a, b) = self.pop_number_pair()?;
                self.push(Value::Number(a / b));
            }
            OpCode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(value.is_falsey(&self.heap)));
            }
            OpCode::Negate => match self.peek(0)? {
                Value::Number(n) => {
                    self.pop()?;
                    self.push(Value::Number(-n));
                }
                _ => return Err(VmError::OperandMustBeNumber),
            },

            OpCode::Print => {
                let value = self.pop()?;
                writeln!(self.output, "{}", ValueDisplay::new(&self.heap, value))?;
            }

            OpCode::Jump => {
                let offset = self.read_short()? as usize;
                self.frame_mut()?.ip += offset;
            }
            OpCode::JumpIfFalse => {
                let offset = self.read_short()? as usize;
                if self.peek(0)?.is_falsey(&self.heap) {
                    self.frame_mut()?.ip += offset;
                }
            }
            OpCode::Loop => {
                let offset = self.read_short()? as usize;
                let frame = self.frame_mut()?;
                frame.ip = frame
                    .ip
                    .checked_sub(offset)
                    .ok_or(VmError::Internal("loop target before chunk start"))?;
            }
            OpCode::Call => {
                let argc = self.read_byte()? as usize;
                let callee = self.peek(argc)?;
                self.call_value(callee, argc)?;
            }
            OpCode::Invoke => {
                let (name, hash) = self.read_string()?;
                let argc = self.read_byte()? as usize;
                self.invoke(name, hash, argc)?;
            }
            OpCode::SuperInvoke => {
                let (name, hash) = self.read_string()?;
                let argc = self.read_byte()? as usize;
                let superclass = self.pop_class()?;
                self.invoke_from_class(superclass, name, hash, argc)?;
            }
            OpCode::Closure => self.make_closure()?,
            OpCode::CloseUpvalue => {
                let top = self
                    .stack
                    .len()
                    .checked_sub(1)
                    .ok_or(VmError::StackUnderflow)?;
                self.close_upvalues(top)?;
                self.pop()?;
            }
            OpCode::Return => {
                let result = self.pop()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or(VmError::Internal("no active frame"))?;
                self.close_upvalues(frame.slots)?;
                self.stack.truncate(frame.slots);
                if self.frames.is_empty() {
                    return Ok(ControlFlow::Halt);
                }
                self.push(result);
            }

            OpCode::Class => {
                let (name, _) = self.read_string()?;
                let class = self.heap.alloc_class(name);
                self.push(Value::Obj(class));
            }
            OpCode::Inherit => {
                let methods = match self.peek(1)? {
                    Value::Obj(r) => match self.object(r)? {
                        HeapObject::Class(superclass) => superclass.methods.clone(),
                        _ => return Err(VmError::SuperclassMustBeClass),
                    },
                    _ => return Err(VmError::SuperclassMustBeClass),
                };
                let subclass = self.class_at(0)?;
                match self.object_mut(subclass)? {
                    HeapObject::Class(subclass) => methods.add_all(&mut subclass.methods),
                    _ => return Err(VmError::Internal("subclass is not a class")),
                }
                self.pop()?;
            }
            OpCode::Method => {
                let (name, hash) = self.read_string()?;
                let method = self.peek(0)?;
                let class = self.class_at(1)?;
                match self.object_mut(class)? {
                    HeapObject::Class(class) => {
                        class.methods.set(name, hash, method);
                    }
                    _ => return Err(VmError::Internal("method target is not a class")),
                }
                self.pop()?;
            }
            OpCode::Enum => {
                let (name, _) = self.read_string()?;
                let enumeration = self.heap.alloc_enum(name);
                self.push(Value::Obj(enumeration));
            }
            OpCode::SetEnumValue => {
                let (name, hash) = self.read_string()?;
                let value = self.peek(0)?;
                let target = self.peek(1)?.as_obj();
                match target.map(|r| self.heap.get_mut(r)) {
                    Some(Some(HeapObject::Enum(e))) => {
                        e.variables.set(name, hash, value);
                    }
                    _ => return Err(VmError::Internal("enum value target is not an enum")),
                }
                self.pop()?;
            }

            OpCode::NewList => {
                let list = self.heap.alloc_list(Vec::new());
                self.push(Value::Obj(list));
            }
            OpCode::AddList => {
                let value = self.pop()?;
                let list = self.peek(0)?;
                match list.as_obj().map(|r| self.heap.get_mut(r)) {
                    Some(Some(HeapObject::List(list))) => list.values.push(value),
                    _ => return Err(VmError::Internal("list append target is not a list")),
                }
            }
            OpCode::UnpackList => {
                let count = self.read_byte()? as usize;
                let values = match self.peek(0)? {
                    Value::Obj(r) => match self.object(r)? {
                        HeapObject::List(list) => list.values.clone(),
                        _ => return Err(VmError::UnpackNonList),
                    },
                    _ => return Err(VmError::UnpackNonList),
                };
                if count != values.len() {
                    return Err(if count >= values.len() {
                        VmError::TooManyValuesToUnpack
                    } else {
                        VmError::NotEnoughValuesToUnpack
                    });
                }
                self.pop()?;
                self.stack.extend(values);
            }
            OpCode::Subscript => self.subscript()?,
            OpCode::SubscriptAssign => self.subscript_assign()?,
            OpCode::SubscriptPush => self.subscript_push()?,
            OpCode::NewDict => {
                let count = self.read_byte()? as usize;
                let base = self
                    .stack
                    .len()
                    .checked_sub(count * 2)
                    .ok_or(VmError::StackUnderflow)?;
                let mut dict = Dict::new();
                for pair in self.stack[base..].chunks_exact(2) {
                    let hash = self
                        .heap
                        .hash_key(pair[0])
                        .ok_or(VmError::InvalidDictKey)?;
                    dict.set(pair[0], hash, pair[1]);
                }
                self.stack.truncate(base);
                let dict = self.heap.alloc_dict(dict);
                self.push(Value::Obj(dict));
            }
        }
        Ok(ControlFlow::Continue)
    }

    // ========================================
    // Instruction bodies
    // ========================================

    fn add(&mut self) -> Result<(), VmError> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;
        let result = match (a, b) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Obj(a), Value::Obj(b)) => match (self.object(a)?, self.object(b)?) {
                (HeapObject::String(a), HeapObject::String(b)) => {
                    let mut chars = String::with_capacity(a.chars.len() + b.chars.len());
                    chars.push_str(&a.chars);
                    chars.push_str(&b.chars);
                    Value::Obj(self.heap.intern_owned(chars))
                }
                (HeapObject::List(a), HeapObject::List(b)) => {
                    let mut values = Vec::with_capacity(a.values.len() + b.values.len());
                    values.extend_from_slice(&a.values);
                    values.extend_from_slice(&b.values);
                    Value::Obj(self.heap.alloc_list(values))
                }
                _ => return Err(VmError::InvalidAddOperands),
            },
            _ => return Err(VmError::InvalidAddOperands),
        };
        self.stack.truncate(self.stack.len() - 2);
        self.push(result);
        Ok(())
    }

    fn get_property(&mut self) -> Result<(), VmError> {
        let (name, hash) = self.read_string()?;
        let receiver = self.peek(0)?;
        let Value::Obj(r) = receiver else {
            return Err(VmError::OnlyInstancesHaveProperties);
        };
        match self.object(r)? {
            HeapObject::Instance(instance) => {
                if let Some(value) = instance.fields.get(name, hash) {
                    self.poke(0, value)?;
                    return Ok(());
                }
                let class = instance.class;
                self.bind_method(class, name, hash)
            }
            HeapObject::Enum(e) => match e.variables.get(name, hash) {
                Some(value) => self.poke(0, value),
                None => Err(VmError::UndefinedEnumVariable {
                    enum_name: self.name(e.name),
                    name: self.name(name),
                }),
            },
            _ => Err(VmError::OnlyInstancesHaveProperties),
        }
    }

    fn pop_class(&mut self) -> Result<GcRef, VmError> {
        let class = self.class_at(0)?;
        self.pop()?;
        Ok(class)
    }

    fn class_at(&self, distance: usize) -> Result<GcRef, VmError> {
        let value = self.peek(distance)?;
        match value.as_obj().map(|r| (r, self.heap.get(r))) {
            Some((r, Some(HeapObject::Class(_)))) => Ok(r),
            _ => Err(VmError::Internal("expected a class on the stack")),
        }
    }

    /// Resolve a list position, counting negative indices from the end.
    fn list_index(index: Value, len: usize) -> Result<usize, VmError> {
        let Value::Number(n) = index else {
            return Err(VmError::ListIndexNotInteger);
        };
        let mut index = n as i64;
        if index < 0 {
            index += len as i64;
        }
        if index >= 0 && (index as usize) < len {
            Ok(index as usize)
        } else {
            Err(VmError::ListIndexOutOfRange)
        }
    }

    fn dict_key(&self, key: Value) -> Result<u32, VmError> {
        self.heap.hash_key(key).ok_or(VmError::InvalidDictKey)
    }

    fn missing_key(&self, key: Value) -> VmError {
        VmError::MissingDictKey(ValueDisplay::new(&self.heap, key).to_string())
    }

    /// The current element of a list or dict, for `SUBSCRIPT` and
    /// `SUBSCRIPT_PUSH`. `None` if the target is neither.
    fn element(&self, target: Value, index: Value) -> Result<Option<Value>, VmError> {
        let Value::Obj(r) = target else {
            return Ok(None);
        };
        match self.object(r)? {
            HeapObject::List(list) => {
                let index = Self::list_index(index, list.values.len())?;
                Ok(Some(list.values[index]))
            }
            HeapObject::Dict(dict) => {
                let hash = self.dict_key(index)?;
                match dict.get(index, hash) {
                    Some(value) => Ok(Some(value)),
                    None => Err(self.missing_key(index)),
                }
            }
            _ => Ok(None),
        }
    }

    fn subscript(&mut self) -> Result<(), VmError> {
        let index = self.peek(0)?;
        let target = self.peek(1)?;
        match self.element(target, index)? {
            Some(value) => {
                self.stack.truncate(self.stack.len() - 2);
                self.push(value);
                Ok(())
            }
            None => Err(VmError::NotSubscriptable(type_name(&self.heap, target))),
        }
    }

    fn subscript_assign(&mut self) -> Result<(), VmError> {
        let value = self.peek(0)?;
        let index = self.peek(1)?;
        let target = self.peek(2)?;
        let not_assignable = || VmError::NotAssignable(type_name(&self.heap, target));

        let Value::Obj(r) = target else {
            return Err(not_assignable());
        };
        let hash = match self.object(r)? {
            HeapObject::Dict(_) => Some(self.dict_key(index)?),
            HeapObject::List(_) => None,
            _ => return Err(not_assignable()),
        };
        match (self.object_mut(r)?, hash) {
            (HeapObject::List(list), _) => {
                let index = Self::list_index(index, list.values.len())?;
                list.values[index] = value;
            }
            (HeapObject::Dict(dict), Some(hash)) => {
                dict.set(index, hash, value);
            }
            _ => return Err(VmError::Internal("subscript target changed kind")),
        }

        self.stack.truncate(self.stack.len() - 3);
        self.push(Value::Nil);
        Ok(())
    }

    /// Compound assignment helper: `[target, index, operand]` becomes
    /// `[target, index, element, operand]`.
    fn subscript_push(&mut self) -> Result<(), VmError> {
        let value = self.peek(0)?;
        let index = self.peek(1)?;
        let target = self.peek(2)?;
        match self.element(target, index)? {
            Some(element) => {
                self.poke(0, element)?;
                self.push(value);
                Ok(())
            }
            None => Err(VmError::NotAssignable(type_name(&self.heap, target))),
        }
    }

    fn make_closure(&mut self) -> Result<(), VmError> {
        let function = self
            .read_constant()?
            .as_obj()
            .ok_or(VmError::Internal("closure constant is not a function"))?;
        let upvalue_count = match self.object(function)? {
            HeapObject::Function(f) => f.upvalue_count,
            _ => return Err(VmError::Internal("closure constant is not a function")),
        };

        let base = self.frame()?.slots;
        let enclosing = self.frame()?.closure;
        let mut upvalues = Vec::with_capacity(upvalue_count);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte()? != 0;
            let index = self.read_byte()? as usize;
            let upvalue = if is_local {
                self.capture_upvalue(base + index)?
            } else {
                match self.object(enclosing)? {
                    HeapObject::Closure(c) => *c
                        .upvalues
                        .get(index)
                        .ok_or(VmError::Internal("upvalue index out of range"))?,
                    _ => return Err(VmError::Internal("frame does not hold a closure")),
                }
            };
            upvalues.push(upvalue);
        }

        let closure = self
            .heap
            .alloc(HeapObject::Closure(ObjClosure { function, upvalues }));
        self.push(Value::Obj(closure));
        Ok(())
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VM {
    fn drop(&mut self) {
        if self.config.gc_stats {
            let stats = &self.gc_stats;
            log::info!(
                "[GC] Collections: {}, Total pause: {}us, Max pause: {}us, Freed: {} objects / {} bytes",
                stats.cycles,
                stats.total_pause_us,
                stats.max_pause_us,
                stats.objects_freed,
                stats.bytes_freed
            );
        }
    }
}
