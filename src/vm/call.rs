//! Calls, method dispatch and upvalue capture.

use super::error::VmError;
use super::native::NativeFn;
use super::object::{HeapObject, ObjBoundMethod, ObjUpvalue, UpvalueState};
use super::vm::{CallFrame, VM};
use super::{GcRef, Value};

/// What a callee turned out to be, copied out of the heap so the call can
/// mutate the VM freely.
enum Callee {
    Bound { receiver: Value, method: GcRef },
    Class,
    Closure,
    Native(NativeFn),
}

impl VM {
    /// Call `callee` with the `argc` values above it on the stack.
    pub(super) fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), VmError> {
        let Value::Obj(r) = callee else {
            return Err(VmError::NotCallable);
        };
        let kind = match self.object(r)? {
            HeapObject::BoundMethod(bound) => Callee::Bound {
                receiver: bound.receiver,
                method: bound.method,
            },
            HeapObject::Class(_) => Callee::Class,
            HeapObject::Closure(_) => Callee::Closure,
            HeapObject::Native(native) => Callee::Native(native.function),
            _ => return Err(VmError::NotCallable),
        };

        match kind {
            Callee::Bound { receiver, method } => {
                self.poke(argc, receiver)?;
                self.call(method, argc)
            }
            Callee::Class => {
                let instance = self.heap.alloc_instance(r);
                self.poke(argc, Value::Obj(instance))?;
                let init_hash = self
                    .heap
                    .string_hash(self.init_string)
                    .ok_or(VmError::Internal("init string was freed"))?;
                let initializer = match self.object(r)? {
                    HeapObject::Class(class) => class.methods.get(self.init_string, init_hash),
                    _ => None,
                };
                match initializer {
                    Some(Value::Obj(init)) => self.call(init, argc),
                    Some(_) => Err(VmError::Internal("initializer is not a closure")),
                    None if argc != 0 => Err(VmError::ArityMismatch {
                        expected: 0,
                        got: argc,
                    }),
                    None => Ok(()),
                }
            }
            Callee::Closure => self.call(r, argc),
            Callee::Native(function) => {
                let args_start = self
                    .stack
                    .len()
                    .checked_sub(argc)
                    .ok_or(VmError::StackUnderflow)?;
                let result = function(argc, &self.stack[args_start..]);
                self.stack.truncate(args_start.saturating_sub(1));
                self.push(result);
                Ok(())
            }
        }
    }

    /// Push a frame for `closure`. Its slot 0 is the callee, already on the
    /// stack below the arguments.
    pub(super) fn call(&mut self, closure: GcRef, argc: usize) -> Result<(), VmError> {
        let function = match self.object(closure)? {
            HeapObject::Closure(c) => c.function,
            _ => return Err(VmError::NotCallable),
        };
        let (arity, chunk) = match self.object(function)? {
            HeapObject::Function(f) => (f.arity, f.chunk.clone()),
            _ => return Err(VmError::Internal("closure does not wrap a function")),
        };

        if argc != arity {
            return Err(VmError::ArityMismatch {
                expected: arity,
                got: argc,
            });
        }
        if self.frames.len() >= self.config.frames_max {
            return Err(VmError::StackOverflow);
        }

        let slots = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or(VmError::StackUnderflow)?;
        self.frames.push(CallFrame {
            closure,
            chunk,
            ip: 0,
            slots,
        });
        Ok(())
    }

    /// `OP_INVOKE`: call a method or callable field on the receiver sitting
    /// below the arguments, without materialising a bound method.
    pub(super) fn invoke(&mut self, name: GcRef, hash: u32, argc: usize) -> Result<(), VmError> {
        let Value::Obj(receiver) = self.peek(argc)? else {
            return Err(VmError::OnlyInstancesHaveMethods);
        };
        match self.object(receiver)? {
            HeapObject::Instance(instance) => {
                let class = instance.class;
                match instance.fields.get(name, hash) {
                    Some(field) => {
                        self.poke(argc, field)?;
                        self.call_value(field, argc)
                    }
                    None => self.invoke_from_class(class, name, hash, argc),
                }
            }
            HeapObject::Enum(e) => match e.variables.get(name, hash) {
                Some(variable) => self.call_value(variable, argc),
                None => Err(VmError::UndefinedEnumVariable {
                    enum_name: self.name(e.name),
                    name: self.name(name),
                }),
            },
            _ => Err(VmError::OnlyInstancesHaveMethods),
        }
    }

    pub(super) fn invoke_from_class(
        &mut self,
        class: GcRef,
        name: GcRef,
        hash: u32,
        argc: usize,
    ) -> Result<(), VmError> {
        match self.find_method(class, name, hash)? {
            Some(method) => self.call(method, argc),
            None => Err(VmError::UndefinedProperty(self.name(name))),
        }
    }

    /// Replace the receiver on top of the stack with a bound method.
    pub(super) fn bind_method(
        &mut self,
        class: GcRef,
        name: GcRef,
        hash: u32,
    ) -> Result<(), VmError> {
        let Some(method) = self.find_method(class, name, hash)? else {
            return Err(VmError::UndefinedProperty(self.name(name)));
        };
        let receiver = self.peek(0)?;
        let bound = self
            .heap
            .alloc(HeapObject::BoundMethod(ObjBoundMethod { receiver, method }));
        self.poke(0, Value::Obj(bound))
    }

    fn find_method(&self, class: GcRef, name: GcRef, hash: u32) -> Result<Option<GcRef>, VmError> {
        match self.object(class)? {
            HeapObject::Class(class) => Ok(class.methods.get(name, hash).and_then(|m| m.as_obj())),
            _ => Err(VmError::Internal("method lookup on a non-class")),
        }
    }

    // ========================================
    // Upvalues
    // ========================================

    pub(super) fn upvalue_state(&self, upvalue: GcRef) -> Result<UpvalueState, VmError> {
        match self.object(upvalue)? {
            HeapObject::Upvalue(u) => Ok(u.state),
            _ => Err(VmError::Internal("expected an upvalue")),
        }
    }

    pub(super) fn set_upvalue_state(
        &mut self,
        upvalue: GcRef,
        state: UpvalueState,
    ) -> Result<(), VmError> {
        match self.object_mut(upvalue)? {
            HeapObject::Upvalue(u) => {
                u.state = state;
                Ok(())
            }
            _ => Err(VmError::Internal("expected an upvalue")),
        }
    }

    fn upvalue_next(&self, upvalue: GcRef) -> Result<Option<GcRef>, VmError> {
        match self.object(upvalue)? {
            HeapObject::Upvalue(u) => Ok(u.next),
            _ => Err(VmError::Internal("expected an upvalue")),
        }
    }

    fn set_upvalue_next(&mut self, upvalue: GcRef, next: Option<GcRef>) -> Result<(), VmError> {
        match self.object_mut(upvalue)? {
            HeapObject::Upvalue(u) => {
                u.next = next;
                Ok(())
            }
            _ => Err(VmError::Internal("expected an upvalue")),
        }
    }

    /// The open upvalue for stack `slot`, reusing an existing one so that
    /// every closure over the same variable shares it.
    pub(super) fn capture_upvalue(&mut self, slot: usize) -> Result<GcRef, VmError> {
        let mut prev = None;
        let mut cursor = self.open_upvalues;
        while let Some(upvalue) = cursor {
            match self.upvalue_state(upvalue)? {
                UpvalueState::Open(s) if s > slot => {
                    prev = Some(upvalue);
                    cursor = self.upvalue_next(upvalue)?;
                }
                UpvalueState::Open(s) if s == slot => return Ok(upvalue),
                UpvalueState::Open(_) => break,
                UpvalueState::Closed(_) => {
                    return Err(VmError::Internal("closed upvalue in open chain"));
                }
            }
        }

        let created = self.heap.alloc(HeapObject::Upvalue(ObjUpvalue {
            state: UpvalueState::Open(slot),
            next: cursor,
        }));
        match prev {
            None => self.open_upvalues = Some(created),
            Some(prev) => self.set_upvalue_next(prev, Some(created))?,
        }
        Ok(created)
    }

    /// Close every open upvalue at or above stack slot `last`, copying the
    /// variable off the stack.
    pub(super) fn close_upvalues(&mut self, last: usize) -> Result<(), VmError> {
        while let Some(upvalue) = self.open_upvalues {
            let slot = match self.upvalue_state(upvalue)? {
                UpvalueState::Open(slot) => slot,
                UpvalueState::Closed(_) => {
                    return Err(VmError::Internal("closed upvalue in open chain"));
                }
            };
            if slot < last {
                break;
            }
            let value = *self
                .stack
                .get(slot)
                .ok_or(VmError::Internal("open upvalue past stack top"))?;
            self.open_upvalues = self.upvalue_next(upvalue)?;
            self.set_upvalue_state(upvalue, UpvalueState::Closed(value))?;
            self.set_upvalue_next(upvalue, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_slots(vm: &VM) -> Vec<usize> {
        let mut slots = Vec::new();
        let mut cursor = vm.open_upvalues;
        while let Some(upvalue) = cursor {
            if let Ok(UpvalueState::Open(slot)) = vm.upvalue_state(upvalue) {
                slots.push(slot);
            }
            cursor = vm.upvalue_next(upvalue).unwrap();
        }
        slots
    }

    #[test]
    fn test_capture_keeps_chain_sorted_descending() {
        let mut vm = VM::new();
        vm.stack.extend([Value::Nil, Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
        vm.capture_upvalue(1).unwrap();
        vm.capture_upvalue(3).unwrap();
        vm.capture_upvalue(2).unwrap();
        assert_eq!(open_slots(&vm), vec![3, 2, 1]);
    }

    #[test]
    fn test_capture_reuses_open_upvalue() {
        let mut vm = VM::new();
        vm.stack.extend([Value::Nil, Value::Number(1.0)]);
        let a = vm.capture_upvalue(1).unwrap();
        let b = vm.capture_upvalue(1).unwrap();
        assert_eq!(a, b);
        assert_eq!(open_slots(&vm), vec![1]);
    }

    #[test]
    fn test_close_snapshots_values_at_or_above_boundary() {
        let mut vm = VM::new();
        vm.stack.extend([Value::Nil, Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
        let low = vm.capture_upvalue(1).unwrap();
        let mid = vm.capture_upvalue(2).unwrap();
        let high = vm.capture_upvalue(3).unwrap();

        vm.close_upvalues(2).unwrap();

        assert_eq!(open_slots(&vm), vec![1]);
        assert_eq!(vm.upvalue_state(low).unwrap(), UpvalueState::Open(1));
        assert_eq!(
            vm.upvalue_state(mid).unwrap(),
            UpvalueState::Closed(Value::Number(2.0))
        );
        assert_eq!(
            vm.upvalue_state(high).unwrap(),
            UpvalueState::Closed(Value::Number(3.0))
        );
    }

    #[test]
    fn test_calling_a_number_fails() {
        let mut vm = VM::new();
        vm.push(Value::Number(1.0));
        assert_eq!(
            vm.call_value(Value::Number(1.0), 0),
            Err(VmError::NotCallable)
        );
    }

    #[test]
    fn test_class_without_init_rejects_arguments() {
        let mut vm = VM::new();
        let name = vm.heap.intern("Point");
        let class = vm.heap.alloc_class(name);
        vm.stack.extend([Value::Obj(class), Value::Number(1.0)]);
        assert_eq!(
            vm.call_value(Value::Obj(class), 1),
            Err(VmError::ArityMismatch {
                expected: 0,
                got: 1
            })
        );
    }
}
