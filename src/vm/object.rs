//! Heap object variants.

use std::mem::size_of;
use std::rc::Rc;

use super::dict::Dict;
use super::heap::GcRef;
use super::native::NativeFn;
use super::table::Table;
use super::value::Value;
use super::Chunk;

/// Discriminant of a heap object, used for type names and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    Function,
    Closure,
    Upvalue,
    BoundMethod,
    Class,
    Instance,
    Enum,
    Native,
    List,
    Dict,
}

impl ObjectType {
    /// Name shown in `'<type>' is not subscriptable` style errors.
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::String => "string",
            ObjectType::Function | ObjectType::Closure => "function",
            ObjectType::Upvalue => "upvalue",
            ObjectType::BoundMethod => "method",
            ObjectType::Class => "class",
            ObjectType::Instance => "instance",
            ObjectType::Enum => "enum",
            ObjectType::Native => "native",
            ObjectType::List => "list",
            ObjectType::Dict => "dict",
        }
    }
}

/// Immutable interned string with its cached FNV-1a hash.
#[derive(Debug)]
pub struct ObjString {
    pub chars: String,
    pub hash: u32,
}

/// A compiled function. The chunk is shared with every frame executing it.
#[derive(Debug)]
pub struct ObjFunction {
    pub arity: usize,
    pub upvalue_count: usize,
    pub chunk: Rc<Chunk>,
    /// `None` for the top-level script.
    pub name: Option<GcRef>,
}

#[derive(Debug)]
pub struct ObjClosure {
    pub function: GcRef,
    pub upvalues: Vec<GcRef>,
}

/// Where an upvalue's variable currently lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpvalueState {
    /// Still on the value stack at this slot index.
    Open(usize),
    /// Hoisted off the stack after its frame ended.
    Closed(Value),
}

#[derive(Debug)]
pub struct ObjUpvalue {
    pub state: UpvalueState,
    /// Next open upvalue at a lower stack slot.
    pub next: Option<GcRef>,
}

#[derive(Debug)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: GcRef,
}

#[derive(Debug)]
pub struct ObjClass {
    pub name: GcRef,
    pub methods: Table,
}

#[derive(Debug)]
pub struct ObjInstance {
    pub class: GcRef,
    pub fields: Table,
}

#[derive(Debug)]
pub struct ObjEnum {
    pub name: GcRef,
    pub variables: Table,
}

pub struct ObjNative {
    pub function: NativeFn,
}

impl std::fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjNative")
    }
}

#[derive(Debug, Default)]
pub struct ObjList {
    pub values: Vec<Value>,
}

#[derive(Debug)]
pub enum HeapObject {
    String(ObjString),
    Function(ObjFunction),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    BoundMethod(ObjBoundMethod),
    Class(ObjClass),
    Instance(ObjInstance),
    Enum(ObjEnum),
    Native(ObjNative),
    List(ObjList),
    Dict(Dict),
}

impl HeapObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            HeapObject::String(_) => ObjectType::String,
            HeapObject::Function(_) => ObjectType::Function,
            HeapObject::Closure(_) => ObjectType::Closure,
            HeapObject::Upvalue(_) => ObjectType::Upvalue,
            HeapObject::BoundMethod(_) => ObjectType::BoundMethod,
            HeapObject::Class(_) => ObjectType::Class,
            HeapObject::Instance(_) => ObjectType::Instance,
            HeapObject::Enum(_) => ObjectType::Enum,
            HeapObject::Native(_) => ObjectType::Native,
            HeapObject::List(_) => ObjectType::List,
            HeapObject::Dict(_) => ObjectType::Dict,
        }
    }

    pub fn as_string(&self) -> Option<&ObjString> {
        match self {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ObjFunction> {
        match self {
            HeapObject::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&ObjClosure> {
        match self {
            HeapObject::Closure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_upvalue(&self) -> Option<&ObjUpvalue> {
        match self {
            HeapObject::Upvalue(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ObjClass> {
        match self {
            HeapObject::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Approximate bytes owned by this object, counted against the GC
    /// threshold.
    pub fn heap_size(&self) -> usize {
        let payload = match self {
            HeapObject::String(s) => s.chars.capacity(),
            HeapObject::Function(f) => {
                f.chunk.code.capacity()
                    + f.chunk.lines.capacity() * size_of::<u32>()
                    + f.chunk.constants.capacity() * size_of::<Value>()
            }
            HeapObject::Closure(c) => c.upvalues.capacity() * size_of::<GcRef>(),
            HeapObject::Class(c) => table_size(&c.methods),
            HeapObject::Instance(i) => table_size(&i.fields),
            HeapObject::Enum(e) => table_size(&e.variables),
            HeapObject::List(l) => l.values.capacity() * size_of::<Value>(),
            HeapObject::Dict(d) => d.capacity() * (2 * size_of::<Value>() + 8),
            HeapObject::Upvalue(_) | HeapObject::BoundMethod(_) | HeapObject::Native(_) => 0,
        };
        size_of::<HeapObject>() + payload
    }

    /// Push every object handle this object keeps alive onto `out`.
    pub fn trace(&self, out: &mut Vec<GcRef>) {
        let mut value = |v: Value| {
            if let Value::Obj(r) = v {
                out.push(r);
            }
        };
        match self {
            HeapObject::String(_) | HeapObject::Native(_) => {}
            HeapObject::Function(f) => {
                if let Some(name) = f.name {
                    value(Value::Obj(name));
                }
                for constant in &f.chunk.constants {
                    value(*constant);
                }
            }
            HeapObject::Closure(c) => {
                value(Value::Obj(c.function));
                for upvalue in &c.upvalues {
                    value(Value::Obj(*upvalue));
                }
            }
            HeapObject::Upvalue(u) => {
                if let UpvalueState::Closed(v) = u.state {
                    value(v);
                }
            }
            HeapObject::BoundMethod(b) => {
                value(b.receiver);
                value(Value::Obj(b.method));
            }
            HeapObject::Class(c) => {
                value(Value::Obj(c.name));
                trace_table(&c.methods, &mut value);
            }
            HeapObject::Instance(i) => {
                value(Value::Obj(i.class));
                trace_table(&i.fields, &mut value);
            }
            HeapObject::Enum(e) => {
                value(Value::Obj(e.name));
                trace_table(&e.variables, &mut value);
            }
            HeapObject::List(l) => {
                for v in &l.values {
                    value(*v);
                }
            }
            HeapObject::Dict(d) => {
                for (k, v) in d.iter() {
                    value(k);
                    value(v);
                }
            }
        }
    }
}

fn table_size(table: &Table) -> usize {
    table.capacity() * (size_of::<GcRef>() + size_of::<Value>() + 8)
}

fn trace_table(table: &Table, value: &mut impl FnMut(Value)) {
    for (key, _, v) in table.entries() {
        value(Value::Obj(key));
        value(v);
    }
}
