use std::fmt;
use std::rc::Rc;

use super::dict::Dict;
use super::hash::{hash_bits, hash_string};
use super::native::NativeFn;
use super::object::{
    HeapObject, ObjClass, ObjEnum, ObjFunction, ObjInstance, ObjList, ObjNative, ObjString,
};
use super::table::Table;
use super::{Chunk, Value};
use crate::config::VmConfig;

// =============================================================================
// GcRef - Reference to heap object
// =============================================================================

/// A handle to a heap object: a slot index plus the generation the slot had
/// when the object was allocated. A handle whose generation no longer matches
/// its slot refers to an object that has been swept and resolves to nothing.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef {
    index: u32,
    generation: u32,
}

impl GcRef {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({}@{})", self.index, self.generation)
    }
}

// =============================================================================
// Slot - one arena cell
// =============================================================================

#[derive(Debug)]
struct Slot {
    generation: u32,
    marked: bool,
    /// Bytes charged for this object at allocation or at the last sweep.
    size: usize,
    object: Option<HeapObject>,
}

/// What one sweep released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub objects_freed: usize,
    pub bytes_freed: usize,
}

// =============================================================================
// Heap - arena of typed slots
// =============================================================================

/// The garbage-collected heap.
///
/// Objects live in a slot arena. Allocation reuses a free slot or appends one,
/// so registration is O(1), and the sweep is a single pass over the arena.
/// The heap also owns the string intern table; interned strings are held
/// strongly and are never collected.
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    strings: Table,
    gray: Vec<GcRef>,
    bytes_allocated: usize,
    next_gc: usize,
    min_gc_threshold: usize,
    gc_grow_factor: usize,
    gc_enabled: bool,
    gc_stress: bool,
}

impl Heap {
    pub fn new() -> Self {
        Self::with_config(&VmConfig::default())
    }

    pub fn with_config(config: &VmConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: config.initial_gc_threshold,
            min_gc_threshold: config.min_gc_threshold,
            gc_grow_factor: config.gc_grow_factor.max(1),
            gc_enabled: config.gc_enabled,
            gc_stress: config.gc_stress,
        }
    }

    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------

    /// Register a new object and return its handle.
    pub fn alloc(&mut self, object: HeapObject) -> GcRef {
        let size = object.heap_size();
        self.bytes_allocated += size;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.marked = false;
            slot.size = size;
            slot.object = Some(object);
            return GcRef {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            marked: false,
            size,
            object: Some(object),
        });
        GcRef {
            index,
            generation: 0,
        }
    }

    /// Return the canonical string object for `chars`, allocating it on first
    /// use.
    pub fn intern(&mut self, chars: &str) -> GcRef {
        let hash = hash_string(chars);
        if let Some(existing) = self.find_interned(chars, hash) {
            return existing;
        }
        self.alloc_string(chars.to_string(), hash)
    }

    /// Like [`Heap::intern`], but takes ownership of an already built string.
    pub fn intern_owned(&mut self, chars: String) -> GcRef {
        let hash = hash_string(&chars);
        if let Some(existing) = self.find_interned(&chars, hash) {
            return existing;
        }
        self.alloc_string(chars, hash)
    }

    /// The interned string for `chars`, if one exists. Never allocates.
    pub fn find_string(&self, chars: &str) -> Option<GcRef> {
        self.find_interned(chars, hash_string(chars))
    }

    fn find_interned(&self, chars: &str, hash: u32) -> Option<GcRef> {
        let slots = &self.slots;
        self.strings
            .find_interned(chars, hash, |r| text_in(slots, r))
    }

    fn alloc_string(&mut self, chars: String, hash: u32) -> GcRef {
        let r = self.alloc(HeapObject::String(ObjString { chars, hash }));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    pub fn alloc_function(
        &mut self,
        name: Option<&str>,
        arity: usize,
        upvalue_count: usize,
        chunk: Chunk,
    ) -> GcRef {
        let name = name.map(|n| self.intern(n));
        self.alloc(HeapObject::Function(ObjFunction {
            arity,
            upvalue_count,
            chunk: Rc::new(chunk),
            name,
        }))
    }

    pub fn alloc_native(&mut self, function: NativeFn) -> GcRef {
        self.alloc(HeapObject::Native(ObjNative { function }))
    }

    pub fn alloc_class(&mut self, name: GcRef) -> GcRef {
        self.alloc(HeapObject::Class(ObjClass {
            name,
            methods: Table::new(),
        }))
    }

    pub fn alloc_instance(&mut self, class: GcRef) -> GcRef {
        self.alloc(HeapObject::Instance(ObjInstance {
            class,
            fields: Table::new(),
        }))
    }

    pub fn alloc_enum(&mut self, name: GcRef) -> GcRef {
        self.alloc(HeapObject::Enum(ObjEnum {
            name,
            variables: Table::new(),
        }))
    }

    pub fn alloc_list(&mut self, values: Vec<Value>) -> GcRef {
        self.alloc(HeapObject::List(ObjList { values }))
    }

    pub fn alloc_dict(&mut self, dict: Dict) -> GcRef {
        self.alloc(HeapObject::Dict(dict))
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// Resolve a handle. `None` if the object has been collected.
    pub fn get(&self, r: GcRef) -> Option<&HeapObject> {
        let slot = self.slots.get(r.index())?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub fn get_mut(&mut self, r: GcRef) -> Option<&mut HeapObject> {
        let slot = self.slots.get_mut(r.index())?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_mut()
    }

    /// Whether the handle still refers to a live object.
    pub fn contains(&self, r: GcRef) -> bool {
        self.get(r).is_some()
    }

    pub fn string(&self, r: GcRef) -> Option<&str> {
        text_in(&self.slots, r)
    }

    pub fn string_hash(&self, r: GcRef) -> Option<u32> {
        self.get(r)?.as_string().map(|s| s.hash)
    }

    /// Hash for a dictionary key, or `None` if the value is not a valid key
    /// (only nil, booleans, numbers and strings are).
    pub fn hash_key(&self, key: Value) -> Option<u32> {
        match key {
            Value::Obj(r) => self.string_hash(r),
            scalar => scalar.boxed_bits().map(hash_bits),
        }
    }

    /// Number of interned strings.
    pub fn interned_count(&self) -> usize {
        self.strings.len()
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    // -------------------------------------------------------------------------
    // Collection
    // -------------------------------------------------------------------------

    /// Whether allocation pressure calls for a collection.
    pub fn should_gc(&self) -> bool {
        self.gc_enabled && (self.gc_stress || self.bytes_allocated >= self.next_gc)
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Mark an object gray: flag it and queue it for tracing.
    pub fn mark_object(&mut self, r: GcRef) {
        mark(&mut self.slots, &mut self.gray, r);
    }

    /// Mark every key and value of a table that lives outside the heap.
    pub fn mark_table(&mut self, table: &Table) {
        for (key, _, value) in table.entries() {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Mark every interned string; the intern table holds its entries
    /// strongly.
    pub fn mark_interned(&mut self) {
        for (key, _, _) in self.strings.entries() {
            mark(&mut self.slots, &mut self.gray, key);
        }
    }

    /// Drain the gray worklist, blackening each object by marking the objects
    /// it references.
    pub fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(r) = self.gray.pop() {
            if let Some(object) = self.get(r) {
                object.trace(&mut children);
            }
            for child in children.drain(..) {
                mark(&mut self.slots, &mut self.gray, child);
            }
        }
    }

    /// Sweep phase: release every unmarked object and clear the marks of the
    /// survivors. Resets the collection threshold from the surviving size.
    pub fn sweep(&mut self) -> SweepResult {
        let mut result = SweepResult::default();
        let mut live_bytes = 0;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(object) = &slot.object else {
                continue;
            };
            if slot.marked {
                slot.marked = false;
                slot.size = object.heap_size();
                live_bytes += slot.size;
            } else {
                result.objects_freed += 1;
                result.bytes_freed += slot.size;
                slot.object = None;
                slot.size = 0;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }

        self.bytes_allocated = live_bytes;
        self.next_gc = (live_bytes * self.gc_grow_factor).max(self.min_gc_threshold);
        result
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn text_in(slots: &[Slot], r: GcRef) -> Option<&str> {
    let slot = slots.get(r.index())?;
    if slot.generation != r.generation {
        return None;
    }
    match &slot.object {
        Some(HeapObject::String(s)) => Some(s.chars.as_str()),
        _ => None,
    }
}

fn mark(slots: &mut [Slot], gray: &mut Vec<GcRef>, r: GcRef) {
    let Some(slot) = slots.get_mut(r.index()) else {
        return;
    };
    if slot.generation != r.generation || slot.marked || slot.object.is_none() {
        return;
    }
    slot.marked = true;
    gray.push(r);
}
