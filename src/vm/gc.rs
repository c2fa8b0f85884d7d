//! Stop-the-world collection driven from the dispatch loop.
//!
//! Collections only start at instruction boundaries, so every live value is
//! reachable from the roots below; nothing is held in Rust locals across a
//! cycle.

use std::time::Instant;

use serde::Serialize;

use super::vm::VM;

/// GC statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub cycles: usize,
    pub total_pause_us: u64,
    pub max_pause_us: u64,
    pub objects_freed: usize,
    pub bytes_freed: usize,
}

impl VM {
    pub(super) fn collect_garbage(&mut self) {
        let start = Instant::now();
        let before = self.heap.bytes_allocated();
        log::debug!("-- gc begin ({} bytes allocated)", before);

        self.mark_roots();
        self.heap.trace_references();
        let swept = self.heap.sweep();

        let pause_us = start.elapsed().as_micros() as u64;
        self.gc_stats.cycles += 1;
        self.gc_stats.total_pause_us += pause_us;
        self.gc_stats.max_pause_us = self.gc_stats.max_pause_us.max(pause_us);
        self.gc_stats.objects_freed += swept.objects_freed;
        self.gc_stats.bytes_freed += swept.bytes_freed;

        log::debug!(
            "-- gc end: collected {} bytes (from {} to {}), {} objects, next at {}",
            swept.bytes_freed,
            before,
            self.heap.bytes_allocated(),
            swept.objects_freed,
            self.heap.next_gc()
        );
    }

    fn mark_roots(&mut self) {
        for &value in &self.stack {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }

        let mut cursor = self.open_upvalues;
        while let Some(upvalue) = cursor {
            self.heap.mark_object(upvalue);
            cursor = self
                .heap
                .get(upvalue)
                .and_then(|object| object.as_upvalue())
                .and_then(|upvalue| upvalue.next);
        }

        self.heap.mark_table(&self.globals);
        self.heap.mark_object(self.init_string);
        self.heap.mark_interned();
    }

    /// Force a full collection outside the normal threshold check.
    pub fn collect_now(&mut self) {
        self.collect_garbage();
    }

    pub fn gc_stats(&self) -> &GcStats {
        &self.gc_stats
    }
}
