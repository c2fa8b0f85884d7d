//! Collector behaviour observed through whole-program runs.

mod common;
use common::*;

fn stress_config() -> VmConfig {
    VmConfig {
        gc_stress: true,
        ..VmConfig::default()
    }
}

fn tight_config() -> VmConfig {
    VmConfig {
        initial_gc_threshold: 2048,
        min_gc_threshold: 2048,
        ..VmConfig::default()
    }
}

/// Builds lists, strings, closures and instances, keeping some of them
/// alive in globals and dropping the rest.
fn mixed_workload(asm: &mut Assembler, heap: &mut Heap) {
    let make = function(heap, "make", 1, 0, |asm, _| {
        asm.op(OpCode::NewList)
            .op_with(OpCode::GetLocal, 1)
            .op(OpCode::AddList)
            .op(OpCode::Return);
    });
    asm.closure(make, &[]).named(OpCode::DefineGlobal, heap, "make");
    asm.op(OpCode::NewList).named(OpCode::DefineGlobal, heap, "kept");
    asm.named(OpCode::Class, heap, "Cell")
        .named(OpCode::DefineGlobal, heap, "Cell");

    counted_loop(asm, heap, "i", 50.0, |asm, heap| {
        // Garbage: a list built through a call.
        asm.named(OpCode::GetGlobal, heap, "make")
            .named(OpCode::GetGlobal, heap, "i")
            .op_with(OpCode::Call, 1)
            .op(OpCode::Pop);
        // Garbage: an instance with a field.
        asm.named(OpCode::GetGlobal, heap, "Cell")
            .op_with(OpCode::Call, 0)
            .named(OpCode::GetGlobal, heap, "i")
            .named(OpCode::SetProperty, heap, "v")
            .op(OpCode::Pop);
        // Kept: every iteration's index.
        asm.named(OpCode::GetGlobal, heap, "kept")
            .named(OpCode::GetGlobal, heap, "i")
            .op(OpCode::AddList)
            .op(OpCode::Pop);
    });

    asm.named(OpCode::GetGlobal, heap, "kept")
        .number(49.0)
        .op(OpCode::Subscript)
        .op(OpCode::Print);
    asm.string(heap, "done").string(heap, "!").op(OpCode::Add);
    asm.op(OpCode::Print);
}

#[test]
fn test_stress_mode_preserves_output() {
    let mut plain = Harness::new();
    plain.run(mixed_workload).unwrap();

    let mut stressed = Harness::with_config(stress_config());
    stressed.run(mixed_workload).unwrap();

    assert_eq!(plain.output(), "49\ndone!\n");
    assert_eq!(stressed.output(), plain.output());
    assert!(stressed.vm.gc_stats().cycles > 0);
}

#[test]
fn test_garbage_is_reclaimed_under_low_threshold() {
    let mut h = Harness::with_config(tight_config());
    h.run(|asm, heap| {
        counted_loop(asm, heap, "i", 2000.0, |asm, heap| {
            number_list(asm, &[1.0, 2.0, 3.0]);
            asm.named(OpCode::GetGlobal, heap, "i").op(OpCode::AddList);
            asm.op(OpCode::Pop);
        });
    })
    .unwrap();

    let stats = h.vm.gc_stats().clone();
    assert!(stats.cycles > 0);
    assert!(stats.objects_freed > 0);
    assert!(stats.bytes_freed > 0);
    assert!(stats.max_pause_us <= stats.total_pause_us);

    h.vm.collect_now();
    assert!(h.vm.heap().object_count() < 100);
}

#[test]
fn test_globals_survive_collection() {
    let mut h = Harness::new();
    h.run(|asm, heap| {
        number_list(asm, &[1.0, 2.0]);
        asm.named(OpCode::DefineGlobal, heap, "xs");
        asm.string(heap, "k").number(7.0).op_with(OpCode::NewDict, 1);
        asm.named(OpCode::DefineGlobal, heap, "d");
    })
    .unwrap();

    h.vm.collect_now();
    h.vm.collect_now();

    h.run(|asm, heap| {
        asm.named(OpCode::GetGlobal, heap, "xs").op(OpCode::Print);
        asm.named(OpCode::GetGlobal, heap, "d").op(OpCode::Print);
    })
    .unwrap();
    assert_eq!(h.output(), "[1, 2]\n{\"k\": 7}\n");
}

#[test]
fn test_interned_strings_are_never_collected() {
    let mut h = Harness::with_config(stress_config());
    h.run(|asm, heap| {
        asm.string(heap, "tran")
            .string(heap, "sient")
            .op(OpCode::Add)
            .op(OpCode::Pop);
    })
    .unwrap();

    h.vm.collect_now();
    let heap = h.vm.heap();
    let transient = heap.find_string("transient").unwrap();
    assert_eq!(heap.string(transient), Some("transient"));
}

#[test]
fn test_closed_upvalues_survive_stress() {
    let mut h = Harness::with_config(stress_config());
    h.run(|asm, heap| {
        let show = function(heap, "show", 0, 1, |asm, _| {
            asm.op_with(OpCode::GetUpvalue, 0)
                .op(OpCode::Print)
                .op(OpCode::Nil)
                .op(OpCode::Return);
        });
        // fun outer() { var s = [1, 2]; return fun () { print s; }; }
        let outer = function(heap, "outer", 0, 0, |asm, _| {
            number_list(asm, &[1.0, 2.0]);
            asm.closure(show, &[(true, 1)]).op(OpCode::Return);
        });
        asm.closure(outer, &[])
            .op_with(OpCode::Call, 0)
            .named(OpCode::DefineGlobal, heap, "show");
        // Allocate garbage so the closed-over list has to survive sweeps.
        counted_loop(asm, heap, "i", 20.0, |asm, _| {
            number_list(asm, &[0.0]);
            asm.op(OpCode::Pop);
        });
        asm.named(OpCode::GetGlobal, heap, "show")
            .op_with(OpCode::Call, 0)
            .op(OpCode::Pop);
    })
    .unwrap();
    assert_eq!(h.output(), "[1, 2]\n");
}

#[test]
fn test_unrooted_function_is_collected_between_runs() {
    let mut h = Harness::with_config(stress_config());
    let orphan = h.script(|asm, _| {
        asm.number(1.0).op(OpCode::Print);
    });
    h.run(|asm, _| {
        number_list(asm, &[1.0]);
        asm.op(OpCode::Pop);
    })
    .unwrap();

    assert!(!h.vm.heap().contains(orphan));
    let err = h.vm.run_function(orphan).unwrap_err();
    assert!(matches!(err.error, VmError::Internal(_)));
}

#[test]
fn test_disabled_gc_never_collects() {
    let config = VmConfig {
        gc_enabled: false,
        ..tight_config()
    };
    let mut h = Harness::with_config(config);
    h.run(|asm, heap| {
        counted_loop(asm, heap, "i", 500.0, |asm, _| {
            number_list(asm, &[1.0]);
            asm.op(OpCode::Pop);
        });
    })
    .unwrap();
    assert_eq!(h.vm.gc_stats().cycles, 0);
}
