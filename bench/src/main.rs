use kiln::vm::assembler::Assembler;
use kiln::{GcRef, Heap, OpCode, VM, VmConfig};
use serde::Serialize;
use std::io;
use std::time::Instant;

#[derive(Serialize)]
struct BenchmarkResult {
    name: String,
    kiln_secs: f64,
    rust_time_secs: f64,
    gc_cycles: usize,
    gc_max_pause_us: u64,
}

#[derive(Serialize)]
struct BenchmarkOutput {
    results: Vec<BenchmarkResult>,
}

// Rust reference implementations

fn rust_sum_loop() {
    let mut sum: f64 = 0.0;
    let mut i = 0.0;
    while i < 1_000_000.0 {
        sum += i;
        i += 1.0;
    }
    eprintln!("{}", sum);
}

fn rust_fibonacci(n: u32) -> f64 {
    if n < 2 {
        n as f64
    } else {
        rust_fibonacci(n - 1) + rust_fibonacci(n - 2)
    }
}

fn rust_list_churn() {
    let mut kept = 0;
    for i in 0..200_000 {
        let list = vec![i as f64, 2.0 * i as f64];
        kept += list.len();
    }
    eprintln!("{}", kept);
}

fn time_rust<F>(f: F) -> f64
where
    F: FnOnce(),
{
    let start = Instant::now();
    f();
    start.elapsed().as_secs_f64()
}

// Bytecode workloads

/// `counter = 0; while (counter < limit) { body; counter = counter + 1; }`
fn counted_loop(
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

fn sum_loop(heap: &mut Heap) -> GcRef {
    let mut asm = Assembler::new();
    asm.number(0.0).named(OpCode::DefineGlobal, heap, "sum");
    counted_loop(&mut asm, heap, "i", 1_000_000.0, |asm, heap| {
        asm.named(OpCode::GetGlobal, heap, "sum")
            .named(OpCode::GetGlobal, heap, "i")
            .op(OpCode::Add)
            .named(OpCode::SetGlobal, heap, "sum")
            .op(OpCode::Pop);
    });
    asm.named(OpCode::GetGlobal, heap, "sum").op(OpCode::Print);
    asm.op(OpCode::Nil).op(OpCode::Return);
    asm.finish(heap, None, 0, 0).expect("sum_loop assembles")
}

fn fibonacci(heap: &mut Heap, n: f64) -> GcRef {
    let mut fib = Assembler::new();
    fib.op_with(OpCode::GetLocal, 1).number(2.0).op(OpCode::Less);
    let recurse = fib.jump(OpCode::JumpIfFalse);
    fib.op(OpCode::Pop).op_with(OpCode::GetLocal, 1).op(OpCode::Return);
    fib.bind(recurse);
    fib.op(OpCode::Pop);
    for k in [1.0, 2.0] {
        fib.named(OpCode::GetGlobal, heap, "fib")
            .op_with(OpCode::GetLocal, 1)
            .number(k)
            .op(OpCode::Subtract)
            .op_with(OpCode::Call, 1);
    }
    fib.op(OpCode::Add).op(OpCode::Return);
    let fib = fib.finish(heap, Some("fib"), 1, 0).expect("fib assembles");

    let mut asm = Assembler::new();
    asm.closure(fib, &[]).named(OpCode::DefineGlobal, heap, "fib");
    asm.named(OpCode::GetGlobal, heap, "fib")
        .number(n)
        .op_with(OpCode::Call, 1)
        .op(OpCode::Print);
    asm.op(OpCode::Nil).op(OpCode::Return);
    asm.finish(heap, None, 0, 0).expect("fibonacci assembles")
}

fn list_churn(heap: &mut Heap) -> GcRef {
    let mut asm = Assembler::new();
    counted_loop(&mut asm, heap, "i", 200_000.0, |asm, heap| {
        asm.op(OpCode::NewList)
            .named(OpCode::GetGlobal, heap, "i")
            .op(OpCode::AddList)
            .number(2.0)
            .named(OpCode::GetGlobal, heap, "i")
            .op(OpCode::Multiply)
            .op(OpCode::AddList)
            .op(OpCode::Pop);
    });
    asm.op(OpCode::Nil).op(OpCode::Return);
    asm.finish(heap, None, 0, 0).expect("list_churn assembles")
}

fn run_kiln_benchmark(name: &str, build: fn(&mut Heap) -> GcRef) -> (f64, VM) {
    let config = VmConfig {
        initial_gc_threshold: 256 * 1024,
        ..VmConfig::default()
    };
    let mut vm = VM::with_config(config);
    vm.set_output(Box::new(io::sink()));
    let function = build(vm.heap_mut());

    let start = Instant::now();
    let result = vm.run_function(function);
    let elapsed = start.elapsed().as_secs_f64();

    if let Err(e) = result {
        eprintln!("Kiln benchmark {} failed: {}", name, e);
    }
    (elapsed, vm)
}

fn main() {
    env_logger::init();
    let mut results = Vec::new();

    let workloads: [(&str, fn(&mut Heap) -> GcRef, f64); 3] = [
        ("sum_loop", sum_loop, time_rust(rust_sum_loop)),
        (
            "fibonacci",
            |heap| fibonacci(heap, 25.0),
            time_rust(|| eprintln!("{}", rust_fibonacci(25))),
        ),
        ("list_churn", list_churn, time_rust(rust_list_churn)),
    ];

    for (name, build, rust_time) in workloads {
        let (kiln_secs, vm) = run_kiln_benchmark(name, build);
        log::info!("{}: {:.3}s", name, kiln_secs);
        results.push(BenchmarkResult {
            name: name.to_string(),
            kiln_secs,
            rust_time_secs: rust_time,
            gc_cycles: vm.gc_stats().cycles,
            gc_max_pause_us: vm.gc_stats().max_pause_us,
        });
    }

    let output = BenchmarkOutput { results };
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}
