//! Loading configuration from disk and wiring it into a VM.

mod common;
use common::*;

use kiln::ConfigError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kiln.toml");
    fs::write(&path, "frames_max = 4\ngc_stress = true\n").unwrap();

    let config = VmConfig::load(&path).unwrap();
    assert_eq!(config.frames_max, 4);
    assert!(config.gc_stress);
    assert_eq!(config.gc_grow_factor, VmConfig::default().gc_grow_factor);
}

#[test]
fn test_loaded_frames_max_limits_recursion() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kiln.toml");
    fs::write(&path, "frames_max = 4\n").unwrap();

    let mut h = Harness::with_config(VmConfig::load(&path).unwrap());
    let err = h
        .run(|asm, heap| {
            let f = function(heap, "f", 0, 0, |asm, heap| {
                asm.named(OpCode::GetGlobal, heap, "f")
                    .op_with(OpCode::Call, 0)
                    .op(OpCode::Return);
            });
            asm.closure(f, &[]).named(OpCode::DefineGlobal, heap, "f");
            asm.named(OpCode::GetGlobal, heap, "f").op_with(OpCode::Call, 0);
        })
        .unwrap_err();
    assert_eq!(err.error, VmError::StackOverflow);
    assert_eq!(err.trace.len(), 4);
    assert_eq!(h.vm.config().frames_max, 4);
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("saved.toml");
    let config = VmConfig {
        frames_max: 128,
        min_gc_threshold: 4096,
        gc_stats: true,
        ..VmConfig::default()
    };
    config.save(&path).unwrap();
    assert_eq!(VmConfig::load(&path).unwrap(), config);
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    match VmConfig::load(&path) {
        Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected read error, got {:?}", other),
    }
}

#[test]
fn test_invalid_values_are_rejected() {
    assert!(matches!(
        VmConfig::from_toml_str("gc_grow_factor = 0"),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        VmConfig::from_toml_str("frames_max = \"deep\""),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_gc_stats_serialize_to_json() {
    let mut h = Harness::with_config(VmConfig {
        gc_stress: true,
        ..VmConfig::default()
    });
    h.run(|asm, _| {
        number_list(asm, &[1.0, 2.0]);
        asm.op(OpCode::Print);
    })
    .unwrap();

    let json = serde_json::to_value(h.vm.gc_stats()).unwrap();
    assert!(json["cycles"].as_u64().unwrap() > 0);
    for key in ["total_pause_us", "max_pause_us", "objects_freed", "bytes_freed"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
}
