//! Manual dump mode: sample until exit, then write the order file.

mod common;

use std::sync::Arc;

use common::{sim_trace, wait_until, SimRuntime};
use jbolt::domain::OrderEntry;
use jbolt::order::load_order_file;
use jbolt::{JBolt, JBoltFlags, Mode};

fn init_dump(runtime: &Arc<SimRuntime>, path: &std::path::Path) -> Arc<JBolt> {
    let flags = JBoltFlags {
        enable: true,
        dump_mode: true,
        order_file: Some(path.to_path_buf()),
        ..JBoltFlags::default()
    };
    let jbolt = JBolt::init(&flags, Arc::clone(runtime) as Arc<dyn jbolt::host::RuntimeHost>)
        .expect("valid config")
        .expect("enabled");
    runtime.attach(&jbolt);
    jbolt
}

#[test]
fn test_dump_mode_samples_until_exit_then_writes() {
    let runtime = SimRuntime::new();
    runtime.add_method("alpha", 256);
    runtime.add_method("beta", 128);
    runtime.add_method("gamma", 512);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("order.txt");
    let jbolt = init_dump(&runtime, &path);

    assert_eq!(jbolt.mode(), Mode::Dump);
    wait_until("profiling", || jbolt.phase().is_profiling());
    assert!(runtime.sampler_running());

    assert!(jbolt.submit_trace(&sim_trace(&runtime, 1, 4, &["alpha", "beta"])));
    assert!(jbolt.submit_trace(&sim_trace(&runtime, 2, 9, &["gamma", "beta"])));

    let written = jbolt.dump_order_at_exit().expect("dump succeeds");
    assert_eq!(written, path);
    assert!(!runtime.sampler_running());

    let mut symbols = jbolt::domain::SymbolTable::new();
    let order = load_order_file(&path, &mut symbols).unwrap();
    let methods: Vec<String> = order
        .iter()
        .filter_map(OrderEntry::as_method)
        .map(|m| m.key.name().to_string())
        .collect();
    // both callees merge into their caller's cluster, hotter one first
    assert_eq!(methods, ["beta", "gamma", "alpha"]);
}

#[test]
fn test_existing_order_file_is_overwritten_in_dump_mode() {
    let runtime = SimRuntime::new();
    runtime.add_method("alpha", 256);
    runtime.add_method("beta", 128);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("order.txt");
    std::fs::write(&path, "stale contents\n").unwrap();

    let jbolt = init_dump(&runtime, &path);
    // the stale file was removed at startup
    assert!(!path.exists());

    wait_until("profiling", || jbolt.phase().is_profiling());
    assert!(jbolt.submit_trace(&sim_trace(&runtime, 1, 2, &["alpha", "beta"])));
    jbolt.dump_order_at_exit().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("C\n"));
    assert!(contents.contains("M 256 com/sim/App alpha ()V"));
}
