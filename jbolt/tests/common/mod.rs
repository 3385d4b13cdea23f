#![allow(dead_code)] // each test binary uses a different slice of this module

//! In-process simulated runtime for integration tests.
//!
//! `SimRuntime` stands in for the host: it resolves frames against a
//! registry of simulated methods, "compiles" synchronously by asking the
//! placement hook where the body should go, and tracks which segment each
//! method currently occupies.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use jbolt::domain::{CodeSegment, CompLevel, HostError, MethodKey, SymbolTable};
use jbolt::host::{
    CompileOutcome, CompileRequest, CompiledCodeInfo, HostCapabilities, MethodLookup, MethodRef,
    RuntimeHost, StrongMethod,
};
use jbolt::JBolt;
use jbolt_common::{FrameKind, SampledFrame, SampledTrace};

pub const SIM_CLASS: &str = "com/sim/App";

pub struct SimMethodState {
    key: MethodKey,
    size: u32,
    is_osr: bool,
    alive: AtomicBool,
    level: Mutex<CompLevel>,
    segment: Mutex<Option<CodeSegment>>,
}

#[derive(Clone)]
pub struct SimMethodRef {
    state: Arc<SimMethodState>,
}

impl MethodRef for SimMethodRef {
    fn key(&self) -> MethodKey {
        self.state.key.clone()
    }

    fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::Acquire)
    }

    fn promote(&self) -> Option<StrongMethod> {
        self.is_alive()
            .then(|| StrongMethod(Arc::new(self.clone())))
    }

    fn demote(&self) -> Arc<dyn MethodRef> {
        Arc::new(self.clone())
    }

    fn code(&self) -> Option<CompiledCodeInfo> {
        let segment = (*self.state.segment.lock())?;
        Some(CompiledCodeInfo {
            size: self.state.size,
            level: *self.state.level.lock(),
            segment,
            is_osr: self.state.is_osr,
        })
    }
}

pub struct SimRuntime {
    methods: Mutex<Vec<Arc<SimMethodState>>>,
    jbolt: Mutex<Option<Weak<JBolt>>>,
    sampler_running: AtomicBool,
    pub sampler_starts: AtomicUsize,
    pub sampler_clears: AtomicUsize,
    pub sweeps: AtomicUsize,
    pub compiles: Mutex<Vec<(MethodKey, CodeSegment)>>,
    failing: Mutex<Vec<String>>,
    caps: HostCapabilities,
}

impl SimRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            methods: Mutex::new(Vec::new()),
            jbolt: Mutex::new(None),
            sampler_running: AtomicBool::new(false),
            sampler_starts: AtomicUsize::new(0),
            sampler_clears: AtomicUsize::new(0),
            sweeps: AtomicUsize::new(0),
            compiles: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            caps: HostCapabilities {
                top_tier_jit: true,
                segmented_code_cache: true,
                page_size: 4096,
                code_segment_grain: 128,
                non_profiled_capacity: 64 * 1024 * 1024,
                heap_alignment: 4096,
            },
        })
    }

    /// Wire the placement hook once the context exists.
    pub fn attach(&self, jbolt: &Arc<JBolt>) {
        *self.jbolt.lock() = Some(Arc::downgrade(jbolt));
    }

    pub fn add_method(&self, name: &str, size: u32) -> Arc<SimMethodState> {
        self.add_method_at(name, size, CompLevel::FullOptimization, false)
    }

    pub fn add_method_at(
        &self,
        name: &str,
        size: u32,
        level: CompLevel,
        is_osr: bool,
    ) -> Arc<SimMethodState> {
        let mut symbols = SymbolTable::new();
        let state = Arc::new(SimMethodState {
            key: MethodKey::intern(&mut symbols, SIM_CLASS, name, "()V"),
            size,
            is_osr,
            alive: AtomicBool::new(true),
            level: Mutex::new(level),
            segment: Mutex::new(Some(CodeSegment::NonProfiled)),
        });
        self.methods.lock().push(state.clone());
        state
    }

    pub fn unload(&self, name: &str) {
        for state in self.methods.lock().iter() {
            if state.key.name().as_str() == name {
                state.alive.store(false, Ordering::Release);
            }
        }
    }

    pub fn make_compile_fail(&self, name: &str) {
        self.failing.lock().push(name.to_string());
    }

    pub fn segment_of(&self, name: &str) -> Option<CodeSegment> {
        self.methods
            .lock()
            .iter()
            .find(|s| s.key.name().as_str() == name)
            .and_then(|s| *s.segment.lock())
    }

    pub fn strong_ref(&self, name: &str) -> StrongMethod {
        let state = self
            .methods
            .lock()
            .iter()
            .find(|s| s.key.name().as_str() == name)
            .expect("unknown sim method")
            .clone();
        StrongMethod(Arc::new(SimMethodRef { state }))
    }

    pub fn sampler_running(&self) -> bool {
        self.sampler_running.load(Ordering::Acquire)
    }

    fn find(&self, key: &MethodKey) -> Option<Arc<SimMethodState>> {
        self.methods.lock().iter().find(|s| &s.key == key).cloned()
    }
}

impl MethodLookup for SimRuntime {
    fn lookup(
        &self,
        frame: &SampledFrame,
        symbols: &mut SymbolTable,
    ) -> Option<Arc<dyn MethodRef>> {
        let key = MethodKey::intern(symbols, &frame.class, &frame.name, &frame.signature);
        let state = self.find(&key)?;
        if !state.alive.load(Ordering::Acquire) {
            return None;
        }
        Some(Arc::new(SimMethodRef { state }))
    }
}

impl RuntimeHost for SimRuntime {
    fn enqueue_compile(
        &self,
        request: CompileRequest,
    ) -> Result<Receiver<CompileOutcome>, HostError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let key = request.method.key();
        let Some(state) = self.find(&key) else {
            tx.send(CompileOutcome::Failed("unknown method".to_string()))
                .ok();
            return Ok(rx);
        };

        if self
            .failing
            .lock()
            .iter()
            .any(|n| n == state.key.name().as_str())
        {
            tx.send(CompileOutcome::Failed("injected failure".to_string()))
                .ok();
            return Ok(rx);
        }

        // The broker consults the placement hook like any other compile.
        let hook = self.jbolt.lock().as_ref().and_then(Weak::upgrade);
        let routed =
            hook.and_then(|jbolt| jbolt.placement_segment(&request.method, request.level, state.is_osr));
        let default = if request.level.targets_non_profiled() {
            CodeSegment::NonProfiled
        } else {
            CodeSegment::Profiled
        };
        let placed = routed.unwrap_or(default);

        *state.segment.lock() = Some(placed);
        *state.level.lock() = request.level;
        self.compiles.lock().push((key, placed));
        tx.send(CompileOutcome::Completed).ok();
        Ok(rx)
    }

    fn methods_in_segment(&self, segment: CodeSegment) -> Vec<StrongMethod> {
        self.methods
            .lock()
            .iter()
            .filter(|s| s.alive.load(Ordering::Acquire) && *s.segment.lock() == Some(segment))
            .map(|s| StrongMethod(Arc::new(SimMethodRef { state: s.clone() })))
            .collect()
    }

    fn sweep_code_cache(&self) {
        self.sweeps.fetch_add(1, Ordering::AcqRel);
    }

    fn start_sampler(&self) -> Result<(), HostError> {
        self.sampler_starts.fetch_add(1, Ordering::AcqRel);
        self.sampler_running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop_sampler(&self) {
        self.sampler_running.store(false, Ordering::Release);
    }

    fn clear_sampler(&self) {
        self.sampler_clears.fetch_add(1, Ordering::AcqRel);
    }

    fn capabilities(&self) -> HostCapabilities {
        self.caps
    }
}

/// Build a trace, innermost frame first, using sim-method names.
pub fn sim_trace(runtime: &SimRuntime, trace_id: u64, hot_count: u32, names: &[&str]) -> SampledTrace {
    let frames = names
        .iter()
        .map(|name| {
            let size = runtime
                .methods
                .lock()
                .iter()
                .find(|s| s.key.name().as_str() == *name)
                .map_or(0, |s| s.size);
            SampledFrame {
                class: SIM_CLASS.to_string(),
                name: (*name).to_string(),
                signature: "()V".to_string(),
                kind: FrameKind::Jit,
                code_size: size,
            }
        })
        .collect();
    SampledTrace {
        trace_id,
        hash: trace_id.wrapping_mul(0x9e37_79b9),
        hot_count,
        frames,
    }
}

/// Spin until `cond` holds, panicking after 10 s.
pub fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}
