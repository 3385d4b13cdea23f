//! The process-wide jbolt context.
//!
//! One [`JBolt`] value owns everything the subsystem shares between threads:
//! the phase machine, the signal word, the call graph, the sampled-method
//! refs, the hot-method table and the segment selectors. Sampler threads
//! enter through [`JBolt::submit_trace`], compiler threads through
//! [`JBolt::placement_segment`], the operator through [`crate::commands`],
//! and the control thread drives cycles through the `pub(crate)` methods at
//! the bottom.
//!
//! # Locking
//!
//! `symbols`, `sampled` and `graph` are only ever taken together inside
//! `submit_trace` (in that order) or individually by the control thread
//! after sampling has stopped, so there is no path that acquires them in a
//! conflicting order. The hot table is read-mostly: compiler threads take
//! the read lock in the placement hook; only the control thread writes.

// Threshold arithmetic deliberately truncates (counts are small)
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::commands;
use crate::config::{self, JBoltFlags, JBoltOptions, Mode, REORDER_THRESHOLD};
use crate::control::{spawn_control_thread, ControlSignals, PhaseState};
use crate::domain::{
    CodeSegment, CommandError, CompLevel, CompileReason, ConfigError, MethodKey, OrderEntry,
    OrderFileError, SymbolTable,
};
use crate::graph::{hfsort, CallGraph};
use crate::host::{CompileRequest, RuntimeHost, StrongMethod};
use crate::order;
use crate::profiling::{SampleIngestor, SampledMethods};
use crate::reorder::recompile::{self, CompileTaskInfo, HotMethods};
use crate::reorder::{plan_hot_segments, segment_size_with_padding, SegmentSelectors};

/// How a cycle ended; drives the control thread's phase cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleEnd {
    Completed,
    Aborted,
    Shutdown,
}

pub struct JBolt {
    options: JBoltOptions,
    host: Arc<dyn RuntimeHost>,
    phase: PhaseState,
    signals: ControlSignals,
    segments: SegmentSelectors,
    code_heap_size: u64,

    symbols: Mutex<SymbolTable>,
    sampled: Mutex<SampledMethods>,
    graph: Mutex<CallGraph>,

    hot: RwLock<HotMethods>,
    reorderable_cnt: AtomicI32,
    reorder_threshold_cnt: AtomicI32,
    cur_reordering: RwLock<Option<MethodKey>>,
    last_order: Mutex<Option<Vec<OrderEntry>>>,

    control: Mutex<Option<JoinHandle<()>>>,
}

impl JBolt {
    /// Initialize the subsystem against `host`.
    ///
    /// Returns `Ok(None)` when the master enable is off. On success the
    /// control thread is already running (auto and load modes) and the
    /// sampler is recording (auto and dump modes).
    pub fn init(
        flags: &JBoltFlags,
        host: Arc<dyn RuntimeHost>,
    ) -> Result<Option<Arc<JBolt>>, ConfigError> {
        let caps = host.capabilities();
        let Some(options) = config::validate(flags, &caps)? else {
            return Ok(None);
        };

        let mut symbols = SymbolTable::new();
        let mut hot = HotMethods::new();
        let mut threshold = 0i32;

        // Size the hot segments, from the order file when load mode left the
        // size defaulted.
        let code_heap_size = match (options.code_heap_size, options.mode) {
            (Some(size), _) => size,
            (None, Mode::Load) => {
                let path = options.order_file.as_deref().expect("checked in validate");
                let scan = order::scan_order_file(path, caps.code_segment_grain)?;
                let sized =
                    segment_size_with_padding(scan.total_code_size, caps.page_size as u64);
                info!(
                    "auto set CodeHeapSize={} B ({} MB)",
                    sized,
                    sized / 1024 / 1024
                );
                sized
            }
            (None, _) => unreachable!("validate resolves the default outside load mode"),
        };
        if options.mode != Mode::Dump {
            plan_hot_segments(code_heap_size, &caps)?;
        }

        // Load mode parses the order file again, now interning symbols.
        if options.mode == Mode::Load {
            let path = options.order_file.as_deref().expect("checked in validate");
            let entries = order::load_order_file(path, &mut symbols)?;
            for entry in &entries {
                if let OrderEntry::Method(m) = entry {
                    if !hot.push_key(m.key.clone()) {
                        return Err(ConfigError::OrderFile(OrderFileError::DuplicateMethod(
                            m.key.clone(),
                        )));
                    }
                }
            }
            threshold = (hot.len() as f64 * REORDER_THRESHOLD) as i32;
        }

        let interval = options.sample_interval_secs;
        let jbolt = Arc::new(JBolt {
            phase: PhaseState::new(options.mode),
            options,
            host,
            signals: ControlSignals::new(interval),
            segments: SegmentSelectors::new(),
            code_heap_size,
            symbols: Mutex::new(symbols),
            sampled: Mutex::new(SampledMethods::new()),
            graph: Mutex::new(CallGraph::new(caps.page_size)),
            hot: RwLock::new(hot),
            reorderable_cnt: AtomicI32::new(0),
            reorder_threshold_cnt: AtomicI32::new(threshold),
            cur_reordering: RwLock::new(None),
            last_order: Mutex::new(None),
            control: Mutex::new(None),
        });

        match jbolt.options.mode {
            Mode::Dump => {
                // Sampling runs until process exit; no control thread.
                assert!(jbolt.phase.available_to_profiling());
                jbolt.start_sampler_logged();
            }
            Mode::Auto => {
                // The control thread does the Available→Profiling transition
                // itself at the top of each cycle.
                jbolt.start_sampler_logged();
                let handle = spawn_control_thread(Arc::clone(&jbolt))
                    .map_err(ConfigError::ControlThreadSpawn)?;
                *jbolt.control.lock() = Some(handle);
            }
            Mode::Load => {
                assert!(jbolt.phase.available_to_collecting());
                let handle = spawn_control_thread(Arc::clone(&jbolt))
                    .map_err(ConfigError::ControlThreadSpawn)?;
                *jbolt.control.lock() = Some(handle);
            }
        }

        info!("initialized: mode={}", jbolt.options.mode.as_str());
        Ok(Some(jbolt))
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.options.mode
    }

    #[must_use]
    pub fn options(&self) -> &JBoltOptions {
        &self.options
    }

    #[must_use]
    pub fn phase(&self) -> &PhaseState {
        &self.phase
    }

    #[must_use]
    pub fn signals(&self) -> &ControlSignals {
        &self.signals
    }

    #[must_use]
    pub fn segments(&self) -> &SegmentSelectors {
        &self.segments
    }

    #[must_use]
    pub fn code_heap_size(&self) -> u64 {
        self.code_heap_size
    }

    /// The last computed order, if any (for the dump command and tests).
    #[must_use]
    pub fn last_order(&self) -> Option<Vec<OrderEntry>> {
        self.last_order.lock().clone()
    }

    // =========================================================================
    // SAMPLER ENTRY
    // =========================================================================

    /// Ingest one sampled trace. Ignored (returning `false`) outside the
    /// sampling phases.
    pub fn submit_trace(&self, sample: &jbolt_common::SampledTrace) -> bool {
        if !self.phase.is_profiling_or_waiting() {
            return false;
        }
        let mut symbols = self.symbols.lock();
        let mut sampled = self.sampled.lock();
        let mut graph = self.graph.lock();
        let mut ingestor =
            SampleIngestor::new(&mut graph, &mut sampled, &mut symbols, self.host.as_ref());
        ingestor.ingest(sample);
        true
    }

    // =========================================================================
    // COMPILER ENTRY (placement hook)
    // =========================================================================

    /// Decide where a freshly compiled body should be placed.
    ///
    /// `None` means "not decided here": the host uses its default placement.
    /// Invoked by compiler threads for every code installation while the
    /// subsystem is enabled.
    pub fn placement_segment(
        &self,
        method: &StrongMethod,
        level: CompLevel,
        is_osr: bool,
    ) -> Option<CodeSegment> {
        // Only the non-profiled region is laid out; OSR bodies never move.
        if !level.targets_non_profiled() || is_osr {
            return None;
        }

        if self.phase.is_reordering() {
            let current = self.cur_reordering.read();
            if current.as_ref() == Some(&method.key()) {
                trace!("compiling to hot heap: method={}", method.key());
                return Some(self.segments.primary());
            }
            return None;
        }

        if !self.phase.is_collecting() {
            return None;
        }

        // Manual load mode: stage every hot-listed method in the secondary
        // segment and capture its compile task on first sight.
        let key = method.key();
        let hot = self.hot.read();
        let slot = hot.slot(&key)?;
        if slot.info().is_none() {
            let info = CompileTaskInfo::new(method.demote(), level, CompileReason::Reorder);
            if slot.capture(info) {
                let cnt = self.reorderable_cnt.fetch_add(1, Ordering::AcqRel) + 1;
                let threshold = self.reorder_threshold_cnt.load(Ordering::Acquire);
                trace!("reorderable method found: cnt={cnt}, lvl={level:?}, method={key}");
                if (threshold - cnt) > 0 && (threshold - cnt).count_ones() == 1 {
                    debug!("reorderable cnt: {cnt}/{threshold}/{}", hot.len());
                }
                if cnt == threshold {
                    info!("time to reorder: {cnt}/{threshold}/{}", hot.len());
                    self.signals.notify_control_recheck();
                }
            }
        }
        Some(self.segments.secondary())
    }

    /// Whether enough hot methods have been observed to reorder (load mode).
    #[must_use]
    pub fn can_reorder_now(&self) -> bool {
        self.reorderable_cnt.load(Ordering::Acquire)
            >= self.reorder_threshold_cnt.load(Ordering::Acquire)
    }

    // =========================================================================
    // OPERATOR ENTRY
    // =========================================================================

    /// Write the last computed order to `path` (the dump command).
    pub fn dump_order(&self, path: &Path) -> Result<PathBuf, CommandError> {
        let order = self.last_order.lock();
        let Some(order) = order.as_ref() else {
            return Err(CommandError::OrderNull);
        };
        order::write_order_file(path, order)
            .map_err(|_| CommandError::OpenFileError(path.to_path_buf()))?;
        Ok(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
    }

    /// Manual dump mode, invoked at process exit: compute the order from
    /// everything sampled so far and write it to the configured order file.
    pub fn dump_order_at_exit(&self) -> Result<PathBuf, OrderFileError> {
        assert_eq!(self.options.mode, Mode::Dump, "manual dump mode only");
        assert!(self.phase.profiling_to_waiting(), "phase owned by caller");
        self.host.stop_sampler();

        let snapshot = self.graph.lock().snapshot();
        let order = hfsort(&snapshot, &self.options.policy);

        let path = self
            .options
            .order_file
            .as_deref()
            .expect("checked in validate");
        order::write_order_file(path, &order)?;
        info!("order generate successful: {} entries", order.len());

        self.sampled.lock().clear();
        Ok(path.to_path_buf())
    }

    /// Convenience wrappers over [`crate::commands`].
    pub fn command_start(&self, duration_secs: Option<u64>) -> Result<String, CommandError> {
        commands::start(self, duration_secs)
    }

    pub fn command_stop(&self) -> Result<String, CommandError> {
        commands::stop(self)
    }

    pub fn command_abort(&self) -> Result<String, CommandError> {
        commands::abort(self)
    }

    pub fn command_dump(&self, path: &Path) -> Result<String, CommandError> {
        commands::dump(self, path)
    }

    /// Tear down: stop the control thread and join it. Tied to runtime
    /// shutdown.
    pub fn shutdown(&self) {
        self.signals.request_shutdown();
        if let Some(handle) = self.control.lock().take() {
            if handle.join().is_err() {
                warn!("control thread panicked during shutdown");
            }
        }
    }

    // =========================================================================
    // CONTROL-THREAD STEPS
    // =========================================================================

    fn start_sampler_logged(&self) {
        if let Err(e) = self.host.start_sampler() {
            // The cycle still runs; it will simply see an empty graph.
            warn!("unable to start sampler: {e}");
        }
    }

    /// Pre-clear: restore the state before any sample, then restart the
    /// sampler. Second and later cycles only.
    pub(crate) fn pre_cycle(&self) {
        self.graph.lock().clear();
        self.sampled.lock().clear();
        self.hot.write().clear();
        self.host.clear_sampler();
        self.start_sampler_logged();
    }

    /// One sampling-and-reordering cycle. Entered with phase Profiling,
    /// leaves with phase Reordering (completed) or Waiting (aborted or
    /// shutting down).
    pub(crate) fn run_cycle(&self, first_cycle: bool) -> CycleEnd {
        let interval = self.signals.sample_interval_secs();
        info!("starting sample for {interval}s");
        self.signals
            .sample_window(std::time::Duration::from_secs(interval));

        assert!(self.phase.profiling_to_waiting(), "cycle owns this transition");
        self.host.stop_sampler();

        if self.signals.is_shutdown() {
            return CycleEnd::Shutdown;
        }
        if self.signals.take_abort() {
            return CycleEnd::Aborted;
        }

        let snapshot = self.graph.lock().snapshot();
        let order = hfsort(&snapshot, &self.options.policy);
        *self.last_order.lock() = Some(order.clone());

        let total_code_size = self.build_hot_methods_from_order(&order);
        info!("order generate successful: {} entries", order.len());

        if total_code_size > self.code_heap_size {
            warn!(
                "reordering not complete because the hot code heap is too small \
                 to place all ordered methods; please enlarge CodeHeapSize"
            );
            warn!(
                "CodeHeapSize={} B (need {} B)",
                self.code_heap_size, total_code_size
            );
        }

        if !first_cycle {
            self.segments.swap();
        }

        assert!(self.phase.waiting_to_reordering(), "cycle owns this transition");
        self.signals.clear_signal();

        self.reorder_all_methods();
        CycleEnd::Completed
    }

    /// Fill the hot-method table from a computed order, capturing a compile
    /// task for every method that still resolves to a live compiled body.
    ///
    /// Returns the total padded code size of the captured methods.
    fn build_hot_methods_from_order(&self, order: &[OrderEntry]) -> u64 {
        let grain = self.host.capabilities().code_segment_grain;
        let sampled = self.sampled.lock();
        let mut hot = self.hot.write();
        let mut total = 0u64;

        for entry in order {
            let OrderEntry::Method(m) = entry else {
                continue;
            };
            let Some(handle) = sampled.get(&m.key) else {
                continue;
            };
            let Some(strong) = handle.promote() else {
                debug!("method unloaded between sampling and ordering: {}", m.key);
                continue;
            };
            let Some(info) = CompileTaskInfo::from_code(&strong, CompileReason::Reorder) else {
                continue;
            };
            if hot.push_with_info(m.key.clone(), info) {
                total += order::pad_to_grain(u64::from(m.size), grain);
            }
        }
        total
    }

    /// Recompile every captured hot method, in order, into the primary
    /// segment. Per-method failures are logged and skipped.
    pub(crate) fn reorder_all_methods(&self) {
        assert!(self.phase.is_reordering(), "reorder requires phase Reordering");
        info!("start to reorder");

        let keys: Vec<MethodKey> = self.hot.read().sorted().to_vec();
        for key in keys {
            let info = {
                let hot = self.hot.read();
                let Some(info) = hot.slot(&key).and_then(|s| s.info().cloned()) else {
                    continue;
                };
                info
            };
            let Some(strong) = info.try_select() else {
                continue;
            };

            *self.cur_reordering.write() = Some(key.clone());
            if let Err(e) = self.recompile_one(&info, &strong) {
                warn!("failed to recompile the method: {key}: {e}");
            }
        }

        info!("reordering succeeds");
    }

    fn recompile_one(
        &self,
        info: &CompileTaskInfo,
        strong: &StrongMethod,
    ) -> Result<(), crate::domain::ReorderError> {
        let key = strong.key();
        trace!("start to recompile & reorder: method={key}");

        let ticket = self.host.enqueue_compile(CompileRequest {
            method: strong.clone(),
            level: info.level().adapted_for_recompile(),
            reason: info.reason(),
        })?;
        recompile::wait_for_compile(&ticket, &key)?;

        if let Err(e) = recompile::check_compiled_result(strong, self.segments.primary()) {
            warn!("{e}");
        }
        Ok(())
    }

    /// Post-clear: evacuate the former-primary (now secondary) segment by
    /// recompiling its live methods back to the non-profiled region, then
    /// sweep until the segment is empty (bounded at 3 attempts).
    pub(crate) fn post_cycle(&self) {
        assert!(self.phase.is_available(), "evacuation requires phase Available");
        let secondary = self.segments.secondary();

        for strong in self.host.methods_in_segment(secondary) {
            let Some(info) = CompileTaskInfo::from_code(&strong, CompileReason::Evacuate) else {
                continue;
            };
            let key = strong.key();
            let result = self
                .host
                .enqueue_compile(CompileRequest {
                    method: strong.clone(),
                    level: info.level(),
                    reason: info.reason(),
                })
                .map_err(crate::domain::ReorderError::from)
                .and_then(|ticket| recompile::wait_for_compile(&ticket, &key));
            match result {
                Ok(()) => {
                    if let Err(e) =
                        recompile::check_compiled_result(&strong, CodeSegment::NonProfiled)
                    {
                        warn!("{e}");
                    }
                }
                Err(e) => warn!("failed to evacuate method: {key}: {e}"),
            }
        }

        for _ in 0..3 {
            self.host.sweep_code_cache();
            if self.host.methods_in_segment(secondary).is_empty() {
                break;
            }
        }
        if !self.host.methods_in_segment(secondary).is_empty() {
            warn!("secondary segment not empty after sweeping: {secondary}");
        }
        info!("sweep secondary segment");
    }

    /// Drop per-cycle state once the next start signal has arrived.
    pub(crate) fn clear_cycle_structures(&self) {
        self.sampled.lock().clear();
        *self.cur_reordering.write() = None;
        self.hot.write().clear();
    }
}
