//! Arena-backed call-graph store.
//!
//! Funcs, call edges and clusters live in three flat arenas indexed by
//! [`FuncId`], [`CallId`] and [`ClusterId`]. Nothing here owns a pointer to
//! anything else; the ids are the only cross-references, which keeps the
//! whole graph trivially cloneable for the snapshot handed to the sorter.
//!
//! The store is mutated only while a sampling window is open. During that
//! window every func sits in its own singleton cluster, so cluster heat and
//! size mirror the func's exactly; merging only ever happens on the sorter's
//! copies.

// Density is heat over bytes; the i64→f64 conversion is intentional
#![allow(clippy::cast_precision_loss)]

use crate::domain::{CallId, ClusterId, FuncId, GraphError, MethodKey, TraceId};

/// A func node: one compiled method observed in sampled stacks.
#[derive(Debug, Clone)]
pub struct Func {
    key: MethodKey,
    heat: i64,
    size: u32,
    cluster: ClusterId,
    /// Indices of call edges whose callee is this func
    incoming: Vec<CallId>,
}

impl Func {
    #[must_use]
    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    /// Accumulated heat: the sum of the counts of all incoming edges.
    #[must_use]
    pub fn heat(&self) -> i64 {
        self.heat
    }

    /// Native-code size in bytes, fixed at construction.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The cluster this func was initially bound to.
    #[must_use]
    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    #[must_use]
    pub fn incoming(&self) -> &[CallId] {
        &self.incoming
    }
}

/// A call edge between two funcs.
///
/// The originating trace id is retained so a re-submission of the same trace
/// (whose count is a cumulative sample counter) can be told apart from a
/// distinct trace that happens to report the same caller/callee pair.
#[derive(Debug, Clone)]
pub struct Call {
    caller: FuncId,
    callee: FuncId,
    count: u32,
    trace_id: TraceId,
}

impl Call {
    #[must_use]
    pub fn caller(&self) -> FuncId {
        self.caller
    }

    #[must_use]
    pub fn callee(&self) -> FuncId {
        self.callee
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }
}

/// A cluster of funcs laid out contiguously.
///
/// In the store each cluster holds exactly one func. The sorter merges its
/// own copies; a merged-away cluster is marked dead and its func list is
/// emptied.
#[derive(Debug, Clone)]
pub struct Cluster {
    heats: i64,
    size: u64,
    density: f64,
    frozen: bool,
    dead: bool,
    funcs: Vec<FuncId>,
}

impl Cluster {
    fn for_func(id: FuncId, heat: i64, size: u32, page_size: usize) -> Self {
        let mut cluster = Cluster {
            heats: heat,
            size: u64::from(size),
            density: 0.0,
            frozen: u64::from(size) >= page_size as u64,
            dead: false,
            funcs: vec![id],
        };
        cluster.update_density();
        cluster
    }

    #[must_use]
    pub fn heats(&self) -> i64 {
        self.heats
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn density(&self) -> f64 {
        self.density
    }

    #[must_use]
    pub fn frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    #[must_use]
    pub fn funcs(&self) -> &[FuncId] {
        &self.funcs
    }

    pub(crate) fn add_heat(&mut self, heat: i64) {
        self.heats += heat;
    }

    pub(crate) fn add_size(&mut self, size: u64) {
        self.size += size;
    }

    pub(crate) fn update_density(&mut self) {
        self.density = if self.size == 0 {
            0.0
        } else {
            self.heats as f64 / self.size as f64
        };
    }

    pub(crate) fn append_funcs(&mut self, funcs: &[FuncId]) {
        self.funcs.extend_from_slice(funcs);
    }

    /// Mark this cluster merged away.
    pub(crate) fn clear(&mut self) {
        self.heats = 0;
        self.size = 0;
        self.density = 0.0;
        self.frozen = false;
        self.dead = true;
        self.funcs.clear();
    }
}

/// The call-graph arenas.
#[derive(Debug, Clone)]
pub struct CallGraph {
    page_size: usize,
    funcs: Vec<Func>,
    calls: Vec<Call>,
    clusters: Vec<Cluster>,
}

impl CallGraph {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            funcs: Vec::new(),
            calls: Vec::new(),
            clusters: Vec::new(),
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn funcs(&self) -> &[Func] {
        &self.funcs
    }

    #[must_use]
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[must_use]
    pub fn func(&self, id: FuncId) -> &Func {
        &self.funcs[id.index()]
    }

    #[must_use]
    pub fn call(&self, id: CallId) -> &Call {
        &self.calls[id.index()]
    }

    #[must_use]
    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id.index()]
    }

    /// Find the func for `key`, or insert a new node of `size` bytes.
    ///
    /// First insertion also creates the func's singleton cluster and binds
    /// the func to it. Lookup is a linear scan; the graph holds hot methods
    /// only, so it stays small.
    pub fn find_or_add_func(&mut self, key: MethodKey, size: u32) -> FuncId {
        for (i, func) in self.funcs.iter().enumerate() {
            if func.key == key {
                return FuncId(u32::try_from(i).expect("func arena overflow"));
            }
        }

        let id = FuncId(u32::try_from(self.funcs.len()).expect("func arena overflow"));
        let cluster_id =
            ClusterId(u32::try_from(self.clusters.len()).expect("cluster arena overflow"));
        self.funcs.push(Func {
            key,
            heat: 0,
            size,
            cluster: cluster_id,
            incoming: Vec::new(),
        });
        self.clusters
            .push(Cluster::for_func(id, 0, size, self.page_size));
        id
    }

    /// Record a call edge, or update the matching existing edge.
    ///
    /// Update rule for an existing (caller, callee) edge:
    /// - same originating trace: the submitted count is a cumulative sample
    ///   counter and must be strictly greater than the stored one; the heat
    ///   delta applied to the callee is the difference;
    /// - different trace: counts are independent observations and add up.
    pub fn add_call(
        &mut self,
        caller: FuncId,
        callee: FuncId,
        count: u32,
        trace_id: TraceId,
    ) -> Result<(), GraphError> {
        if let Some(i) = self
            .calls
            .iter()
            .position(|c| c.caller == caller && c.callee == callee)
        {
            let existing = &mut self.calls[i];
            if existing.trace_id == trace_id {
                if count <= existing.count {
                    return Err(GraphError::NonMonotonicCount {
                        trace_id,
                        stored: existing.count,
                        submitted: count,
                    });
                }
                let delta = i64::from(count - existing.count);
                existing.count = count;
                self.add_heat(callee, delta);
            } else {
                existing.count = existing.count.saturating_add(count);
                self.add_heat(callee, i64::from(count));
            }
            return Ok(());
        }

        let call_id = CallId(u32::try_from(self.calls.len()).expect("call arena overflow"));
        self.calls.push(Call {
            caller,
            callee,
            count,
            trace_id,
        });
        self.funcs[callee.index()].incoming.push(call_id);
        self.add_heat(callee, i64::from(count));
        Ok(())
    }

    /// Immutable copy for the sorter. Taken by the control thread after the
    /// window closes, so no further mutation races with it.
    #[must_use]
    pub fn snapshot(&self) -> CallGraph {
        self.clone()
    }

    /// Wipe all arenas, restoring the state before any sample arrived.
    pub fn clear(&mut self) {
        self.funcs.clear();
        self.calls.clear();
        self.clusters.clear();
    }

    fn add_heat(&mut self, func: FuncId, delta: i64) {
        let f = &mut self.funcs[func.index()];
        f.heat += delta;
        let cluster = &mut self.clusters[f.cluster.index()];
        cluster.add_heat(delta);
        cluster.update_density();
    }
}
