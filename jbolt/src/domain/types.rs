//! Identity types: interned symbols, method keys, and arena ids.
//!
//! Method identity is the only thing that survives across a dump run and a
//! later load run, so [`MethodKey`] equality and hashing are defined purely
//! over symbol content, never over live runtime state.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// SYMBOLS
// =============================================================================

/// An interned, reference-counted string.
///
/// Cloning a `Symbol` bumps a refcount; identical strings interned through
/// the same [`SymbolTable`] share one allocation. Equality has a pointer
/// fast path but falls back to content comparison so keys from different
/// tables (e.g. order-file load vs. live sampling) still compare equal.
#[derive(Debug, Clone, Eq)]
pub struct Symbol(Arc<str>);

impl Symbol {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 31-multiplier fold over the symbol bytes (stable across runs).
    #[must_use]
    pub fn fold_hash(&self) -> u32 {
        self.0
            .bytes()
            .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.fold_hash());
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol(Arc::from(s))
    }
}

/// Dedup table for [`Symbol`]s.
///
/// Not global: each owner (the jbolt context, the order-file loader in
/// tests) holds its own table, and symbols from different tables remain
/// comparable by content.
#[derive(Debug, Default)]
pub struct SymbolTable {
    interned: HashSet<Symbol>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning the shared symbol.
    pub fn intern(&mut self, s: &str) -> Symbol {
        let probe = Symbol::from(s);
        if let Some(existing) = self.interned.get(&probe) {
            return existing.clone();
        }
        self.interned.insert(probe.clone());
        probe
    }

    /// Number of distinct symbols interned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interned.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }
}

// =============================================================================
// METHOD KEY
// =============================================================================

/// Symbolic method identity: {holder class, method name, signature}.
///
/// The class symbol is in internal slash form (`java/lang/Object`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodKey {
    klass: Symbol,
    name: Symbol,
    sig: Symbol,
}

impl MethodKey {
    #[must_use]
    pub fn new(klass: Symbol, name: Symbol, sig: Symbol) -> Self {
        Self { klass, name, sig }
    }

    /// Intern the three parts of a key through `symbols`.
    pub fn intern(symbols: &mut SymbolTable, klass: &str, name: &str, sig: &str) -> Self {
        Self {
            klass: symbols.intern(klass),
            name: symbols.intern(name),
            sig: symbols.intern(sig),
        }
    }

    #[must_use]
    pub fn klass(&self) -> &Symbol {
        &self.klass
    }

    #[must_use]
    pub fn name(&self) -> &Symbol {
        &self.name
    }

    #[must_use]
    pub fn sig(&self) -> &Symbol {
        &self.sig
    }
}

impl Hash for MethodKey {
    /// 31-multiplier fold over the three symbols.
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut v = self.klass.fold_hash();
        v = v.wrapping_mul(31).wrapping_add(self.name.fold_hash());
        v = v.wrapping_mul(31).wrapping_add(self.sig.fold_hash());
        state.write_u32(v);
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.klass, self.name, self.sig)
    }
}

// =============================================================================
// ARENA IDS
// =============================================================================

/// Index of a func node in the call-graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Index of a call edge in the call-graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(pub u32);

/// Index of a cluster in the call-graph arena. Ids are dense and
/// monotonically assigned, so a cluster's id doubles as its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(pub u32);

/// Sampler-assigned stack trace id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(pub u64);

impl FuncId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl CallId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ClusterId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace:{}", self.0)
    }
}

// =============================================================================
// COMPILATION
// =============================================================================

/// Tiered-compilation level of a compiled body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompLevel {
    /// C1 without profiling
    Simple,
    /// C1 with invocation counters
    LimitedProfile,
    /// C1 with full profiling
    FullProfile,
    /// C2
    FullOptimization,
}

impl CompLevel {
    /// Levels whose code lands in the non-profiled region, the only region
    /// layout cares about.
    #[must_use]
    pub fn targets_non_profiled(self) -> bool {
        matches!(self, CompLevel::Simple | CompLevel::FullOptimization)
    }

    /// Level used when re-enqueueing a method: profiled C1 tiers are raised
    /// to C2 so a deoptimized body is not pinned at a profiling level.
    #[must_use]
    pub fn adapted_for_recompile(self) -> Self {
        match self {
            CompLevel::Simple => CompLevel::Simple,
            _ => CompLevel::FullOptimization,
        }
    }
}

/// Why a compile task was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileReason {
    /// Re-emission driven by the layout subsystem
    Reorder,
    /// Evacuation of the stale hot segment
    Evacuate,
}

// =============================================================================
// CODE SEGMENTS
// =============================================================================

/// Segments of the native code cache, low address to high.
///
/// `HotA`/`HotB` are the two equally sized layout segments carved out of the
/// non-profiled region; which of the pair is primary at any moment is decided
/// by the segment selectors, not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CodeSegment {
    Profiled = 0,
    NonNmethod = 1,
    HotA = 2,
    HotB = 3,
    NonProfiled = 4,
}

impl CodeSegment {
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CodeSegment::Profiled),
            1 => Some(CodeSegment::NonNmethod),
            2 => Some(CodeSegment::HotA),
            3 => Some(CodeSegment::HotB),
            4 => Some(CodeSegment::NonProfiled),
            _ => None,
        }
    }

    /// Heap name as it appears in code-cache logs.
    #[must_use]
    pub fn heap_name(self) -> &'static str {
        match self {
            CodeSegment::Profiled => "profiled nmethods",
            CodeSegment::NonNmethod => "non-nmethods",
            CodeSegment::HotA => "jbolt hot nmethods",
            CodeSegment::HotB => "jbolt tmp nmethods",
            CodeSegment::NonProfiled => "non-profiled nmethods",
        }
    }
}

impl fmt::Display for CodeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.heap_name())
    }
}

// =============================================================================
// ORDER ENTRIES
// =============================================================================

/// One method in a computed layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMethod {
    pub key: MethodKey,
    /// Native-code size in bytes at the time the order was computed
    pub size: u32,
}

/// One line of a computed layout order: a method, or a cluster boundary.
///
/// Orders begin with a boundary and carry one boundary after each cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEntry {
    ClusterBoundary,
    Method(OrderedMethod),
}

impl OrderEntry {
    #[must_use]
    pub fn as_method(&self) -> Option<&OrderedMethod> {
        match self {
            OrderEntry::Method(m) => Some(m),
            OrderEntry::ClusterBoundary => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(v: &T) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_interning_shares_storage() {
        let mut table = SymbolTable::new();
        let a = table.intern("java/lang/Object");
        let b = table.intern("java/lang/Object");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_keys_from_distinct_tables_compare_equal() {
        let mut t1 = SymbolTable::new();
        let mut t2 = SymbolTable::new();
        let k1 = MethodKey::intern(&mut t1, "java/util/List", "size", "()I");
        let k2 = MethodKey::intern(&mut t2, "java/util/List", "size", "()I");
        assert_eq!(k1, k2);
        assert_eq!(hash_of(&k1), hash_of(&k2));
    }

    #[test]
    fn test_key_hash_is_triple_sensitive() {
        let mut t = SymbolTable::new();
        let k1 = MethodKey::intern(&mut t, "A", "m", "()V");
        let k2 = MethodKey::intern(&mut t, "A", "n", "()V");
        assert_ne!(k1, k2);
        assert_ne!(hash_of(&k1), hash_of(&k2));
    }

    #[test]
    fn test_comp_level_adaptation() {
        assert_eq!(CompLevel::Simple.adapted_for_recompile(), CompLevel::Simple);
        assert_eq!(
            CompLevel::FullProfile.adapted_for_recompile(),
            CompLevel::FullOptimization
        );
        assert_eq!(
            CompLevel::FullOptimization.adapted_for_recompile(),
            CompLevel::FullOptimization
        );
    }
}
