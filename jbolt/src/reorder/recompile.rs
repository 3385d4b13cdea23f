//! Compile-task bookkeeping for the recompile driver.
//!
//! A [`CompileTaskInfo`] freezes everything needed to re-enqueue a method
//! while holding only a weak handle, so a captured task never keeps a class
//! loader alive. The hot-method table pairs the sorted key list with
//! set-once slots: the first compiler thread to observe a hot method wins
//! the slot, everyone else keeps their hands off.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crossbeam_channel::Receiver;
use log::{debug, warn};

use crate::domain::{CodeSegment, CompLevel, CompileReason, MethodKey, ReorderError};
use crate::host::{CompileOutcome, MethodRef, StrongMethod};

/// Everything needed to re-enqueue one method later.
///
/// On-stack-replacement bodies are never captured; reordering only deals in
/// standard invocation entries.
#[derive(Clone)]
pub struct CompileTaskInfo {
    method: Arc<dyn MethodRef>,
    level: CompLevel,
    reason: CompileReason,
}

impl CompileTaskInfo {
    #[must_use]
    pub fn new(method: Arc<dyn MethodRef>, level: CompLevel, reason: CompileReason) -> Self {
        Self {
            method,
            level,
            reason,
        }
    }

    /// Build a task from a method's current compiled body.
    ///
    /// Returns `None` (with a log line) when the method has no body to
    /// recompile; the stored level is adapted so profiled C1 tiers re-enter
    /// at C2.
    #[must_use]
    pub fn from_code(method: &StrongMethod, reason: CompileReason) -> Option<Self> {
        let Some(code) = method.code() else {
            warn!(
                "recompilation task init failed because of null nmethod: func: {}",
                method.key()
            );
            return None;
        };
        Some(Self {
            method: method.demote(),
            level: code.level.adapted_for_recompile(),
            reason,
        })
    }

    #[must_use]
    pub fn level(&self) -> CompLevel {
        self.level
    }

    #[must_use]
    pub fn reason(&self) -> CompileReason {
        self.reason
    }

    /// Promote the weak handle back to a strong one, confirming the holder
    /// is still loaded. Returns `None` for unloaded methods, which are
    /// silently skipped by the driver.
    #[must_use]
    pub fn try_select(&self) -> Option<StrongMethod> {
        if !self.method.is_alive() {
            debug!(
                "method has been unloaded so skip reordering for it: {}",
                self.method.key()
            );
            return None;
        }
        self.method.promote()
    }
}

/// A set-once slot for the task captured per hot method.
#[derive(Default)]
pub struct MethodSlot {
    info: OnceLock<CompileTaskInfo>,
}

impl MethodSlot {
    #[must_use]
    pub fn info(&self) -> Option<&CompileTaskInfo> {
        self.info.get()
    }

    /// Capture a task. Returns `false` when another thread got here first.
    pub fn capture(&self, info: CompileTaskInfo) -> bool {
        self.info.set(info).is_ok()
    }
}

/// The hot-method table: insertion-ordered keys plus per-key slots.
#[derive(Default)]
pub struct HotMethods {
    sorted: Vec<MethodKey>,
    table: HashMap<MethodKey, MethodSlot>,
}

impl HotMethods {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key with an empty slot (load mode: slots fill as the
    /// compiler observes each method).
    ///
    /// Returns `false` on a duplicate key.
    pub fn push_key(&mut self, key: MethodKey) -> bool {
        if self.table.contains_key(&key) {
            return false;
        }
        self.table.insert(key.clone(), MethodSlot::default());
        self.sorted.push(key);
        true
    }

    /// Append a key with a pre-captured task (auto mode: the control thread
    /// builds the whole table itself).
    ///
    /// Returns `false` on a duplicate key.
    pub fn push_with_info(&mut self, key: MethodKey, info: CompileTaskInfo) -> bool {
        if self.table.contains_key(&key) {
            return false;
        }
        let slot = MethodSlot::default();
        let captured = slot.capture(info);
        debug_assert!(captured);
        self.table.insert(key.clone(), slot);
        self.sorted.push(key);
        true
    }

    #[must_use]
    pub fn sorted(&self) -> &[MethodKey] {
        &self.sorted
    }

    #[must_use]
    pub fn slot(&self, key: &MethodKey) -> Option<&MethodSlot> {
        self.table.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn clear(&mut self) {
        self.sorted.clear();
        self.table.clear();
    }
}

/// Block until a compile ticket completes.
pub fn wait_for_compile(
    ticket: &Receiver<CompileOutcome>,
    method: &MethodKey,
) -> Result<(), ReorderError> {
    match ticket.recv() {
        Ok(CompileOutcome::Completed) => Ok(()),
        Ok(CompileOutcome::Failed(reason)) => Err(ReorderError::CompileFailed {
            method: method.clone(),
            reason,
        }),
        Err(_) => Err(ReorderError::TaskDropped(method.clone())),
    }
}

/// Verify that a method's fresh body landed in the expected segment.
pub fn check_compiled_result(
    method: &StrongMethod,
    expected: CodeSegment,
) -> Result<(), ReorderError> {
    let key = method.key();
    let Some(code) = method.code() else {
        return Err(ReorderError::NoCompiledCode(key));
    };
    if code.segment != expected {
        return Err(ReorderError::WrongSegment {
            method: key,
            expected,
            actual: code.segment,
        });
    }
    debug!(
        "recompilation good: size={}, method={key}, heap={expected}",
        code.size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SymbolTable;

    fn key(name: &str) -> MethodKey {
        let mut t = SymbolTable::new();
        MethodKey::intern(&mut t, "com/example/App", name, "()V")
    }

    #[test]
    fn test_push_key_preserves_order_and_rejects_duplicates() {
        let mut hot = HotMethods::new();
        assert!(hot.push_key(key("a")));
        assert!(hot.push_key(key("b")));
        assert!(!hot.push_key(key("a")));
        assert_eq!(hot.len(), 2);
        assert_eq!(hot.sorted()[0], key("a"));
        assert_eq!(hot.sorted()[1], key("b"));
    }

    #[test]
    fn test_slot_captures_only_once() {
        struct Dead;
        impl MethodRef for Dead {
            fn key(&self) -> MethodKey {
                key("dead")
            }
            fn is_alive(&self) -> bool {
                false
            }
            fn promote(&self) -> Option<StrongMethod> {
                None
            }
            fn demote(&self) -> Arc<dyn MethodRef> {
                Arc::new(Dead)
            }
            fn code(&self) -> Option<crate::host::CompiledCodeInfo> {
                None
            }
        }

        let slot = MethodSlot::default();
        let info = CompileTaskInfo::new(
            Arc::new(Dead),
            CompLevel::FullOptimization,
            CompileReason::Reorder,
        );
        assert!(slot.capture(info.clone()));
        assert!(!slot.capture(info));
        assert!(slot.info().is_some());
    }

    #[test]
    fn test_try_select_skips_unloaded() {
        struct Dead;
        impl MethodRef for Dead {
            fn key(&self) -> MethodKey {
                key("dead")
            }
            fn is_alive(&self) -> bool {
                false
            }
            fn promote(&self) -> Option<StrongMethod> {
                unreachable!("promote must not be called on a dead method")
            }
            fn demote(&self) -> Arc<dyn MethodRef> {
                Arc::new(Dead)
            }
            fn code(&self) -> Option<crate::host::CompiledCodeInfo> {
                None
            }
        }

        let info = CompileTaskInfo::new(
            Arc::new(Dead),
            CompLevel::FullOptimization,
            CompileReason::Reorder,
        );
        assert!(info.try_select().is_none());
    }

    #[test]
    fn test_wait_for_compile_maps_outcomes() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(CompileOutcome::Completed).unwrap();
        assert!(wait_for_compile(&rx, &key("a")).is_ok());

        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(CompileOutcome::Failed("no space".to_string()))
            .unwrap();
        let err = wait_for_compile(&rx, &key("a")).unwrap_err();
        assert!(matches!(err, ReorderError::CompileFailed { .. }));

        let (tx, rx) = crossbeam_channel::bounded::<CompileOutcome>(1);
        drop(tx);
        let err = wait_for_compile(&rx, &key("a")).unwrap_err();
        assert!(matches!(err, ReorderError::TaskDropped(_)));
    }
}
