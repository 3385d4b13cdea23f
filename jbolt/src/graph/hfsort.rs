//! Density-driven bottom-up cluster merging.
//!
//! The sorter never touches the live store: it works on cloned cluster
//! arenas, follows call edges through the shared call arena, and returns a
//! flat order with cluster boundaries marked.
//!
//! Every sort in here is stable with respect to insertion order, so two runs
//! over identical input streams produce identical orders.

use log::debug;

use crate::domain::{ClusterId, OrderEntry, OrderedMethod};
use crate::graph::callgraph::{CallGraph, Cluster};

/// Final ordering criterion for surviving clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterSort {
    /// Total cluster heat, descending
    #[default]
    Heat,
    /// Cluster density (heat per byte), descending
    Density,
}

/// Tuning knobs for one sorter invocation.
#[derive(Debug, Clone)]
pub struct HfsortPolicy {
    pub sort_by: ClusterSort,
    /// Refuse to grow clusters past `page_size`: frozen clusters neither
    /// merge into others nor accept merges.
    pub respect_freeze: bool,
    /// Page threshold in bytes for freezing
    pub page_size: usize,
}

impl Default for HfsortPolicy {
    fn default() -> Self {
        Self {
            sort_by: ClusterSort::Heat,
            respect_freeze: false,
            page_size: 4096,
        }
    }
}

/// Resolve a cluster id through the merged chain to the cluster that now
/// holds its funcs. The `merged` vector is a union-find parent array without
/// path compression; chains are short because each cluster merges away at
/// most once.
fn resolve_merged(merged: &[Option<ClusterId>], mut id: ClusterId) -> ClusterId {
    while let Some(parent) = merged[id.index()] {
        id = parent;
    }
    id
}

/// Decide whether the callee cluster may merge into the caller's cluster.
///
/// Returns the resolved predecessor cluster id, or `None` when the merge is
/// not allowed: self-merge, dead predecessor, or (under `respect_freeze`) a
/// frozen predecessor or a combined size past the page threshold.
fn merge_candidate(
    clusters: &[Cluster],
    merged: &[Option<ClusterId>],
    callee_cluster: ClusterId,
    caller_cluster: ClusterId,
    policy: &HfsortPolicy,
) -> Option<ClusterId> {
    let pred = resolve_merged(merged, caller_cluster);
    if pred == callee_cluster {
        return None;
    }
    let pred_cluster = &clusters[pred.index()];
    if pred_cluster.is_dead() {
        return None;
    }
    if policy.respect_freeze {
        if pred_cluster.frozen() {
            return None;
        }
        let combined = pred_cluster.size() + clusters[callee_cluster.index()].size();
        if combined > policy.page_size as u64 {
            return None;
        }
    }
    Some(pred)
}

/// Run the merge pass over cloned clusters.
///
/// Each func, hottest first, tries to merge its cluster into the cluster of
/// its hottest eligible predecessor (first passing edge wins, edges walked
/// hottest first).
fn merge_clusters(graph: &CallGraph, policy: &HfsortPolicy) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = graph.clusters().to_vec();
    let mut merged: Vec<Option<ClusterId>> = vec![None; clusters.len()];

    // Hottest funcs first; stable, so equal heats keep insertion order.
    let mut by_heat: Vec<_> = graph.funcs().iter().collect();
    by_heat.sort_by(|a, b| b.heat().cmp(&a.heat()));

    for func in by_heat {
        let home = resolve_merged(&merged, func.cluster());

        if policy.respect_freeze && clusters[home.index()].frozen() {
            continue;
        }

        // Hottest incoming edge first; stable on equal counts.
        let mut edges: Vec<_> = func.incoming().to_vec();
        edges.sort_by(|&a, &b| graph.call(b).count().cmp(&graph.call(a).count()));

        let mut best_pred = None;
        for edge in edges {
            let caller = graph.call(edge).caller();
            let caller_cluster = graph.func(caller).cluster();
            best_pred = merge_candidate(&clusters, &merged, home, caller_cluster, policy);
            if best_pred.is_some() {
                break;
            }
        }

        // No suitable caller cluster: the func's cluster stays standalone.
        let Some(pred) = best_pred else { continue };

        let (heats, size, funcs) = {
            let source = &clusters[home.index()];
            (source.heats(), source.size(), source.funcs().to_vec())
        };
        let dest = &mut clusters[pred.index()];
        dest.append_funcs(&funcs);
        dest.add_heat(heats);
        dest.add_size(size);
        dest.update_density();
        merged[home.index()] = Some(pred);
        clusters[home.index()].clear();
    }

    clusters
}

/// Compute the layout order for a graph snapshot.
///
/// Surviving clusters are sorted by the policy criterion and flattened, with
/// a boundary entry before the first cluster and after every cluster.
#[must_use]
pub fn hfsort(graph: &CallGraph, policy: &HfsortPolicy) -> Vec<OrderEntry> {
    debug!(
        "hfsort begin: funcs={}, calls={}",
        graph.funcs().len(),
        graph.calls().len()
    );

    let clusters = merge_clusters(graph, policy);

    let mut survivors: Vec<&Cluster> = clusters.iter().filter(|c| !c.is_dead()).collect();
    match policy.sort_by {
        ClusterSort::Heat => survivors.sort_by(|a, b| b.heats().cmp(&a.heats())),
        ClusterSort::Density => {
            survivors.sort_by(|a, b| b.density().total_cmp(&a.density()));
        }
    }

    let mut order = Vec::with_capacity(graph.funcs().len() + survivors.len() + 1);
    order.push(OrderEntry::ClusterBoundary);
    for cluster in survivors {
        debug!(
            "cluster: heats={} size={}B density={:.6} funcs={}",
            cluster.heats(),
            cluster.size(),
            cluster.density(),
            cluster.funcs().len()
        );
        for &func_id in cluster.funcs() {
            let func = graph.func(func_id);
            order.push(OrderEntry::Method(OrderedMethod {
                key: func.key().clone(),
                size: func.size(),
            }));
        }
        order.push(OrderEntry::ClusterBoundary);
    }

    debug!("hfsort over: {} order entries", order.len());
    order
}
