// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart barrier as an explicit dependency graph.
//!
//! Each gate fires its target once every node it waits for has been
//! signalled. A fired target counts as signalled, so gates chain. Signals
//! are monotonic: a node is never un-signalled.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::error::BusError;

#[derive(Debug)]
struct Gate<N> {
    target: N,
    waits_for: Vec<N>,
    fired: bool,
}

/// Collects gates and validates them into a [`RestartGraph`].
#[derive(Debug)]
pub struct RestartGraphBuilder<N> {
    gates: Vec<Gate<N>>,
}

impl<N: Copy + Ord + Debug> RestartGraphBuilder<N> {
    /// Fire `target` once all of `waits_for` have been signalled.
    pub fn gate(mut self, target: N, waits_for: impl IntoIterator<Item = N>) -> Self {
        self.gates.push(Gate { target, waits_for: waits_for.into_iter().collect(), fired: false });
        self
    }

    /// Reject duplicate targets, empty gates and cycles.
    pub fn build(self) -> Result<RestartGraph<N>, BusError> {
        let mut edges: BTreeMap<N, &[N]> = BTreeMap::new();
        for gate in &self.gates {
            if gate.waits_for.is_empty() {
                return Err(BusError::RestartGraph(format!("{:?} waits for nothing", gate.target)));
            }
            if edges.insert(gate.target, &gate.waits_for).is_some() {
                return Err(BusError::RestartGraph(format!("{:?} has two gates", gate.target)));
            }
        }
        for gate in &self.gates {
            let mut stack = vec![(gate.target, 0usize)];
            let mut on_path = BTreeSet::from([gate.target]);
            while let Some((node, next)) = stack.pop() {
                let deps = edges.get(&node).copied().unwrap_or(&[]);
                if next >= deps.len() {
                    on_path.remove(&node);
                    continue;
                }
                stack.push((node, next + 1));
                let dep = deps[next];
                if !on_path.insert(dep) {
                    return Err(BusError::RestartGraph(format!("cycle through {:?}", dep)));
                }
                stack.push((dep, 0));
            }
        }
        Ok(RestartGraph { gates: self.gates, signalled: BTreeSet::new() })
    }
}

/// Restart sequencing state for one agent.
#[derive(Debug)]
pub struct RestartGraph<N> {
    gates: Vec<Gate<N>>,
    signalled: BTreeSet<N>,
}

impl<N: Copy + Ord + Debug> RestartGraph<N> {
    pub fn builder() -> RestartGraphBuilder<N> {
        RestartGraphBuilder { gates: Vec::new() }
    }

    /// Record `node` and return every target that fires as a result, in
    /// firing order. Re-signalling is a no-op.
    pub fn signal(&mut self, node: N) -> Vec<N> {
        if !self.signalled.insert(node) {
            return Vec::new();
        }
        let mut fired = Vec::new();
        loop {
            let ready = self
                .gates
                .iter()
                .position(|g| !g.fired && g.waits_for.iter().all(|d| self.signalled.contains(d)));
            let Some(index) = ready else { break };
            let gate = &mut self.gates[index];
            gate.fired = true;
            let target = gate.target;
            self.signalled.insert(target);
            fired.push(target);
        }
        fired
    }

    pub fn is_signalled(&self, node: N) -> bool {
        self.signalled.contains(&node)
    }

    /// Nodes `target` is still waiting for.
    pub fn waiting_on(&self, target: N) -> Vec<N> {
        self.gates
            .iter()
            .filter(|g| g.target == target)
            .flat_map(|g| g.waits_for.iter().copied())
            .filter(|d| !self.signalled.contains(d))
            .collect()
    }
}

#[cfg(test)]
#[path = "restart_tests.rs"]
mod tests;
