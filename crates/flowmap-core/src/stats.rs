//! Estadísticas de un cursor y su agregación.
//!
//! Cada cursor es dueño exclusivo de su `Stats` mientras corre; la fusión
//! ocurre sólo después de que todos terminan. Los dominios son disjuntos, por
//! lo que fusionar es una suma de contadores y una unión de conjuntos.

use std::collections::{HashMap, HashSet};

use flowmap_domain::{FlowId, ResolvedFlow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub attempted: usize,
    pub replaced: usize,
    pub failed: usize,
    /// Flujos origen con al menos un fallo.
    pub failures: HashSet<FlowId>,
    pub replaced_per_flow: HashMap<FlowId, usize>,
}

impl Stats {
    pub fn new() -> Self { Self::default() }

    pub fn record_success(&mut self, source: FlowId) {
        self.attempted += 1;
        self.replaced += 1;
        *self.replaced_per_flow.entry(source).or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, source: FlowId) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.insert(source);
    }

    pub fn add(&mut self, other: &Stats) {
        self.attempted += other.attempted;
        self.replaced += other.replaced;
        self.failed += other.failed;
        self.failures.extend(other.failures.iter().copied());
        for (flow, n) in &other.replaced_per_flow {
            *self.replaced_per_flow.entry(*flow).or_insert(0) += n;
        }
    }

    pub fn merge(a: &Stats, b: &Stats) -> Stats {
        let mut merged = a.clone();
        merged.add(b);
        merged
    }

    pub fn had_failures(&self, flow: FlowId) -> bool { self.failures.contains(&flow) }

    pub fn is_clean(&self) -> bool { self.failed == 0 }

    pub fn log(&self, label: &str, flows: &HashMap<FlowId, ResolvedFlow>) {
        info!("{label}: {} records matched, {} replaced, {} failed",
              self.attempted, self.replaced, self.failed);
        for (flow, n) in &self.replaced_per_flow {
            debug!("{label}: replaced flow {} in {n} records", display(*flow, flows));
        }
        for flow in &self.failures {
            warn!("{label}: replacement of flow {} had failures", display(*flow, flows));
        }
    }
}

fn display(id: FlowId, flows: &HashMap<FlowId, ResolvedFlow>) -> String {
    match flows.get(&id) {
        Some(f) => format!("{} ({id})", f.display_name()),
        None => id.to_string(),
    }
}
