//! Resultado de una corrida: el motor recibe una copia inmutable de la tabla
//! y devuelve los estados resultantes por entrada para que quien llama los
//! aplique sobre su propia tabla.

use chrono::{DateTime, Utc};
use flowmap_domain::{Domain, EntryId, FlowId, MappingTable, Status};
use serde::{Deserialize, Serialize};

use crate::index::SkipReason;
use crate::stats::Stats;

pub const STATUS_APPLIED_REMOVED: &str = "Applied and removed";
pub const STATUS_APPLIED_KEPT: &str = "Applied (not removed)";
pub const STATUS_REPLACEMENT_ERROR: &str = "Replacement error";
pub const STATUS_ABORTED: &str = "Replacement aborted";
/// Corrida abortada con registros de la entrada ya reescritos y confirmados.
pub const STATUS_ABORTED_PARTIAL: &str = "Replacement aborted (partially applied)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub entry: EntryId,
    pub source_flow: FlowId,
    pub status: Status,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Entradas que llegaron al índice.
    pub eligible: usize,
    pub skipped: Vec<(EntryId, SkipReason)>,
    pub outcomes: Vec<EntryOutcome>,
    pub domains: Vec<(Domain, Stats)>,
    pub stats: Stats,
    pub deleted: Vec<FlowId>,
    /// La corrida sufrió un fallo fatal (pool, lectura de dominio, índices).
    pub aborted: bool,
}

impl ReplacementReport {
    pub(crate) fn empty(started_at: DateTime<Utc>) -> Self {
        Self { started_at,
               finished_at: Utc::now(),
               eligible: 0,
               skipped: Vec::new(),
               outcomes: Vec::new(),
               domains: Vec::new(),
               stats: Stats::new(),
               deleted: Vec::new(),
               aborted: false }
    }

    /// Copia los estados resultantes a los flujos origen de la tabla.
    /// Las entradas omitidas conservan su estado.
    pub fn apply(&self, table: &mut MappingTable) {
        for outcome in &self.outcomes {
            if let Some(entry) = table.entry_mut(outcome.entry) {
                entry.source_flow.status = Some(outcome.status.clone());
            }
        }
    }

    pub fn outcome(&self, entry: EntryId) -> Option<&EntryOutcome> {
        self.outcomes.iter().find(|o| o.entry == entry)
    }

    pub fn removed_count(&self) -> usize { self.outcomes.iter().filter(|o| o.removed).count() }

    pub fn failed_entries(&self) -> Vec<EntryId> {
        self.outcomes.iter().filter(|o| o.status.is_error()).map(|o| o.entry).collect()
    }

    pub fn domain_stats(&self, domain: Domain) -> Option<&Stats> {
        self.domains.iter().find(|(d, _)| *d == domain).map(|(_, s)| s)
    }
}
