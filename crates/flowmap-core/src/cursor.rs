//! Cursor de dominio: recorre los registros de un dominio y reescribe los que
//! referencian un flujo origen indexado.
//!
//! Contrato:
//! - Una sola pasada, hacia adelante, en el orden natural del dominio (id).
//! - Cada mutación se confirma por separado; un corte a mitad de corrida deja
//!   un estado consistente y parcialmente migrado.
//! - El fallo de un registro nunca aborta el cursor: se cuenta en `Stats`.
//! - Sólo un fallo fuera del alcance de un registro (no poder leer el
//!   dominio) lleva al estado `Failed`.

use std::sync::Arc;

use flowmap_domain::{Domain, DomainRecord, RecordUpdate};
use log::{debug, error, info, warn};

use crate::errors::ReplaceError;
use crate::index::{IndexedEntry, ReplacementIndex};
use crate::stats::Stats;
use crate::store::FlowStore;

/// Estados del cursor.
///
/// Transiciones válidas:
/// - `Created` -> `Running`
/// - `Running` -> `Completed`
/// - `Running` -> `Failed`
#[derive(Debug, Clone, PartialEq)]
pub enum CursorState {
    Created,
    Running,
    Completed,
    Failed(ReplaceError),
}

pub struct Cursor<S: FlowStore + ?Sized> {
    domain: Domain,
    store: Arc<S>,
    index: Arc<ReplacementIndex>,
    page_size: usize,
    state: CursorState,
    stats: Stats,
}

impl<S: FlowStore + ?Sized> Cursor<S> {
    pub fn new(domain: Domain, store: Arc<S>, index: Arc<ReplacementIndex>, page_size: usize) -> Self {
        Self { domain,
               store,
               index,
               page_size: page_size.max(1),
               state: CursorState::Created,
               stats: Stats::new() }
    }

    pub fn domain(&self) -> Domain { self.domain }
    pub fn state(&self) -> &CursorState { &self.state }
    pub fn stats(&self) -> &Stats { &self.stats }
    pub fn into_stats(self) -> Stats { self.stats }

    /// Recorre el dominio completo. No es reanudable: llamar de nuevo sobre
    /// un cursor ya arrancado no hace nada.
    pub fn run(&mut self) -> &CursorState {
        if self.state != CursorState::Created {
            return &self.state;
        }
        self.state = CursorState::Running;
        info!("{} cursor started", self.domain);
        let mut after: Option<i64> = None;
        loop {
            let page = match self.store.scan(self.domain, after, self.page_size) {
                Ok(page) => page,
                Err(e) => {
                    let err = ReplaceError::Stream { domain: self.domain.label(), source: e };
                    error!("{} cursor failed: {err}", self.domain);
                    self.state = CursorState::Failed(err);
                    return &self.state;
                }
            };
            let Some(last) = page.last() else { break };
            after = Some(last.id);
            let done = page.len() < self.page_size;
            for record in &page {
                self.visit(record);
            }
            if done {
                break;
            }
        }
        info!("{} cursor finished: {} replaced, {} failed",
              self.domain, self.stats.replaced, self.stats.failed);
        self.state = CursorState::Completed;
        &self.state
    }

    fn visit(&mut self, record: &DomainRecord) {
        let Some(entry) = self.index.entry_for(record.flow_id) else { return };
        match self.replace(record, entry) {
            Ok(update) => {
                debug!("{} record {}: flow {} -> {}, amount {} -> {}",
                       self.domain, record.id, record.flow_id, update.flow_id, record.amount, update.amount);
                self.stats.record_success(entry.source);
            }
            Err(e) => {
                warn!("{} record {} (flow {}) not replaced: {e}", self.domain, record.id, record.flow_id);
                self.stats.record_failure(entry.source);
            }
        }
    }

    fn replace(&self, record: &DomainRecord, entry: &IndexedEntry) -> Result<RecordUpdate, ReplaceError> {
        let source = self.index.flow(entry.source).ok_or(ReplaceError::MissingTarget(entry.source))?;
        let target = self.index.flow(entry.target).ok_or(ReplaceError::MissingTarget(entry.source))?;
        let factor = self.index.conversions().effective_factor(source, target, &record.unit, entry.factor)?;
        let update = RecordUpdate { record_id: record.id,
                                    flow_id: target.id,
                                    amount: record.amount * factor,
                                    unit: target.reference_unit.clone() };
        self.store
            .update_record(self.domain, &update)
            .map_err(|e| ReplaceError::Persistence { record_id: record.id, source: e })?;
        Ok(update)
    }
}
