//! Orquestador del reemplazo de flujos.
//!
//! Secuencia de `Replacer::run`:
//! 1. Construye los índices (persistiendo antes los destinos vía proveedor).
//! 2. Lanza un cursor por dominio seleccionado en un pool acotado.
//! 3. Espera la terminación en ventanas de `poll_interval`, registrando progreso.
//! 4. Fusiona las estadísticas de todos los cursores.
//! 5. Actualiza el estado de cada entrada y, si la compuerta de borrado lo
//!    permite, elimina los flujos origen que quedaron sin uso.
//!
//! Ningún fallo escapa de `run`: los fallos por registro o entrada se cuentan,
//! y los fatales (pool, lectura de un dominio, índices) se registran, impiden
//! el borrado y conservan las reescrituras ya confirmadas.

pub mod report;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use flowmap_domain::{Domain, FlowId, MappingTable, Status};
use log::{error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{clamp_pool_size, EngineSettings};
use crate::cursor::{Cursor, CursorState};
use crate::errors::ReplaceError;
use crate::index::{IndexBuilder, ReplacementIndex};
use crate::provider::{DbProvider, TargetFlowProvider};
use crate::stats::Stats;
use crate::store::FlowStore;

pub use report::{EntryOutcome, ReplacementReport, STATUS_ABORTED, STATUS_ABORTED_PARTIAL, STATUS_APPLIED_KEPT,
                 STATUS_APPLIED_REMOVED, STATUS_REPLACEMENT_ERROR};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct ReplacerConfig {
    /// Reemplazar en intercambios de procesos.
    pub processes: bool,
    /// Reemplazar en factores de métodos de impacto.
    pub methods: bool,
    /// Borrar los flujos origen que queden sin uso (sólo con ambos dominios).
    pub delete_mapped: bool,
    pub settings: EngineSettings,
}

impl ReplacerConfig {
    pub fn all_domains() -> Self {
        Self { processes: true, methods: true, ..Self::default() }
    }

    pub fn with_delete_mapped(mut self, delete: bool) -> Self {
        self.delete_mapped = delete;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn domains(&self) -> Vec<Domain> {
        let mut domains = Vec::with_capacity(2);
        if self.processes {
            domains.push(Domain::Exchanges);
        }
        if self.methods {
            domains.push(Domain::Impacts);
        }
        domains
    }

    fn covers_all_domains(&self) -> bool { self.processes && self.methods }
}

pub struct Replacer<S: FlowStore + 'static> {
    store: Arc<S>,
    provider: Arc<dyn TargetFlowProvider>,
}

impl<S: FlowStore + 'static> Replacer<S> {
    /// Replacer cuyos flujos destino ya existen en la misma base.
    pub fn new(store: Arc<S>) -> Self {
        Self { store, provider: Arc::new(DbProvider) }
    }

    pub fn with_provider(mut self, provider: Arc<dyn TargetFlowProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn store(&self) -> &Arc<S> { &self.store }

    pub async fn run(&self, conf: &ReplacerConfig, table: &MappingTable) -> ReplacementReport {
        let started_at = Utc::now();
        let domains = conf.domains();
        if domains.is_empty() {
            info!("no domain selected; nothing to replace");
            return ReplacementReport::empty(started_at);
        }

        let index = match self.build_index(table).await {
            Ok(index) => Arc::new(index),
            Err(e) => {
                error!("Flow replacement failed: {e}");
                let mut report = ReplacementReport::empty(started_at);
                report.aborted = true;
                return report;
            }
        };
        let mut report = ReplacementReport::empty(started_at);
        report.skipped = index.skipped().to_vec();
        report.eligible = index.len();
        if index.is_empty() {
            info!("found no flows that can be mapped");
            report.finished_at = Utc::now();
            return report;
        }
        info!("found {} flows that can be mapped", index.len());

        let (cursors, mut fatal) = self.run_cursors(conf, &domains, &index).await;

        // estadísticas por dominio en el orden de selección
        let mut stats = Stats::new();
        for domain in &domains {
            let Some(cursor) = cursors.iter().find(|c| c.domain() == *domain) else { continue };
            if let CursorState::Failed(e) = cursor.state() {
                fatal.push(e.clone());
            }
            cursor.stats().log(domain.label(), index.flows());
            stats.add(cursor.stats());
            report.domains.push((*domain, cursor.stats().clone()));
        }
        report.stats = stats;
        report.aborted = !fatal.is_empty();
        for e in &fatal {
            error!("Flow replacement failed: {e}");
        }

        let delete = self.deletion_gate(conf, &report);
        let store = Arc::clone(&self.store);
        let settle_index = Arc::clone(&index);
        let settle_stats = report.stats.clone();
        let aborted = report.aborted;
        let settled = tokio::task::spawn_blocking(move || {
                          if aborted {
                              (abort_outcomes(&settle_index, &settle_stats), Vec::new())
                          } else {
                              settle(store.as_ref(), &settle_index, &settle_stats, delete)
                          }
                      }).await;
        match settled {
            Ok((outcomes, deleted)) => {
                report.outcomes = outcomes;
                report.deleted = deleted;
            }
            Err(e) => {
                error!("Flow replacement failed while updating mapping entries: {e}");
                report.aborted = true;
                report.outcomes = abort_outcomes(&index, &report.stats);
            }
        }
        report.finished_at = Utc::now();
        report
    }

    async fn build_index(&self, table: &MappingTable) -> Result<ReplacementIndex, ReplaceError> {
        let snapshot = table.clone();
        let store = Arc::clone(&self.store);
        let provider = Arc::clone(&self.provider);
        tokio::task::spawn_blocking(move || IndexBuilder::build(&snapshot, store.as_ref(), provider.as_ref()))
            .await
            .map_err(|e| ReplaceError::Pool(format!("index builder: {e}")))?
    }

    /// Lanza los cursores en un pool acotado por `pool_size` y espera a que
    /// terminen todos. Devuelve los cursores terminados y los fallos fatales.
    async fn run_cursors(&self,
                         conf: &ReplacerConfig,
                         domains: &[Domain],
                         index: &Arc<ReplacementIndex>)
                         -> (Vec<Cursor<S>>, Vec<ReplaceError>) {
        info!("start updatable cursors");
        let permits = Arc::new(Semaphore::new(clamp_pool_size(conf.settings.pool_size)));
        let mut set: JoinSet<Result<Cursor<S>, ReplaceError>> = JoinSet::new();
        for domain in domains.iter().copied() {
            let cursor = Cursor::new(domain, Arc::clone(&self.store), Arc::clone(index), conf.settings.page_size);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| ReplaceError::Pool(e.to_string()))?;
                tokio::task::spawn_blocking(move || {
                    let mut cursor = cursor;
                    cursor.run();
                    cursor
                })
                .await
                .map_err(|e| ReplaceError::Pool(format!("{domain} cursor: {e}")))
            });
        }

        let poll = conf.settings.poll_interval.max(MIN_POLL_INTERVAL);
        let waiting_since = Instant::now();
        let mut cursors = Vec::with_capacity(domains.len());
        let mut fatal = Vec::new();
        loop {
            match tokio::time::timeout(poll, set.join_next()).await {
                Err(_) => info!("waiting for cursors to finish; {} seconds", waiting_since.elapsed().as_secs()),
                Ok(None) => break,
                Ok(Some(Ok(Ok(cursor)))) => cursors.push(cursor),
                Ok(Some(Ok(Err(e)))) => fatal.push(e),
                Ok(Some(Err(e))) => fatal.push(ReplaceError::Pool(e.to_string())),
            }
        }
        info!("cursors finished");
        (cursors, fatal)
    }

    fn deletion_gate(&self, conf: &ReplacerConfig, report: &ReplacementReport) -> bool {
        if !conf.delete_mapped {
            return false;
        }
        if !conf.covers_all_domains() {
            info!("Will not delete mapped flows because not all domains were processed");
            return false;
        }
        if report.aborted {
            warn!("Will not delete mapped flows because the replacement process was aborted");
            return false;
        }
        if report.stats.failed > 0 {
            warn!("Will not delete mapped flows because there were {} failures in replacement process",
                  report.stats.failed);
            return false;
        }
        true
    }
}

/// Estados finales de las entradas; borra los flujos origen sin uso si `delete`.
fn settle<S: FlowStore + ?Sized>(store: &S,
                                 index: &ReplacementIndex,
                                 stats: &Stats,
                                 delete: bool)
                                 -> (Vec<EntryOutcome>, Vec<FlowId>) {
    // flujos usados: se consulta una sola vez, tras los cursores
    let used = if delete {
        match store.used_flows() {
            Ok(used) => Some(used),
            Err(e) => {
                warn!("Will not delete mapped flows because used flows could not be determined: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut outcomes = Vec::with_capacity(index.len());
    let mut deleted = Vec::new();
    for entry in index.iter() {
        let flow_id = entry.source;
        if stats.had_failures(flow_id) {
            outcomes.push(EntryOutcome { entry: entry.entry,
                                         source_flow: flow_id,
                                         status: Status::error(STATUS_REPLACEMENT_ERROR),
                                         removed: false });
            continue;
        }
        let removed = match &used {
            Some(used) if !used.contains(&flow_id) => remove_flow(store, index, flow_id),
            _ => false,
        };
        if removed {
            deleted.push(flow_id);
        }
        let status = if removed { STATUS_APPLIED_REMOVED } else { STATUS_APPLIED_KEPT };
        outcomes.push(EntryOutcome { entry: entry.entry, source_flow: flow_id, status: Status::ok(status), removed });
    }
    (outcomes, deleted)
}

fn remove_flow<S: FlowStore + ?Sized>(store: &S, index: &ReplacementIndex, flow_id: FlowId) -> bool {
    let name = index.flow(flow_id).map(|f| (f.display_name(), f.ref_id.to_string())).unwrap_or_default();
    match store.delete_flow(flow_id) {
        Ok(()) => {
            info!("removed mapped flow {} uuid={}", name.0, name.1);
            true
        }
        Err(e) => {
            warn!("could not remove mapped flow {} uuid={}: {e}", name.0, name.1);
            false
        }
    }
}

fn abort_outcomes(index: &ReplacementIndex, stats: &Stats) -> Vec<EntryOutcome> {
    index.iter()
         .map(|entry| {
             let message = if stats.had_failures(entry.source) {
                 STATUS_REPLACEMENT_ERROR
             } else if stats.replaced_per_flow.contains_key(&entry.source) {
                 STATUS_ABORTED_PARTIAL
             } else {
                 STATUS_ABORTED
             };
             EntryOutcome { entry: entry.entry, source_flow: entry.source, status: Status::error(message), removed: false }
         })
         .collect()
}
