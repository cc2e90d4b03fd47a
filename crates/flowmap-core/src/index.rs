//! Construcción de índices previa al reemplazo.
//!
//! A partir de la tabla de mapeo validada produce:
//! - índice id de flujo origen → entrada (en orden de la tabla);
//! - índice id de flujo → `ResolvedFlow` (origen y destino);
//! - la `ConversionTable` de la corrida.
//!
//! Todo queda de sólo lectura una vez que arrancan los cursores.

use std::collections::HashMap;

use flowmap_domain::{EntryId, FlowId, MappingTable, ResolvedFlow};
use indexmap::IndexMap;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::conversion::ConversionTable;
use crate::errors::ReplaceError;
use crate::provider::TargetFlowProvider;
use crate::store::{sync_flow, FlowStore};

/// Entrada indexada: sólo lo que los cursores necesitan.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEntry {
    pub entry: EntryId,
    pub source: FlowId,
    pub target: FlowId,
    pub factor: Option<f64>,
}

/// Motivo por el que una entrada no participa de la corrida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Algún extremo no validado o con error.
    Validation,
    /// Algún extremo no pudo sincronizarse con la base.
    Sync(String),
    /// Origen y destino son el mismo flujo.
    SelfMapping,
    /// Otra entrada posterior con el mismo flujo origen la reemplazó en el índice.
    Superseded(EntryId),
}

#[derive(Debug, Default)]
pub struct ReplacementIndex {
    entries: IndexMap<FlowId, IndexedEntry>,
    flows: HashMap<FlowId, ResolvedFlow>,
    conversions: ConversionTable,
    skipped: Vec<(EntryId, SkipReason)>,
}

impl ReplacementIndex {
    pub fn entry_for(&self, source: FlowId) -> Option<&IndexedEntry> { self.entries.get(&source) }
    pub fn flow(&self, id: FlowId) -> Option<&ResolvedFlow> { self.flows.get(&id) }
    pub fn flows(&self) -> &HashMap<FlowId, ResolvedFlow> { &self.flows }
    pub fn conversions(&self) -> &ConversionTable { &self.conversions }
    pub fn skipped(&self) -> &[(EntryId, SkipReason)] { &self.skipped }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &IndexedEntry> { self.entries.values() }
}

pub struct IndexBuilder;

impl IndexBuilder {
    pub fn build(table: &MappingTable,
                 store: &dyn FlowStore,
                 provider: &dyn TargetFlowProvider)
                 -> Result<ReplacementIndex, ReplaceError> {
        // 1. persistir primero los destinos sin marca de error
        let targets = table.target_flows();
        match provider.persist(&targets, store) {
            Ok(n) => info!("provider {} persisted {n} of {} target flows", provider.name(), targets.len()),
            Err(e) => error!("provider {} failed to persist target flows: {e}", provider.name()),
        }

        let mut index = ReplacementIndex::default();
        for (id, entry) in table.iter() {
            // 2. sólo entradas con ambos extremos válidos
            if !entry.is_eligible() {
                index.skipped.push((id, SkipReason::Validation));
                continue;
            }
            let synced = sync_flow(store, &entry.source_flow).and_then(|s| sync_flow(store, &entry.target_flow).map(|t| (s, t)));
            let (source, target) = match synced {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("skip mapping entry {id}: {e}");
                    index.skipped.push((id, SkipReason::Sync(e.to_string())));
                    continue;
                }
            };
            if source.id == target.id {
                warn!("skip mapping entry {id}: source and target are the same flow {}", source.id);
                index.skipped.push((id, SkipReason::SelfMapping));
                continue;
            }

            // 3. último en escribir gana; se deja constancia del reemplazado
            let indexed = IndexedEntry { entry: id, source: source.id, target: target.id, factor: entry.explicit_factor() };
            if let Some(previous) = index.entries.insert(source.id, indexed) {
                warn!("duplicate mapping for source flow {} ({}): entry {id} overrides entry {}",
                      source.display_name(),
                      source.ref_id,
                      previous.entry);
                index.skipped.push((previous.entry, SkipReason::Superseded(id)));
            }
            index.flows.insert(source.id, source);
            index.flows.insert(target.id, target);
        }

        // 4. la tabla de conversión no depende de las entradas
        index.conversions = ConversionTable::create(store).map_err(ReplaceError::Index)?;
        Ok(index)
    }
}
