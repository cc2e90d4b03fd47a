//! Contrato de almacenamiento consumido por el motor.
//!
//! El motor no conoce el formato de persistencia: sólo necesita lecturas
//! paginadas por dominio, actualizaciones puntuales de registros, consulta de
//! flujos usados, borrado y búsqueda/alta de flujos, y los datos de unidades
//! para construir la `ConversionTable`.

pub mod memory;

use std::collections::HashSet;

use flowmap_domain::{Domain, DomainRecord, FlowId, FlowRef, NewFlow, RecordUpdate, ResolvedFlow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ReplaceError, StoreError};

pub use memory::InMemoryFlowStore;

/// Unidad y su factor respecto a la unidad de referencia de su magnitud
/// (p.ej. `g` → `Mass`, 0.001).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFactor {
    pub name: String,
    pub quantity: String,
    pub factor: f64,
}

/// Cantidad de `quantity` por una unidad de la magnitud de referencia del
/// flujo (la magnitud de referencia misma vale 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowPropertyFactor {
    pub flow_id: FlowId,
    pub quantity: String,
    pub factor: f64,
}

pub trait FlowStore: Send + Sync {
    fn find_flow(&self, ref_id: &Uuid) -> Result<Option<ResolvedFlow>, StoreError>;
    fn get_flow(&self, id: FlowId) -> Result<Option<ResolvedFlow>, StoreError>;
    /// Inserta un flujo y registra su magnitud de referencia con factor 1.0.
    fn insert_flow(&self, flow: &NewFlow) -> Result<ResolvedFlow, StoreError>;
    fn delete_flow(&self, id: FlowId) -> Result<(), StoreError>;
    /// Flujos referenciados por al menos un registro de cualquier dominio.
    fn used_flows(&self) -> Result<HashSet<FlowId>, StoreError>;
    /// Página de registros con `id > after`, en orden ascendente de id.
    fn scan(&self, domain: Domain, after: Option<i64>, limit: usize) -> Result<Vec<DomainRecord>, StoreError>;
    /// Confirma una única mutación; no hay transacción entre registros.
    fn update_record(&self, domain: Domain, update: &RecordUpdate) -> Result<(), StoreError>;
    fn units(&self) -> Result<Vec<UnitFactor>, StoreError>;
    fn flow_property_factors(&self) -> Result<Vec<FlowPropertyFactor>, StoreError>;
}

/// Sincroniza una referencia de la tabla con su flujo persistido.
pub fn sync_flow(store: &dyn FlowStore, flow: &FlowRef) -> Result<ResolvedFlow, ReplaceError> {
    match store.find_flow(&flow.ref_id) {
        Ok(Some(resolved)) => Ok(resolved),
        Ok(None) => Err(ReplaceError::Sync { ref_id: flow.ref_id, reason: "not in database".into() }),
        Err(e) => Err(ReplaceError::Sync { ref_id: flow.ref_id, reason: e.to_string() }),
    }
}

/// Busca el flujo y, si no existe, lo inserta con los metadatos de la referencia.
pub fn find_or_create(store: &dyn FlowStore, flow: &FlowRef) -> Result<ResolvedFlow, StoreError> {
    if let Some(found) = store.find_flow(&flow.ref_id)? {
        return Ok(found);
    }
    let new_flow = NewFlow::from_ref(flow).map_err(|e| StoreError::Conflict(e.to_string()))?;
    store.insert_flow(&new_flow)
}
