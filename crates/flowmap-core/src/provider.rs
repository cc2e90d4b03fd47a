//! Proveedores de flujos destino.
//!
//! Antes de construir los índices, el motor pide al proveedor que persista
//! los flujos destino, de modo que existan en la base antes de consumirlos.
//! Un proveedor que falla no aborta la corrida: los destinos no persistidos
//! simplemente no se pueden sincronizar y sus entradas quedan excluidas.

use std::collections::HashMap;

use flowmap_domain::FlowRef;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ProviderError;
use crate::store::{find_or_create, FlowStore};

pub trait TargetFlowProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Persiste los flujos solicitados; devuelve cuántos quedaron disponibles.
    fn persist(&self, flows: &[FlowRef], store: &dyn FlowStore) -> Result<usize, ProviderError>;
}

/// Los flujos destino ya viven en la misma base: no hay nada que persistir.
#[derive(Debug, Default)]
pub struct DbProvider;

impl TargetFlowProvider for DbProvider {
    fn name(&self) -> &str { "db" }
    fn persist(&self, _flows: &[FlowRef], _store: &dyn FlowStore) -> Result<usize, ProviderError> { Ok(0) }
}

/// Metadatos de un flujo externo (lista de referencia, otra base, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDescriptor {
    pub ref_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub unit: String,
    pub quantity: String,
}

impl FlowDescriptor {
    fn to_ref(&self, status_source: &FlowRef) -> FlowRef {
        FlowRef { ref_id: self.ref_id,
                  name: Some(self.name.clone()),
                  category: self.category.clone(),
                  unit: Some(self.unit.clone()),
                  quantity: Some(self.quantity.clone()),
                  status: status_source.status.clone() }
    }
}

/// Proveedor respaldado por un catálogo de flujos externo: crea en la base
/// los destinos que conoce y todavía no existen.
#[derive(Debug, Default)]
pub struct CatalogProvider {
    name: String,
    flows: HashMap<Uuid, FlowDescriptor>,
}

impl CatalogProvider {
    pub fn new(name: &str, flows: Vec<FlowDescriptor>) -> Self {
        Self { name: name.to_string(), flows: flows.into_iter().map(|f| (f.ref_id, f)).collect() }
    }

    pub fn from_json(name: &str, raw: &str) -> Result<Self, ProviderError> {
        let flows: Vec<FlowDescriptor> = serde_json::from_str(raw).map_err(|e| ProviderError::Catalog(e.to_string()))?;
        Ok(Self::new(name, flows))
    }

    pub fn len(&self) -> usize { self.flows.len() }
    pub fn is_empty(&self) -> bool { self.flows.is_empty() }
}

impl TargetFlowProvider for CatalogProvider {
    fn name(&self) -> &str { &self.name }

    fn persist(&self, flows: &[FlowRef], store: &dyn FlowStore) -> Result<usize, ProviderError> {
        let mut persisted = 0;
        for flow in flows {
            let Some(descriptor) = self.flows.get(&flow.ref_id) else {
                warn!("provider {}: flow {} not in catalog", self.name, flow.ref_id);
                continue;
            };
            let resolved = match find_or_create(store, &descriptor.to_ref(flow)) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("provider {}: could not persist flow {}: {e}", self.name, flow.ref_id);
                    continue;
                }
            };
            debug!("provider {}: flow {} available as id={}", self.name, flow.ref_id, resolved.id);
            persisted += 1;
        }
        Ok(persisted)
    }
}
