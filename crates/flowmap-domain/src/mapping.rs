//! Tabla de mapeo de flujos: correspondencias origen → destino validadas por
//! el editor antes de llegar al motor.
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{DomainError, FlowRef};

/// Posición de una entrada dentro de su `MappingTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub usize);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Proveedor por defecto (proceso) asociado al flujo destino.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub ref_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_flow: FlowRef,
    pub target_flow: FlowRef,
    #[serde(default)]
    pub conversion_factor: Option<f64>,
    #[serde(default)]
    pub provider: Option<ProviderRef>,
}

impl MappingEntry {
    pub fn new(source_flow: FlowRef, target_flow: FlowRef) -> Self {
        Self { source_flow, target_flow, conversion_factor: None, provider: None }
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.conversion_factor = Some(factor);
        self
    }

    /// Ambos extremos validados y sin error.
    pub fn is_eligible(&self) -> bool {
        self.source_flow.is_valid() && self.target_flow.is_valid()
    }

    /// Factor explícito utilizable: presente, finito y distinto de cero.
    pub fn explicit_factor(&self) -> Option<f64> {
        self.conversion_factor.filter(|f| f.is_finite() && *f != 0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingTable {
    #[serde(default)]
    pub name: String,
    pub entries: Vec<MappingEntry>,
}

impl MappingTable {
    pub fn new(name: &str, entries: Vec<MappingEntry>) -> Self {
        Self { name: name.to_string(), entries }
    }

    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, DomainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entry(&self, id: EntryId) -> Option<&MappingEntry> { self.entries.get(id.0) }
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut MappingEntry> { self.entries.get_mut(id.0) }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &MappingEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (EntryId(i), e))
    }

    pub fn eligible_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_eligible()).count()
    }

    /// Flujos destino sin marca de error, en el orden de la tabla. Son los que
    /// un proveedor debe persistir antes del reemplazo.
    pub fn target_flows(&self) -> Vec<FlowRef> {
        self.entries
            .iter()
            .filter(|e| e.target_flow.is_valid())
            .map(|e| e.target_flow.clone())
            .collect()
    }
}
