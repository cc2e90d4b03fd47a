//! Errores del motor de reemplazo.
//!
//! `ReplaceError` sigue la taxonomía de fallos de la corrida: los fallos por
//! registro (`Conversion`, `Persistence`, `MissingTarget`) se recuperan
//! localmente en los cursores; `Stream`, `Pool` e `Index` son fatales para la
//! corrida pero nunca salen de `Replacer::run`.

use flowmap_domain::FlowId;
use thiserror::Error;
use uuid::Uuid;

/// Errores del backend de almacenamiento (`FlowStore`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")] NotFound(String),
    #[error("conflict: {0}")] Conflict(String),
    #[error("backend: {0}")] Backend(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("unknown unit '{0}'")] UnknownUnit(String),
    #[error("no conversion from '{unit}' to the reference unit of flow {flow_id}")] Incompatible { flow_id: FlowId, unit: String },
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("storage error while persisting target flows: {0}")] Store(#[from] StoreError),
    #[error("catalog: {0}")] Catalog(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReplaceError {
    #[error("could not synchronize flow {ref_id}: {reason}")] Sync { ref_id: Uuid, reason: String },
    #[error("target flow of source {0} is not indexed")] MissingTarget(FlowId),
    #[error("conversion failed: {0}")] Conversion(#[from] ConversionError),
    #[error("could not persist record {record_id}: {source}")] Persistence { record_id: i64, source: StoreError },
    #[error("could not read {domain} records: {source}")] Stream { domain: &'static str, source: StoreError },
    #[error("worker pool failure: {0}")] Pool(String),
    #[error("could not build replacement index: {0}")] Index(StoreError),
}
