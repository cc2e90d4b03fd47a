//! flowmap-core: motor de reemplazo de flujos según una tabla de mapeo.
//!
//! Módulos:
//! - `store`: contrato de almacenamiento (`FlowStore`) e implementación en memoria.
//! - `provider`: persistencia previa de flujos destino.
//! - `conversion`: tabla de conversión de unidades de la corrida.
//! - `index`: índices origen → entrada y id → flujo.
//! - `cursor`: recorrido y reescritura de un dominio.
//! - `stats`: contadores por cursor y su fusión.
//! - `replacer`: orquestación, compuerta de borrado y reporte.
pub mod config;
pub mod conversion;
pub mod cursor;
pub mod errors;
pub mod index;
pub mod provider;
pub mod replacer;
pub mod stats;
pub mod store;

pub use config::EngineSettings;
pub use conversion::ConversionTable;
pub use cursor::{Cursor, CursorState};
pub use errors::{ConversionError, ProviderError, ReplaceError, StoreError};
pub use index::{IndexBuilder, IndexedEntry, ReplacementIndex, SkipReason};
pub use provider::{CatalogProvider, DbProvider, FlowDescriptor, TargetFlowProvider};
pub use replacer::{EntryOutcome, ReplacementReport, Replacer, ReplacerConfig};
pub use stats::Stats;
pub use store::{FlowPropertyFactor, FlowStore, InMemoryFlowStore, UnitFactor};
