//! flowmap-rust
//!
//! Fachada del workspace: reexporta el modelo (`flowmap-domain`), el motor
//! (`flowmap-core`) y el backend Postgres (`flowmap-persistence`), más un
//! conjunto de datos de demostración en `seed`.

pub mod seed;

pub use flowmap_core as core;
pub use flowmap_domain as domain;
pub use flowmap_persistence as persistence;

pub use flowmap_core::{InMemoryFlowStore, ReplacementReport, Replacer, ReplacerConfig};
pub use flowmap_domain::{MappingEntry, MappingTable};
