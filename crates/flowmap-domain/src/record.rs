use serde::{Deserialize, Serialize};
use std::fmt;

use crate::FlowId;

/// Dominios relacionales que referencian flujos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Intercambios de procesos.
    Exchanges,
    /// Factores de caracterización de métodos de impacto.
    Impacts,
}

impl Domain {
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Exchanges => "exchanges",
            Domain::Impacts => "impacts",
        }
    }

    pub fn all() -> [Domain; 2] { [Domain::Exchanges, Domain::Impacts] }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Registro de un dominio: un intercambio (owner = proceso) o un factor de
/// impacto (owner = categoría de impacto). `amount` es la cantidad o el valor
/// del factor, expresado en `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: i64,
    pub owner_id: i64,
    pub flow_id: FlowId,
    pub amount: f64,
    pub unit: String,
}

/// Mutación de un único registro; cada una se confirma de forma independiente.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub record_id: i64,
    pub flow_id: FlowId,
    pub amount: f64,
    pub unit: String,
}
