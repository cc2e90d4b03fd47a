//! Identidad de flujos: referencias de la tabla de mapeo (`FlowRef`) y
//! registros persistidos ya sincronizados contra la base (`ResolvedFlow`).
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::DomainError;

/// Identificador numérico de un flujo en la base de datos.
pub type FlowId = i64;

/// Estado de validación/aplicación de una referencia de flujo.
///
/// El editor de mapeos fija el estado inicial (validación); el motor de
/// reemplazo sólo lo sobreescribe en el flujo origen al terminar una corrida.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok(String),
    Error(String),
}

impl Status {
    pub fn ok(message: impl Into<String>) -> Self { Status::Ok(message.into()) }
    pub fn error(message: impl Into<String>) -> Self { Status::Error(message.into()) }
    pub fn is_error(&self) -> bool { matches!(self, Status::Error(_)) }
    pub fn message(&self) -> &str {
        match self {
            Status::Ok(m) | Status::Error(m) => m,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok(m) => write!(f, "ok: {m}"),
            Status::Error(m) => write!(f, "error: {m}"),
        }
    }
}

/// Referencia a un flujo tal como aparece en una entrada de mapeo.
///
/// `status == None` significa que la referencia nunca fue validada; el motor
/// la trata igual que un error (la entrada no es elegible).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRef {
    pub ref_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Unidad de referencia declarada (p.ej. "kg").
    #[serde(default)]
    pub unit: Option<String>,
    /// Magnitud de referencia declarada (p.ej. "Mass").
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
}

impl FlowRef {
    pub fn new(ref_id: Uuid) -> Self {
        Self { ref_id, name: None, category: None, unit: None, quantity: None, status: None }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_unit(mut self, unit: &str, quantity: &str) -> Self {
        self.unit = Some(unit.to_string());
        self.quantity = Some(quantity.to_string());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Elegible para reemplazo sólo si fue validada y no tiene error.
    pub fn is_valid(&self) -> bool {
        matches!(&self.status, Some(s) if !s.is_error())
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => self.ref_id.to_string(),
        }
    }
}

/// Flujo persistido: resultado de sincronizar un `FlowRef` contra la base.
/// Compartido de sólo lectura por los cursores una vez construido el índice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFlow {
    pub id: FlowId,
    pub ref_id: Uuid,
    pub name: String,
    pub reference_unit: String,
    pub reference_quantity: String,
}

impl ResolvedFlow {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.ref_id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Metadatos para insertar un flujo todavía inexistente (find-or-create).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlow {
    pub ref_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub reference_unit: String,
    pub reference_quantity: String,
}

impl NewFlow {
    /// Construye los metadatos a partir de una referencia; exige unidad y
    /// magnitud porque sin ellas no hay conversión posible.
    pub fn from_ref(flow: &FlowRef) -> Result<Self, DomainError> {
        let unit = flow.unit
                       .clone()
                       .ok_or_else(|| DomainError::Validation(format!("flow {} has no reference unit", flow.ref_id)))?;
        let quantity = flow.quantity
                           .clone()
                           .ok_or_else(|| DomainError::Validation(format!("flow {} has no reference quantity", flow.ref_id)))?;
        Ok(Self { ref_id: flow.ref_id,
                  name: flow.display_name(),
                  category: flow.category.clone(),
                  reference_unit: unit,
                  reference_quantity: quantity })
    }
}
