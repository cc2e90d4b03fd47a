//! Tabla de conversión de unidades de la corrida.
//!
//! Se construye una sola vez sobre toda la base (independiente de las
//! entradas) y es inmutable durante la corrida. Combina:
//! - factores de unidad: unidad → (magnitud, factor a la unidad de referencia
//!   de esa magnitud);
//! - factores de propiedad por flujo: (flujo, magnitud) → cantidad de esa
//!   magnitud por unidad de la magnitud de referencia del flujo.

use std::collections::HashMap;

use flowmap_domain::{FlowId, ResolvedFlow};

use crate::errors::{ConversionError, StoreError};
use crate::store::{FlowPropertyFactor, FlowStore, UnitFactor};

#[derive(Debug, Clone, Default)]
pub struct ConversionTable {
    units: HashMap<String, (String, f64)>,
    properties: HashMap<(FlowId, String), f64>,
}

impl ConversionTable {
    pub fn create(store: &dyn FlowStore) -> Result<Self, StoreError> {
        Ok(Self::from_parts(store.units()?, store.flow_property_factors()?))
    }

    pub fn from_parts(units: Vec<UnitFactor>, properties: Vec<FlowPropertyFactor>) -> Self {
        let units = units.into_iter().map(|u| (u.name, (u.quantity, u.factor))).collect();
        let properties = properties.into_iter().map(|p| ((p.flow_id, p.quantity), p.factor)).collect();
        Self { units, properties }
    }

    pub fn unit(&self, name: &str) -> Option<(&str, f64)> {
        self.units.get(name).map(|(q, f)| (q.as_str(), *f))
    }

    fn property(&self, flow: &ResolvedFlow, quantity: &str) -> Option<f64> {
        if quantity == flow.reference_quantity {
            return Some(1.0);
        }
        self.properties.get(&(flow.id, quantity.to_string())).copied().filter(|f| *f != 0.0)
    }

    /// Multiplicador que expresa una cantidad de `flow` dada en `unit` en la
    /// unidad de referencia del flujo. `None` si la unidad es desconocida o el
    /// flujo no tiene factor para su magnitud.
    pub fn factor_of(&self, flow: &ResolvedFlow, unit: &str) -> Option<f64> {
        if unit == flow.reference_unit {
            return Some(1.0);
        }
        let (quantity, unit_factor) = self.unit(unit)?;
        let (ref_quantity, ref_unit_factor) = self.unit(&flow.reference_unit)?;
        if ref_unit_factor == 0.0 {
            return None;
        }
        // x [unit] -> x * uf [ref. unit of quantity] -> / pf(quantity) [ref. quantity]
        let to_reference = self.property(flow, quantity)?;
        let ref_pf = self.property(flow, ref_quantity)?;
        Some(unit_factor / to_reference * ref_pf / ref_unit_factor)
    }

    /// Factor efectivo para reescribir un registro de `source` (en `unit`)
    /// como registro de `target` en su unidad de referencia.
    ///
    /// Con factor explícito, éste convierte de la unidad de referencia del
    /// origen a la del destino; sin él se deriva de la tabla relacionando las
    /// magnitudes de referencia de ambos flujos.
    pub fn effective_factor(&self,
                            source: &ResolvedFlow,
                            target: &ResolvedFlow,
                            unit: &str,
                            explicit: Option<f64>)
                            -> Result<f64, ConversionError> {
        if let Some(factor) = explicit {
            let normalize = self.factor_of(source, unit).ok_or_else(|| self.failure(source, unit))?;
            return Ok(normalize * factor);
        }
        if let Some(direct) = self.factor_of(target, unit) {
            return Ok(direct);
        }
        let to_source = self.factor_of(source, unit).ok_or_else(|| self.failure(source, unit))?;
        if let Some(source_to_target) = self.factor_of(target, &source.reference_unit) {
            return Ok(to_source * source_to_target);
        }
        // relación vía las propiedades del origen: cuánto del origen vale una
        // unidad de referencia del destino
        match self.factor_of(source, &target.reference_unit) {
            Some(target_in_source) if target_in_source != 0.0 => Ok(to_source / target_in_source),
            _ => Err(self.failure(target, unit)),
        }
    }

    fn failure(&self, flow: &ResolvedFlow, unit: &str) -> ConversionError {
        if self.units.contains_key(unit) {
            ConversionError::Incompatible { flow_id: flow.id, unit: unit.to_string() }
        } else {
            ConversionError::UnknownUnit(unit.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn flow(id: FlowId, unit: &str, quantity: &str) -> ResolvedFlow {
        ResolvedFlow { id,
                       ref_id: Uuid::new_v4(),
                       name: format!("flow {id}"),
                       reference_unit: unit.into(),
                       reference_quantity: quantity.into() }
    }

    fn table() -> ConversionTable {
        let units = vec![UnitFactor { name: "kg".into(), quantity: "Mass".into(), factor: 1.0 },
                         UnitFactor { name: "g".into(), quantity: "Mass".into(), factor: 0.001 },
                         UnitFactor { name: "t".into(), quantity: "Mass".into(), factor: 1000.0 },
                         UnitFactor { name: "MJ".into(), quantity: "Energy".into(), factor: 1.0 },
                         UnitFactor { name: "m3".into(), quantity: "Volume".into(), factor: 1.0 }];
        // flujo 3: gas natural, 1 m3 = 40 MJ
        let props = vec![FlowPropertyFactor { flow_id: 3, quantity: "Energy".into(), factor: 40.0 }];
        ConversionTable::from_parts(units, props)
    }

    #[test]
    fn same_quantity_units_scale() {
        let t = table();
        let kg = flow(1, "kg", "Mass");
        assert_eq!(t.factor_of(&kg, "kg"), Some(1.0));
        assert!((t.factor_of(&kg, "g").unwrap() - 0.001).abs() < 1e-12);
        assert!((t.factor_of(&kg, "t").unwrap() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn derived_factor_relates_reference_units() {
        let t = table();
        let source = flow(1, "kg", "Mass");
        let target = flow(2, "g", "Mass");
        let f = t.effective_factor(&source, &target, "kg", None).unwrap();
        assert!((f - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn derived_factor_crosses_quantities_through_properties() {
        let t = table();
        let source = flow(4, "MJ", "Energy");
        let target = flow(3, "m3", "Volume");
        // 80 MJ de gas natural son 2 m3
        let f = t.effective_factor(&source, &target, "MJ", None).unwrap();
        assert!((80.0 * f - 2.0).abs() < 1e-9);
    }

    #[test]
    fn derived_factor_uses_source_properties() {
        let t = table();
        // origen en m3 con propiedad de energía; destino sólo conoce su energía
        let source = flow(3, "m3", "Volume");
        let target = flow(6, "MJ", "Energy");
        let f = t.effective_factor(&source, &target, "m3", None).unwrap();
        assert!((f - 40.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_factor_wins_and_normalizes_record_unit() {
        let t = table();
        let source = flow(1, "kg", "Mass");
        let target = flow(2, "kg", "Mass");
        assert_eq!(t.effective_factor(&source, &target, "kg", Some(2.0)).unwrap(), 2.0);
        let f = t.effective_factor(&source, &target, "g", Some(2.0)).unwrap();
        assert!((f - 0.002).abs() < 1e-12);
    }

    #[test]
    fn incompatible_and_unknown_units_fail() {
        let t = table();
        let source = flow(1, "kg", "Mass");
        let target = flow(5, "MJ", "Energy");
        assert!(matches!(t.effective_factor(&source, &target, "kg", None),
                         Err(ConversionError::Incompatible { .. })));
        assert!(matches!(t.effective_factor(&source, &target, "lb", None),
                         Err(ConversionError::UnknownUnit(_))));
    }
}
