//! Backend en memoria de `FlowStore`.
//!
//! Rápido para tests y la demo; respeta las mismas reglas que el backend
//! Postgres (orden de scan por id, borrado restringido a flujos no usados).
//! Permite simular fallos de escritura/lectura por registro o dominio.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;

use dashmap::{DashMap, DashSet};
use flowmap_domain::{Domain, DomainRecord, FlowId, NewFlow, RecordUpdate, ResolvedFlow};
use uuid::Uuid;

use super::{FlowPropertyFactor, FlowStore, UnitFactor};
use crate::errors::StoreError;

#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: DashMap<FlowId, ResolvedFlow>,
    by_ref: DashMap<Uuid, FlowId>,
    units: DashMap<String, UnitFactor>,
    properties: DashMap<(FlowId, String), f64>,
    exchanges: RwLock<BTreeMap<i64, DomainRecord>>,
    impacts: RwLock<BTreeMap<i64, DomainRecord>>,
    next_flow_id: AtomicI64,
    next_record_id: AtomicI64,
    rejected_updates: DashSet<(Domain, i64)>,
    rejected_deletes: DashSet<FlowId>,
    rejected_inserts: DashSet<Uuid>,
    broken_domains: DashSet<Domain>,
    usage_unavailable: AtomicBool,
    units_unavailable: AtomicBool,
}

impl InMemoryFlowStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_unit(self, name: &str, quantity: &str, factor: f64) -> Self {
        self.units.insert(name.to_string(), UnitFactor { name: name.to_string(), quantity: quantity.to_string(), factor });
        self
    }

    /// Registra un flujo ya existente en la "base" y devuelve su id.
    pub fn add_flow(&self, ref_id: Uuid, name: &str, reference_unit: &str, reference_quantity: &str) -> FlowId {
        let new_flow = NewFlow { ref_id,
                                 name: name.to_string(),
                                 category: None,
                                 reference_unit: reference_unit.to_string(),
                                 reference_quantity: reference_quantity.to_string() };
        self.insert_new(&new_flow).id
    }

    pub fn add_property_factor(&self, flow_id: FlowId, quantity: &str, factor: f64) {
        self.properties.insert((flow_id, quantity.to_string()), factor);
    }

    /// Agrega un registro al dominio y devuelve su id (monotónico, global).
    pub fn add_record(&self, domain: Domain, owner_id: i64, flow_id: FlowId, amount: f64, unit: &str) -> i64 {
        let id = self.next_record_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = DomainRecord { id, owner_id, flow_id, amount, unit: unit.to_string() };
        if let Ok(mut table) = self.table(domain).write() {
            table.insert(id, record);
        }
        id
    }

    pub fn record(&self, domain: Domain, id: i64) -> Option<DomainRecord> {
        self.table(domain).read().ok().and_then(|t| t.get(&id).cloned())
    }

    pub fn flow_count(&self) -> usize { self.flows.len() }

    pub fn contains_flow(&self, id: FlowId) -> bool { self.flows.contains_key(&id) }

    /// Hace fallar toda actualización del registro indicado.
    pub fn reject_update(&self, domain: Domain, record_id: i64) {
        self.rejected_updates.insert((domain, record_id));
    }

    /// Hace fallar toda lectura del dominio indicado.
    pub fn break_domain(&self, domain: Domain) {
        self.broken_domains.insert(domain);
    }

    pub fn reject_delete(&self, flow_id: FlowId) {
        self.rejected_deletes.insert(flow_id);
    }

    pub fn reject_insert(&self, ref_id: Uuid) {
        self.rejected_inserts.insert(ref_id);
    }

    /// Hace fallar la consulta de flujos usados.
    pub fn break_usage(&self) {
        self.usage_unavailable.store(true, Ordering::SeqCst);
    }

    /// Hace fallar la lectura de unidades y factores de propiedad.
    pub fn break_units(&self) {
        self.units_unavailable.store(true, Ordering::SeqCst);
    }

    fn units_check(&self) -> Result<(), StoreError> {
        if self.units_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("unit tables unavailable".into()));
        }
        Ok(())
    }

    fn table(&self, domain: Domain) -> &RwLock<BTreeMap<i64, DomainRecord>> {
        match domain {
            Domain::Exchanges => &self.exchanges,
            Domain::Impacts => &self.impacts,
        }
    }

    fn insert_new(&self, flow: &NewFlow) -> ResolvedFlow {
        let id = self.next_flow_id.fetch_add(1, Ordering::SeqCst) + 1;
        let resolved = ResolvedFlow { id,
                                      ref_id: flow.ref_id,
                                      name: flow.name.clone(),
                                      reference_unit: flow.reference_unit.clone(),
                                      reference_quantity: flow.reference_quantity.clone() };
        self.flows.insert(id, resolved.clone());
        self.by_ref.insert(flow.ref_id, id);
        self.properties.insert((id, flow.reference_quantity.clone()), 1.0);
        resolved
    }

    fn poisoned(domain: Domain) -> StoreError {
        StoreError::Backend(format!("{} table lock poisoned", domain.label()))
    }
}

impl FlowStore for InMemoryFlowStore {
    fn find_flow(&self, ref_id: &Uuid) -> Result<Option<ResolvedFlow>, StoreError> {
        let id = match self.by_ref.get(ref_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_flow(id)
    }

    fn get_flow(&self, id: FlowId) -> Result<Option<ResolvedFlow>, StoreError> {
        Ok(self.flows.get(&id).map(|f| f.clone()))
    }

    fn insert_flow(&self, flow: &NewFlow) -> Result<ResolvedFlow, StoreError> {
        if self.rejected_inserts.contains(&flow.ref_id) {
            return Err(StoreError::Backend(format!("insert of flow {} rejected", flow.ref_id)));
        }
        if self.by_ref.contains_key(&flow.ref_id) {
            return Err(StoreError::Conflict(format!("flow {} already exists", flow.ref_id)));
        }
        Ok(self.insert_new(flow))
    }

    fn delete_flow(&self, id: FlowId) -> Result<(), StoreError> {
        if self.rejected_deletes.contains(&id) {
            return Err(StoreError::Backend(format!("delete of flow {id} rejected")));
        }
        if self.used_flows()?.contains(&id) {
            return Err(StoreError::Conflict(format!("flow {id} is still referenced")));
        }
        let (_, flow) = self.flows.remove(&id).ok_or_else(|| StoreError::NotFound(format!("flow {id}")))?;
        self.by_ref.remove(&flow.ref_id);
        self.properties.retain(|(flow_id, _), _| *flow_id != id);
        Ok(())
    }

    fn used_flows(&self) -> Result<HashSet<FlowId>, StoreError> {
        if self.usage_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("usage query unavailable".into()));
        }
        let mut used = HashSet::new();
        for domain in Domain::all() {
            let table = self.table(domain).read().map_err(|_| Self::poisoned(domain))?;
            used.extend(table.values().map(|r| r.flow_id));
        }
        Ok(used)
    }

    fn scan(&self, domain: Domain, after: Option<i64>, limit: usize) -> Result<Vec<DomainRecord>, StoreError> {
        if self.broken_domains.contains(&domain) {
            return Err(StoreError::Backend(format!("{} table unavailable", domain.label())));
        }
        let table = self.table(domain).read().map_err(|_| Self::poisoned(domain))?;
        let lower = after.map(|a| a.saturating_add(1)).unwrap_or(i64::MIN);
        Ok(table.range(lower..).take(limit).map(|(_, r)| r.clone()).collect())
    }

    fn update_record(&self, domain: Domain, update: &RecordUpdate) -> Result<(), StoreError> {
        if self.rejected_updates.contains(&(domain, update.record_id)) {
            return Err(StoreError::Backend(format!("update of {} record {} rejected", domain.label(), update.record_id)));
        }
        if !self.flows.contains_key(&update.flow_id) {
            return Err(StoreError::Conflict(format!("flow {} does not exist", update.flow_id)));
        }
        let mut table = self.table(domain).write().map_err(|_| Self::poisoned(domain))?;
        let record = table.get_mut(&update.record_id)
                          .ok_or_else(|| StoreError::NotFound(format!("{} record {}", domain.label(), update.record_id)))?;
        record.flow_id = update.flow_id;
        record.amount = update.amount;
        record.unit = update.unit.clone();
        Ok(())
    }

    fn units(&self) -> Result<Vec<UnitFactor>, StoreError> {
        self.units_check()?;
        Ok(self.units.iter().map(|u| u.value().clone()).collect())
    }

    fn flow_property_factors(&self) -> Result<Vec<FlowPropertyFactor>, StoreError> {
        self.units_check()?;
        Ok(self.properties
               .iter()
               .map(|e| FlowPropertyFactor { flow_id: e.key().0, quantity: e.key().1.clone(), factor: *e.value() })
               .collect())
    }
}
