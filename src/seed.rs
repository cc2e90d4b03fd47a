//! Base de demostración en memoria: tres flujos origen con registros en ambos
//! dominios y una tabla de mapeo que ejercita conversión por unidad, factor
//! explícito y una entrada no elegible.

use std::sync::Arc;

use flowmap_core::InMemoryFlowStore;
use flowmap_domain::{Domain, FlowId, FlowRef, MappingEntry, MappingTable, Status};
use uuid::Uuid;

pub struct DemoData {
    pub store: Arc<InMemoryFlowStore>,
    pub table: MappingTable,
    /// (origen, destino) por entrada elegible, en orden de la tabla.
    pub pairs: Vec<(FlowId, FlowId)>,
}

fn matched(id: Uuid, name: &str) -> FlowRef {
    FlowRef::new(id).named(name).with_status(Status::ok("matched"))
}

pub fn demo() -> DemoData {
    let store = Arc::new(InMemoryFlowStore::new().with_unit("kg", "Mass", 1.0)
                                                 .with_unit("g", "Mass", 0.001)
                                                 .with_unit("t", "Mass", 1000.0)
                                                 .with_unit("m3", "Volume", 1.0));

    let (co2, co2_new) = (Uuid::new_v4(), Uuid::new_v4());
    let (ch4, ch4_new) = (Uuid::new_v4(), Uuid::new_v4());
    let (n2o, n2o_new) = (Uuid::new_v4(), Uuid::new_v4());

    let co2_id = store.add_flow(co2, "carbon dioxide", "kg", "Mass");
    let co2_new_id = store.add_flow(co2_new, "carbon dioxide, fossil", "g", "Mass");
    let ch4_id = store.add_flow(ch4, "methane", "kg", "Mass");
    let ch4_new_id = store.add_flow(ch4_new, "methane, biogenic", "kg", "Mass");
    let n2o_id = store.add_flow(n2o, "dinitrogen monoxide", "kg", "Mass");
    store.add_flow(n2o_new, "nitrous oxide", "kg", "Mass");

    store.add_record(Domain::Exchanges, 1, co2_id, 1.5, "kg");
    store.add_record(Domain::Exchanges, 2, co2_id, 0.002, "t");
    store.add_record(Domain::Exchanges, 2, ch4_id, 0.3, "kg");
    store.add_record(Domain::Impacts, 100, co2_id, 1.0, "kg");
    store.add_record(Domain::Impacts, 100, ch4_id, 28.0, "kg");
    // N2O sigue en uso; su entrada no es elegible
    store.add_record(Domain::Impacts, 100, n2o_id, 265.0, "kg");

    let mut n2o_source = matched(n2o, "dinitrogen monoxide");
    n2o_source.status = Some(Status::error("ambiguous match"));
    let table = MappingTable::new("demo",
                                  vec![MappingEntry::new(matched(co2, "carbon dioxide"),
                                                         matched(co2_new, "carbon dioxide, fossil")),
                                       MappingEntry::new(matched(ch4, "methane"),
                                                         matched(ch4_new, "methane, biogenic")).with_factor(0.9),
                                       MappingEntry::new(n2o_source, matched(n2o_new, "nitrous oxide"))]);

    DemoData { store, table, pairs: vec![(co2_id, co2_new_id), (ch4_id, ch4_new_id)] }
}
