use std::sync::Arc;
use std::time::Duration;

use flowmap_core::replacer::{STATUS_APPLIED_KEPT, STATUS_APPLIED_REMOVED, STATUS_REPLACEMENT_ERROR};
use flowmap_core::{EngineSettings, FlowStore, InMemoryFlowStore, Replacer, ReplacerConfig, SkipReason};
use flowmap_domain::{Domain, EntryId, FlowRef, MappingEntry, MappingTable, Status};
use flowmap_rust::seed;
use uuid::Uuid;

fn ok_ref(id: Uuid) -> FlowRef { FlowRef::new(id).with_status(Status::ok("matched")) }

fn conf(delete: bool) -> ReplacerConfig {
    let settings = EngineSettings::default().with_poll_interval(Duration::from_millis(20));
    ReplacerConfig::all_domains().with_delete_mapped(delete).with_settings(settings)
}

fn kg_store() -> Arc<InMemoryFlowStore> {
    Arc::new(InMemoryFlowStore::new().with_unit("kg", "Mass", 1.0).with_unit("g", "Mass", 0.001))
}

#[tokio::test]
async fn explicit_factor_scales_exchange_amount() {
    let store = kg_store();
    let (s, t) = (Uuid::new_v4(), Uuid::new_v4());
    let source = store.add_flow(s, "source", "kg", "Mass");
    let target = store.add_flow(t, "target", "kg", "Mass");
    let record = store.add_record(Domain::Exchanges, 1, source, 5.0, "kg");
    let mut table = MappingTable::new("s1", vec![MappingEntry::new(ok_ref(s), ok_ref(t)).with_factor(2.0)]);

    let report = Replacer::new(Arc::clone(&store)).run(&conf(false), &table).await;
    let r = store.record(Domain::Exchanges, record).unwrap();
    assert_eq!(r.flow_id, target);
    assert!((r.amount - 10.0).abs() < 1e-12);

    report.apply(&mut table);
    assert_eq!(table.entries[0].source_flow.status, Some(Status::ok(STATUS_APPLIED_KEPT)));
}

#[tokio::test]
async fn unsyncable_target_is_excluded_without_failures() {
    let store = kg_store();
    let s = Uuid::new_v4();
    let source = store.add_flow(s, "source", "kg", "Mass");
    let record = store.add_record(Domain::Exchanges, 1, source, 5.0, "kg");
    // el destino no existe en la base
    let table = MappingTable::new("s2", vec![MappingEntry::new(ok_ref(s), ok_ref(Uuid::new_v4())).with_factor(2.0)]);

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert_eq!(report.eligible, 0);
    assert!(matches!(report.skipped[0], (EntryId(0), SkipReason::Sync(_))));
    assert_eq!(report.stats.failed, 0);
    let r = store.record(Domain::Exchanges, record).unwrap();
    assert_eq!((r.flow_id, r.amount), (source, 5.0));
    assert!(store.contains_flow(source));
}

#[tokio::test]
async fn persistence_failure_marks_entry_and_blocks_all_deletion() {
    let store = kg_store();
    let (s1, t1, s2, t2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let src1 = store.add_flow(s1, "s1", "kg", "Mass");
    store.add_flow(t1, "t1", "kg", "Mass");
    let src2 = store.add_flow(s2, "s2", "kg", "Mass");
    store.add_flow(t2, "t2", "kg", "Mass");
    let bad = store.add_record(Domain::Impacts, 3, src1, 1.0, "kg");
    store.add_record(Domain::Exchanges, 3, src2, 1.0, "kg");
    store.reject_update(Domain::Impacts, bad);
    let mut table = MappingTable::new("s3",
                                      vec![MappingEntry::new(ok_ref(s1), ok_ref(t1)),
                                           MappingEntry::new(ok_ref(s2), ok_ref(t2))]);

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    report.apply(&mut table);
    assert_eq!(table.entries[0].source_flow.status, Some(Status::error(STATUS_REPLACEMENT_ERROR)));
    // s2 quedó sin uso pero la compuerta global está cerrada
    assert_eq!(table.entries[1].source_flow.status, Some(Status::ok(STATUS_APPLIED_KEPT)));
    assert!(store.contains_flow(src2));
    assert!(report.deleted.is_empty());
}

#[tokio::test]
async fn second_run_replaces_nothing() {
    for delete in [false, true] {
        let store = kg_store();
        let (s, t) = (Uuid::new_v4(), Uuid::new_v4());
        let source = store.add_flow(s, "source", "kg", "Mass");
        store.add_flow(t, "target", "g", "Mass");
        store.add_record(Domain::Exchanges, 1, source, 2.0, "kg");
        store.add_record(Domain::Impacts, 1, source, 3.0, "kg");
        let table = MappingTable::new("idem", vec![MappingEntry::new(ok_ref(s), ok_ref(t))]);

        let replacer = Replacer::new(Arc::clone(&store));
        let first = replacer.run(&conf(delete), &table).await;
        assert_eq!(first.stats.replaced, 2);
        let second = replacer.run(&conf(delete), &table).await;
        assert_eq!(second.stats.replaced, 0);
        assert_eq!(second.stats.failed, 0);
    }
}

#[tokio::test]
async fn unit_conversion_uses_target_reference_unit() {
    let store = kg_store();
    let (s, t) = (Uuid::new_v4(), Uuid::new_v4());
    let source = store.add_flow(s, "source", "kg", "Mass");
    let target = store.add_flow(t, "target", "g", "Mass");
    let in_kg = store.add_record(Domain::Exchanges, 1, source, 1.5, "kg");
    let in_g = store.add_record(Domain::Impacts, 1, source, 250.0, "g");
    let table = MappingTable::new("conv", vec![MappingEntry::new(ok_ref(s), ok_ref(t))]);

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert_eq!(report.stats.replaced, 2);
    let a = store.record(Domain::Exchanges, in_kg).unwrap();
    let b = store.record(Domain::Impacts, in_g).unwrap();
    assert_eq!((a.flow_id, a.unit.as_str()), (target, "g"));
    assert!((a.amount - 1500.0).abs() < 1e-9);
    assert_eq!((b.flow_id, b.unit.as_str()), (target, "g"));
    assert!((b.amount - 250.0).abs() < 1e-9);
    assert_eq!(report.deleted, vec![source]);
}

#[tokio::test]
async fn demo_dataset_runs_end_to_end() {
    let seed::DemoData { store, mut table, pairs } = seed::demo();
    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert!(!report.aborted);
    assert_eq!(report.stats.replaced, 5);
    assert_eq!(report.skipped, vec![(EntryId(2), SkipReason::Validation)]);

    for (source, target) in &pairs {
        assert!(!store.contains_flow(*source));
        assert!(store.contains_flow(*target));
    }
    let used = store.used_flows().unwrap();
    assert!(pairs.iter().all(|(s, _)| !used.contains(s)));

    let exchanges = store.scan(Domain::Exchanges, None, 100).unwrap();
    let co2_new = pairs[0].1;
    let total_g: f64 = exchanges.iter().filter(|r| r.flow_id == co2_new).map(|r| r.amount).sum();
    assert!((total_g - 3500.0).abs() < 1e-6);

    report.apply(&mut table);
    assert_eq!(table.entries[0].source_flow.status, Some(Status::ok(STATUS_APPLIED_REMOVED)));
    assert_eq!(table.entries[1].source_flow.status, Some(Status::ok(STATUS_APPLIED_REMOVED)));
    assert_eq!(table.entries[2].source_flow.status, Some(Status::error("ambiguous match")));
}
