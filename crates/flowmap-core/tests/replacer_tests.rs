use std::sync::Arc;
use std::time::Duration;

use flowmap_core::replacer::{STATUS_ABORTED, STATUS_ABORTED_PARTIAL, STATUS_APPLIED_KEPT, STATUS_APPLIED_REMOVED,
                              STATUS_REPLACEMENT_ERROR};
use flowmap_core::{CatalogProvider, EngineSettings, FlowDescriptor, FlowStore, InMemoryFlowStore, ProviderError,
                   Replacer, ReplacerConfig, SkipReason, TargetFlowProvider};
use flowmap_domain::{Domain, EntryId, FlowRef, MappingEntry, MappingTable, Status};
use uuid::Uuid;

fn ok_ref(id: Uuid) -> FlowRef { FlowRef::new(id).with_status(Status::ok("matched")) }

fn settings() -> EngineSettings {
    EngineSettings::default().with_poll_interval(Duration::from_millis(20)).with_page_size(3)
}

fn conf(delete: bool) -> ReplacerConfig {
    ReplacerConfig::all_domains().with_delete_mapped(delete).with_settings(settings())
}

/// Dos entradas kg -> kg, con registros en ambos dominios para la primera.
fn two_entry_db() -> (Arc<InMemoryFlowStore>, MappingTable, [i64; 4]) {
    let store = Arc::new(InMemoryFlowStore::new().with_unit("kg", "Mass", 1.0));
    let (s1, t1, s2, t2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let ids = [store.add_flow(s1, "s1", "kg", "Mass"),
               store.add_flow(t1, "t1", "kg", "Mass"),
               store.add_flow(s2, "s2", "kg", "Mass"),
               store.add_flow(t2, "t2", "kg", "Mass")];
    store.add_record(Domain::Exchanges, 1, ids[0], 1.0, "kg");
    store.add_record(Domain::Impacts, 2, ids[0], 0.5, "kg");
    let table = MappingTable::new("two",
                                  vec![MappingEntry::new(ok_ref(s1), ok_ref(t1)),
                                       MappingEntry::new(ok_ref(s2), ok_ref(t2))]);
    (store, table, ids)
}

#[tokio::test]
async fn no_domain_selected_is_a_fast_exit() {
    let (store, table, _) = two_entry_db();
    let report = Replacer::new(store).run(&ReplacerConfig::default(), &table).await;
    assert_eq!(report.eligible, 0);
    assert!(report.outcomes.is_empty());
    assert!(!report.aborted);
}

#[tokio::test]
async fn clean_run_with_deletion_removes_unused_sources() {
    let (store, mut table, ids) = two_entry_db();
    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;

    assert!(!report.aborted);
    assert_eq!(report.eligible, 2);
    assert_eq!(report.stats.replaced, 2);
    assert_eq!(report.domain_stats(Domain::Exchanges).unwrap().replaced, 1);
    assert_eq!(report.domain_stats(Domain::Impacts).unwrap().replaced, 1);
    assert_eq!(report.removed_count(), 2);
    assert!(!store.contains_flow(ids[0]) && !store.contains_flow(ids[2]));

    report.apply(&mut table);
    for e in &table.entries {
        assert_eq!(e.source_flow.status, Some(Status::ok(STATUS_APPLIED_REMOVED)));
    }
}

#[tokio::test]
async fn deletion_requires_both_domains() {
    let (store, table, ids) = two_entry_db();
    let conf = ReplacerConfig { processes: true, methods: false, delete_mapped: true, settings: settings() };
    let report = Replacer::new(Arc::clone(&store)).run(&conf, &table).await;

    assert!(report.deleted.is_empty());
    assert!(store.contains_flow(ids[2]));
    assert!(report.outcomes.iter().all(|o| o.status == Status::ok(STATUS_APPLIED_KEPT)));
    // el factor de impacto quedó sin tocar
    assert!(store.used_flows().unwrap().contains(&ids[0]));
}

#[tokio::test]
async fn one_failure_closes_deletion_gate_for_every_entry() {
    let (store, table, ids) = two_entry_db();
    let bad = store.add_record(Domain::Exchanges, 1, ids[0], 4.0, "kg");
    store.reject_update(Domain::Exchanges, bad);

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert_eq!(report.stats.failed, 1);
    assert!(report.deleted.is_empty());
    assert_eq!(report.outcome(EntryId(0)).unwrap().status, Status::error(STATUS_REPLACEMENT_ERROR));
    // entrada 1 no tiene registros ni fallos, pero tampoco se borra
    assert_eq!(report.outcome(EntryId(1)).unwrap().status, Status::ok(STATUS_APPLIED_KEPT));
    assert!(store.contains_flow(ids[2]));
    assert_eq!(report.failed_entries(), vec![EntryId(0)]);
}

#[tokio::test]
async fn unreadable_domain_aborts_run_but_keeps_committed_rewrites() {
    let (store, table, ids) = two_entry_db();
    store.break_domain(Domain::Impacts);

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert!(report.aborted);
    assert!(report.deleted.is_empty());
    // entrada 0 ya tenía el intercambio reescrito; entrada 1 no tenía registros
    assert_eq!(report.outcome(EntryId(0)).unwrap().status, Status::error(STATUS_ABORTED_PARTIAL));
    assert_eq!(report.outcome(EntryId(1)).unwrap().status, Status::error(STATUS_ABORTED));
    // la reescritura del intercambio ya confirmada se conserva
    let exchanges = store.scan(Domain::Exchanges, None, 10).unwrap();
    assert_eq!(exchanges[0].flow_id, ids[1]);
}

#[tokio::test]
async fn pool_of_one_still_runs_both_cursors() {
    let (store, table, _) = two_entry_db();
    let conf = conf(false).with_settings(settings().with_pool_size(1));
    let report = Replacer::new(store).run(&conf, &table).await;
    assert_eq!(report.domains.len(), 2);
    assert_eq!(report.stats.replaced, 2);
}

#[tokio::test]
async fn catalog_provider_persists_targets_before_indexing() {
    let store = Arc::new(InMemoryFlowStore::new().with_unit("kg", "Mass", 1.0).with_unit("g", "Mass", 0.001));
    let (s, t) = (Uuid::new_v4(), Uuid::new_v4());
    let source = store.add_flow(s, "methane", "kg", "Mass");
    let record = store.add_record(Domain::Exchanges, 1, source, 2.0, "kg");
    let provider = CatalogProvider::new("ef-3.1",
                                        vec![FlowDescriptor { ref_id: t,
                                                              name: "methane, fossil".into(),
                                                              category: None,
                                                              unit: "g".into(),
                                                              quantity: "Mass".into() }]);
    let table = MappingTable::new("m", vec![MappingEntry::new(ok_ref(s), ok_ref(t))]);

    let report = Replacer::new(Arc::clone(&store)).with_provider(Arc::new(provider))
                                                  .run(&conf(false), &table)
                                                  .await;
    assert_eq!(report.eligible, 1);
    let target = store.find_flow(&t).unwrap().unwrap();
    let r = store.record(Domain::Exchanges, record).unwrap();
    assert_eq!(r.flow_id, target.id);
    assert!((r.amount - 2000.0).abs() < 1e-9);
}

#[tokio::test]
async fn skipped_entries_keep_their_status() {
    let (store, mut table, _) = two_entry_db();
    let mut invalid = MappingEntry::new(ok_ref(Uuid::new_v4()), ok_ref(Uuid::new_v4()));
    invalid.source_flow.status = Some(Status::error("unmatched"));
    table.entries.push(invalid);

    let report = Replacer::new(store).run(&conf(false), &table).await;
    assert_eq!(report.skipped, vec![(EntryId(2), SkipReason::Validation)]);
    report.apply(&mut table);
    assert_eq!(table.entries[2].source_flow.status, Some(Status::error("unmatched")));
}

struct FailingProvider;

impl TargetFlowProvider for FailingProvider {
    fn name(&self) -> &str { "failing" }
    fn persist(&self, _flows: &[FlowRef], _store: &dyn FlowStore) -> Result<usize, ProviderError> {
        Err(ProviderError::Catalog("catalog offline".into()))
    }
}

#[tokio::test]
async fn provider_failure_does_not_stop_the_run() {
    let (store, table, _) = two_entry_db();
    let report = Replacer::new(store).with_provider(Arc::new(FailingProvider)).run(&conf(false), &table).await;
    assert!(!report.aborted);
    assert_eq!(report.eligible, 2);
    assert_eq!(report.stats.replaced, 2);
}

#[tokio::test]
async fn unknown_usage_disables_deletion() {
    let (store, table, ids) = two_entry_db();
    store.break_usage();

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert!(!report.aborted);
    assert!(report.deleted.is_empty());
    assert!(report.outcomes.iter().all(|o| o.status == Status::ok(STATUS_APPLIED_KEPT)));
    assert!(store.contains_flow(ids[0]) && store.contains_flow(ids[2]));
}

#[tokio::test]
async fn failed_delete_keeps_entry_applied() {
    let (store, table, ids) = two_entry_db();
    store.reject_delete(ids[0]);

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert_eq!(report.outcome(EntryId(0)).unwrap().status, Status::ok(STATUS_APPLIED_KEPT));
    assert!(!report.outcome(EntryId(0)).unwrap().removed);
    assert_eq!(report.outcome(EntryId(1)).unwrap().status, Status::ok(STATUS_APPLIED_REMOVED));
    assert_eq!(report.deleted, vec![ids[2]]);
    assert!(store.contains_flow(ids[0]));
}

#[tokio::test]
async fn unreadable_unit_data_aborts_before_any_rewrite() {
    let (store, table, ids) = two_entry_db();
    store.break_units();

    let report = Replacer::new(Arc::clone(&store)).run(&conf(true), &table).await;
    assert!(report.aborted);
    assert!(report.outcomes.is_empty());
    assert!(report.domains.is_empty());
    assert_eq!(report.stats.attempted, 0);
    let exchanges = store.scan(Domain::Exchanges, None, 10).unwrap();
    assert_eq!(exchanges[0].flow_id, ids[0]);
}

#[tokio::test]
async fn oversized_pool_setting_does_not_panic() {
    let (store, table, _) = two_entry_db();
    let mut conf = conf(false);
    conf.settings.pool_size = usize::MAX;
    let report = Replacer::new(store).run(&conf, &table).await;
    assert_eq!(report.stats.replaced, 2);
}
