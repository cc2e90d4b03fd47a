use flowmap_domain::{FlowRef, MappingEntry, MappingTable, NewFlow, Status};
use uuid::Uuid;

fn valid(name: &str) -> FlowRef {
    FlowRef::new(Uuid::new_v4()).named(name)
                                .with_unit("kg", "Mass")
                                .with_status(Status::ok("matched"))
}

#[test]
fn test_entry_eligible_only_when_both_endpoints_ok() {
    let e = MappingEntry::new(valid("steel"), valid("steel, low-alloyed"));
    assert!(e.is_eligible());

    let mut err_target = e.clone();
    err_target.target_flow.status = Some(Status::error("no match"));
    assert!(!err_target.is_eligible());

    // una referencia no validada cuenta como no elegible
    let mut unvalidated = e.clone();
    unvalidated.source_flow.status = None;
    assert!(!unvalidated.is_eligible());
}

#[test]
fn test_explicit_factor_ignores_zero_and_nan() {
    let e = MappingEntry::new(valid("a"), valid("b"));
    assert_eq!(e.explicit_factor(), None);
    assert_eq!(e.clone().with_factor(0.0).explicit_factor(), None);
    assert_eq!(e.clone().with_factor(f64::NAN).explicit_factor(), None);
    assert_eq!(e.with_factor(2.5).explicit_factor(), Some(2.5));
}

#[test]
fn test_target_flows_skip_error_targets() {
    let ok = MappingEntry::new(valid("a"), valid("b"));
    let mut bad = MappingEntry::new(valid("c"), valid("d"));
    bad.target_flow.status = Some(Status::error("unknown flow"));
    let table = MappingTable::new("t", vec![ok.clone(), bad]);
    let targets = table.target_flows();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].ref_id, ok.target_flow.ref_id);
    assert_eq!(table.eligible_count(), 1);
}

#[test]
fn test_table_json_keeps_statuses() {
    let table = MappingTable::new("ecoinvent -> ef", vec![MappingEntry::new(valid("a"), valid("b")).with_factor(1000.0)]);
    let raw = table.to_json_pretty().unwrap();
    assert!(raw.contains("\"ok\": \"matched\""));
    let back = MappingTable::from_json(&raw).unwrap();
    assert_eq!(back, table);
}

#[test]
fn test_table_json_accepts_minimal_refs() {
    let id = Uuid::new_v4();
    let raw = format!(r#"{{"entries":[{{"source_flow":{{"ref_id":"{id}"}},"target_flow":{{"ref_id":"{id}","status":{{"error":"x"}}}}}}]}}"#);
    let table = MappingTable::from_json(&raw).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.entries[0].source_flow.status.is_none());
    assert!(table.entries[0].target_flow.status.as_ref().unwrap().is_error());
}

#[test]
fn test_new_flow_requires_unit() {
    let mut r = valid("a");
    assert!(NewFlow::from_ref(&r).is_ok());
    r.unit = None;
    assert!(NewFlow::from_ref(&r).is_err());
}
