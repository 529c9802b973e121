use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::tempdir;
use time::macros::datetime;
use time::Duration;

use dw_core::clock::ManualClock;
use dw_core::domain::{IncidentStatus, Target};
use dw_core::error::codes;
use dw_core::store::IncidentStore;

fn target(id: &str) -> Target {
    Target {
        id: id.to_string(),
        name: format!("{id}-name"),
        address: format!("https://{id}.example.com"),
    }
}

fn store_at(clock: &Arc<ManualClock>) -> IncidentStore {
    IncidentStore::open_in_memory(clock.clone()).expect("store")
}

#[test]
fn open_incident_is_idempotent_while_open() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);

    let (first, already_open) = store.open_incident(&target("t1"), "u1").unwrap();
    assert!(!already_open);
    assert_eq!(first.status, IncidentStatus::Open);
    assert_eq!(first.opened_at, datetime!(2024-03-05 10:00:00 UTC));
    assert_eq!(first.resolved_at, None);

    clock.advance(Duration::minutes(5));
    let (second, already_open) = store.open_incident(&target("t1"), "u2").unwrap();
    assert!(already_open);
    assert_eq!(second, first);
    assert_eq!(store.list_by_target("t1").unwrap().len(), 1);
    assert_eq!(store.count_open("t1").unwrap(), 1);
}

#[test]
fn resolve_sets_resolution_fields_once() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);
    let (incident, _) = store.open_incident(&target("t1"), "u1").unwrap();

    clock.advance(Duration::hours(1));
    let resolved = store
        .resolve(&incident.id, "u2", "  restarted the load balancer ")
        .unwrap();
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    assert_eq!(resolved.resolved_at, Some(datetime!(2024-03-05 11:00:00 UTC)));
    assert_eq!(resolved.resolved_by.as_deref(), Some("u2"));
    assert_eq!(
        resolved.resolution_note.as_deref(),
        Some("restarted the load balancer")
    );
    assert_eq!(store.get(&incident.id).unwrap(), resolved);

    let err = store.resolve(&incident.id, "u3", "again").unwrap_err();
    assert_eq!(err.code, codes::ALREADY_RESOLVED);
    assert_eq!(store.get(&incident.id).unwrap(), resolved);
}

#[test]
fn resolve_unknown_incident_is_not_found() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);
    let err = store.resolve("does-not-exist", "u1", "note").unwrap_err();
    assert_eq!(err.code, codes::NOT_FOUND);
}

#[test]
fn resolve_with_empty_note_does_not_mutate() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);
    let (incident, _) = store.open_incident(&target("t1"), "u1").unwrap();

    for note in ["", "   ", "\n\t"] {
        let err = store.resolve(&incident.id, "u2", note).unwrap_err();
        assert_eq!(err.code, codes::INVALID_ARGUMENT);
    }
    assert_eq!(store.get(&incident.id).unwrap(), incident);
    assert_eq!(store.count_open("t1").unwrap(), 1);
}

#[test]
fn down_after_resolution_opens_a_new_incident() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);
    let (first, _) = store.open_incident(&target("t1"), "u1").unwrap();
    clock.advance(Duration::minutes(10));
    store.resolve(&first.id, "u1", "flapped").unwrap();

    clock.advance(Duration::minutes(10));
    let (second, already_open) = store.open_incident(&target("t1"), "u1").unwrap();
    assert!(!already_open);
    assert_ne!(second.id, first.id);

    let history = store.list_by_target("t1").unwrap();
    let ids: Vec<&str> = history.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    assert_eq!(history[1].status, IncidentStatus::Resolved);
}

#[test]
fn snapshot_is_kept_when_target_is_renamed() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);
    let (incident, _) = store.open_incident(&target("t1"), "u1").unwrap();

    let renamed = Target {
        id: "t1".to_string(),
        name: "renamed".to_string(),
        address: "https://new.example.com".to_string(),
    };
    let (existing, already_open) = store.open_incident(&renamed, "u1").unwrap();
    assert!(already_open);
    assert_eq!(existing.target_name, incident.target_name);
    assert_eq!(existing.target_address, incident.target_address);
}

#[test]
fn list_recent_is_newest_first_and_clamped() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-01-01 00:00:00 UTC)));
    let store = store_at(&clock);

    for i in 0..1005 {
        store.open_incident(&target(&format!("t{i}")), "u1").unwrap();
        clock.advance(Duration::seconds(1));
    }

    let all = store.list_recent(5000).unwrap();
    assert_eq!(all.len(), 1000);
    assert_eq!(all[0].target_id, "t1004");
    assert!(all.windows(2).all(|w| w[0].opened_at >= w[1].opened_at));

    let one = store.list_recent(0).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].target_id, "t1004");

    assert_eq!(store.list_recent(5).unwrap().len(), 5);
}

#[test]
fn target_history_limit_is_applied_in_the_query() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 00:00:00 UTC)));
    let store = store_at(&clock);

    let mut ids = Vec::new();
    for _ in 0..4 {
        let (incident, _) = store.open_incident(&target("t1"), "u1").unwrap();
        clock.advance(Duration::minutes(5));
        store.resolve(&incident.id, "u1", "recovered").unwrap();
        clock.advance(Duration::minutes(5));
        ids.push(incident.id);
    }
    store.open_incident(&target("t2"), "u1").unwrap();

    let latest_two = store.list_by_target_limited("t1", 2).unwrap();
    let got: Vec<&str> = latest_two.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(got, vec![ids[3].as_str(), ids[2].as_str()]);

    assert_eq!(store.list_by_target_limited("t1", 0).unwrap().len(), 1);
    assert_eq!(store.list_by_target_limited("t1", 5000).unwrap().len(), 4);
}

#[test]
fn same_instant_ties_keep_insertion_order_reversed() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);
    let (a, _) = store.open_incident(&target("a"), "u1").unwrap();
    let (b, _) = store.open_incident(&target("b"), "u1").unwrap();

    let recent = store.list_recent(10).unwrap();
    assert_eq!(recent[0].id, b.id);
    assert_eq!(recent[1].id, a.id);
}

#[test]
fn incidents_survive_reopening_the_database() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("downwatch.sqlite");
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00.123456 UTC)));

    let opened = {
        let store = IncidentStore::open(&path, clock.clone()).unwrap();
        store.open_incident(&target("t1"), "u1").unwrap().0
    };

    let store = IncidentStore::open(&path, clock.clone()).unwrap();
    assert_eq!(store.get(&opened.id).unwrap(), opened);
    let (again, already_open) = store.open_incident(&target("t1"), "u9").unwrap();
    assert!(already_open);
    assert_eq!(again.id, opened.id);
}

#[test]
fn blank_principal_is_rejected() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-05 10:00:00 UTC)));
    let store = store_at(&clock);
    let err = store.open_incident(&target("t1"), " ").unwrap_err();
    assert_eq!(err.code, codes::INVALID_ARGUMENT);
    assert_eq!(store.count_open("t1").unwrap(), 0);
}
