use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::tempdir;

use dw_core::clock::SystemClock;
use dw_core::domain::Target;
use dw_core::error::codes;
use dw_core::store::IncidentStore;

const WORKERS: usize = 8;

fn target(id: &str) -> Target {
    Target {
        id: id.to_string(),
        name: "api".to_string(),
        address: "https://api.example.com".to_string(),
    }
}

#[test]
fn concurrent_down_reports_open_exactly_one_incident() {
    let store = Arc::new(IncidentStore::open_in_memory(Arc::new(SystemClock)).unwrap());
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .open_incident(&target("t1"), &format!("u{i}"))
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let created = results.iter().filter(|(_, already_open)| !already_open).count();
    assert_eq!(created, 1);
    let first_id = &results[0].0.id;
    assert!(results.iter().all(|(inc, _)| &inc.id == first_id));
    assert_eq!(store.count_open("t1").unwrap(), 1);
}

#[test]
fn separate_connections_to_one_file_still_open_one_incident() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("shared.sqlite");
    // Create and migrate once so workers do not race on the schema.
    IncidentStore::open(&path, Arc::new(SystemClock)).unwrap();

    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = IncidentStore::open(&path, Arc::new(SystemClock)).unwrap();
                barrier.wait();
                store
                    .open_incident(&target("t1"), &format!("u{i}"))
                    .unwrap()
            })
        })
        .collect();

    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|(_, already_open)| !already_open)
        .count();
    assert_eq!(created, 1);

    let store = IncidentStore::open(&path, Arc::new(SystemClock)).unwrap();
    assert_eq!(store.count_open("t1").unwrap(), 1);
    assert_eq!(store.list_by_target("t1").unwrap().len(), 1);
}

#[test]
fn concurrent_resolvers_yield_one_success() {
    let store = Arc::new(IncidentStore::open_in_memory(Arc::new(SystemClock)).unwrap());
    let (incident, _) = store.open_incident(&target("t1"), "u0").unwrap();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let id = incident.id.clone();
            thread::spawn(move || {
                barrier.wait();
                store.resolve(&id, &format!("u{i}"), "resolved")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.code == codes::ALREADY_RESOLVED));
    assert_eq!(store.count_open("t1").unwrap(), 0);
}

#[test]
fn different_targets_do_not_interfere() {
    let store = Arc::new(IncidentStore::open_in_memory(Arc::new(SystemClock)).unwrap());
    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..5 {
                    store
                        .open_incident(&target(&format!("t{i}")), "u1")
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for i in 0..WORKERS {
        assert_eq!(store.count_open(&format!("t{i}")).unwrap(), 1);
    }
    assert_eq!(store.list_recent(100).unwrap().len(), WORKERS);
}
