//! E2E Test: Store contention
//!
//! A held writer must surface as a timeout with no trace left in the
//! caches, and background scans must never stall registrations.

use elemid_core::{ElementDescriptor, Registry, RegistryConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn submit() -> ElementDescriptor {
    ElementDescriptor::new("app1", "1.0", "button")
        .with_text("Submit")
        .with_path("/0/1")
}

fn cancel() -> ElementDescriptor {
    ElementDescriptor::new("app1", "1.0", "button")
        .with_text("Cancel")
        .with_path("/0/2")
}

/// Hold the writer connection on another thread until the returned handle is joined
fn hold_writer(registry: &Arc<Registry>, hold: Duration) -> thread::JoinHandle<()> {
    let (held_tx, held_rx) = mpsc::channel();
    let registry = registry.clone();
    let handle = thread::spawn(move || {
        registry
            .store()
            .with_conn("hold writer", Duration::from_secs(5), |_| {
                held_tx.send(()).unwrap();
                thread::sleep(hold);
                Ok(())
            })
            .unwrap();
    });
    held_rx.recv().unwrap();
    handle
}

#[test]
fn e2e_store_timeout_leaves_caches_untouched() {
    let config = RegistryConfig::default().with_store_timeout(Duration::from_millis(50));
    let registry = Arc::new(Registry::open(config).unwrap());
    let known = registry.register(&submit()).unwrap();
    registry.warm_up().unwrap();

    let holder = hold_writer(&registry, Duration::from_millis(400));

    let err = registry.register(&cancel()).unwrap_err();
    assert!(err.is_timeout(), "{}", err);
    assert!(registry.register(&submit()).unwrap_err().is_timeout());
    assert!(registry.set_priority(&known, 7).unwrap_err().is_timeout());

    holder.join().unwrap();

    let cancel_id = registry.entities().hasher().deterministic_id(&cancel());
    assert!(registry.find_by_id(&cancel_id).unwrap().is_none());
    assert!(registry.find_by_name("Cancel").unwrap().is_empty());

    let entity = registry.find_by_id(&known).unwrap().unwrap();
    assert_eq!(entity.access_count, 1);
    assert_eq!(entity.priority, 0);
    assert_eq!(registry.find_by_name("Submit").unwrap().len(), 1);
    assert_eq!(registry.find_by_type("button").unwrap().len(), 1);
    assert_eq!(registry.stats().unwrap()["entities"], 1);
}

#[test]
fn e2e_registrations_proceed_while_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let config = RegistryConfig::default()
        .with_database(dir.path().join("elemid.db"))
        .with_store_timeout(Duration::from_millis(250));
    let registry = Arc::new(Registry::open(config).unwrap());
    assert!(registry.store().has_snapshot_reader());

    for i in 0..2000 {
        registry
            .register(&ElementDescriptor::new("app1", "1.0", "row").with_path(format!("/seed/{}", i)))
            .unwrap();
    }

    let scanning = Arc::new(AtomicBool::new(true));
    let scanner = {
        let registry = registry.clone();
        let scanning = scanning.clone();
        thread::spawn(move || {
            let mut scans = 0;
            loop {
                registry.scan_now();
                scans += 1;
                if !scanning.load(Ordering::Relaxed) {
                    return scans;
                }
            }
        })
    };

    for i in 0..200 {
        registry
            .register(&ElementDescriptor::new("app1", "1.0", "cell").with_path(format!("/live/{}", i)))
            .unwrap();
    }
    scanning.store(false, Ordering::Relaxed);

    assert!(scanner.join().unwrap() > 0);
    assert_eq!(registry.len().unwrap(), 2200);
}
