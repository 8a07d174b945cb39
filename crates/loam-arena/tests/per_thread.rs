//! One manager per worker thread.
//!
//! Arenas are single-owner. Workers each build their own manager and
//! report results over a channel; an arena moved to another thread
//! refuses to be entered there.

use std::thread;

use crossbeam_channel::unbounded;
use loam_arena::{ArenaError, ArenaManager, ArenaStats};
use loam_core::{DataType, HostMemory, MemoryKind, MemoryProvider};
use loam_test_utils::fixtures::{learning_config, strict_config};

const WORKERS: usize = 4;
const CYCLES: u64 = 16;

fn run_worker(index: usize) -> Result<ArenaStats, ArenaError> {
    let mut mgr = ArenaManager::new();
    let ws = mgr.create(&format!("worker-{index}"), learning_config())?;
    for cycle in 0..CYCLES {
        let mut scope = mgr.enter(ws)?;
        let len = 256 * (index + 1) + cycle as usize;
        if let Some(block) = scope.alloc(len, DataType::Byte, MemoryKind::Host, true)? {
            scope.bytes_mut(&block)?.fill(index as u8);
        }
        scope.close()?;
    }
    mgr.arena(ws).map(|arena| arena.stats())
}

#[test]
fn workers_run_independent_managers() {
    let (tx, rx) = unbounded();
    let handles: Vec<_> = (0..WORKERS)
        .map(|index| {
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send((index, run_worker(index))).unwrap();
            })
        })
        .collect();
    drop(tx);

    let mut results: Vec<_> = rx.iter().collect();
    for handle in handles {
        handle.join().unwrap();
    }
    results.sort_by_key(|(index, _)| *index);
    assert_eq!(results.len(), WORKERS);

    for (index, result) in results {
        let stats = result.unwrap();
        assert_eq!(stats.name, format!("worker-{index}"));
        assert_eq!(stats.cycles_count, CYCLES);
        assert_eq!(stats.external_count, 0);
        // First-loop learning sizes the arena from the first cycle only.
        assert_eq!(stats.current_size, 256 * (index + 1));
        assert!(!stats.is_open);
    }
}

#[test]
fn moved_manager_rejects_foreign_thread() {
    let mut mgr = ArenaManager::new();
    let ws = mgr.create("home", strict_config(1024)).unwrap();

    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let outcome = mgr.open(ws).map(|_| ());
        tx.send(outcome).unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(rx.recv().unwrap(), Err(ArenaError::ForeignThread { arena: ws }));
}

#[test]
fn shared_provider_serves_many_threads() {
    let mem = HostMemory::new().into_shared();
    let (tx, rx) = unbounded();
    let handles: Vec<_> = (0..WORKERS)
        .map(|index| {
            let mem = mem.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let mut mgr = ArenaManager::with_provider(mem);
                let ws = mgr.create(&format!("shared-{index}"), strict_config(512)).unwrap();
                let mut scope = mgr.enter(ws).unwrap();
                let spilled = scope
                    .alloc(2048, DataType::Float, MemoryKind::Host, false)
                    .unwrap()
                    .is_some_and(|h| h.is_spilled());
                tx.send(spilled).unwrap();
            })
        })
        .collect();
    drop(tx);

    assert!(rx.iter().take(WORKERS).all(|spilled| spilled));
    for handle in handles {
        handle.join().unwrap();
    }
    // Every worker dropped its manager, returning buffers and spills.
    assert_eq!(mem.live_regions(), 0);
}
