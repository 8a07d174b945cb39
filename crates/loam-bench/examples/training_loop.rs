//! End-to-end training-loop example.
//!
//! Demonstrates: install logging → build a learning arena → run epochs of
//! scope cycles → watch the arena stop spilling → inspect the tracker.
//!
//! Run with `RUST_LOG`-style filtering via the `LOAM_LOG` variable, e.g.
//! `LOAM_LOG=loam_arena=debug cargo run --example training_loop`.

use loam::logging::{init_logging, LogConfig};
use loam::prelude::*;
use loam_bench::{bursty_profile, run_workload, training_profile};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = std::env::var("LOAM_LOG").unwrap_or_else(|_| "warn".to_string());
    init_logging(&LogConfig::default().with_level(level))?;

    println!("=== Loam Training Loop Example ===\n");

    let mut manager = ArenaManager::new();
    let config = ArenaConfig::new(0)
        .with_allocation(AllocationPolicy::Strict)
        .with_spill(SpillPolicy::Reallocate);
    let ws = manager.create("training", config)?;

    let workload = training_profile(42, 24);
    println!(
        "workload: {} cycles, {} requests, peak cycle {} B\n",
        workload.cycles.len(),
        workload.request_count(),
        workload.peak_cycle_bytes()
    );

    for epoch in 1..=3 {
        let summary = run_workload(&mut manager, ws, &workload)?;
        let stats = manager.arena(ws)?.stats();
        println!(
            "epoch {epoch}: {} allocations, {} spilled, arena size {} B",
            summary.allocations, summary.spilled, stats.current_size
        );
    }

    // A second arena absorbing bursts with over-allocation headroom.
    let bursts = manager.create("bursts", ArenaConfig::new(16 * 1024))?;
    let summary = run_workload(&mut manager, bursts, &bursty_profile(7, 32))?;
    println!(
        "\nbursty: {} allocations, {} spilled",
        summary.allocations, summary.spilled
    );

    println!("\n--- arenas ---");
    for stats in manager.stats() {
        println!("{stats}");
    }
    println!("\n--- tracker ---\n{}", manager.tracker().report());

    let destroyed = manager.destroy_all()?;
    println!("destroyed {destroyed} arenas");
    Ok(())
}
