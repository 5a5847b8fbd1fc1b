//! # Drop Simulator
//!
//! Runs many simulated kills of a set of drop lines and prints what fell out.
//!
//! ```text
//! drop_simulator "DIAMOND 2-4 0.5" "ENDER_PEARL 1 0.0005"
//!
//! MAGICFIND_CONFIG  config file         (default data/magicfind.toml)
//! MAGICFIND_LUCK    killer luck         (default 100)
//! MAGICFIND_KILLS   kills to simulate   (default 100000)
//! MAGICFIND_SEED    fixed RNG seed      (default: random)
//! ```
//!
//! Every item token on the command line is treated as a base material with a
//! stack size of 64.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use magicfind_core::integration::base_identifier;
use magicfind_core::memory::{MemoryCatalog, MemoryVariableStore, RecordingAudience};
use magicfind_core::{
    ConfigSource, ConfigStore, EngineAdapters, EngineSettings, MagicFindEngine,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let lines: Vec<String> = std::env::args().skip(1).collect();
    if lines.is_empty() {
        eprintln!("usage: drop_simulator \"<item> [quantity] [chance]\"...");
        std::process::exit(2);
    }

    let config_path = std::env::var("MAGICFIND_CONFIG")
        .map_or_else(|_| PathBuf::from("data/magicfind.toml"), PathBuf::from);
    let luck: f64 = env_or("MAGICFIND_LUCK", 100.0);
    let kills: u64 = env_or("MAGICFIND_KILLS", 100_000);

    // ========================================================================
    // 1. Adapters
    // ========================================================================
    let mut catalog = MemoryCatalog::new();
    for line in &lines {
        if let Some(item) = line.split_whitespace().next() {
            catalog.add_material(&base_identifier(item), 64);
        }
    }
    let catalog = Arc::new(catalog);

    let engine = MagicFindEngine::new(
        EngineAdapters {
            catalog: catalog.clone(),
            tables: catalog,
            variables: Arc::new(MemoryVariableStore::new()),
            containers: None,
            audience: Arc::new(RecordingAudience::new()),
        },
        Arc::new(ConfigStore::open(ConfigSource::File(config_path.clone()))),
        EngineSettings::default(),
    );

    // ========================================================================
    // 2. Simulate
    // ========================================================================
    let mut rng = match std::env::var("MAGICFIND_SEED").ok().and_then(|s| s.parse().ok()) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let start = Instant::now();
    let stats = engine.simulate(&lines, luck, kills, &mut rng);
    let elapsed = start.elapsed();
    tracing::info!(kills, ?elapsed, "simulation finished");

    // ========================================================================
    // 3. Report
    // ========================================================================
    println!("\n=== MagicFind Drop Simulation ===");
    println!("Config:      {}", config_path.display());
    println!("Luck:        {luck}% (multiplier {:.2})", magicfind_core::luck_multiplier(luck));
    println!("Kills:       {}", stats.iterations);
    println!("Fire rate:   {:.2}%", stats.fire_rate() * 100.0);
    println!("Elapsed:     {elapsed:?}");

    println!("\n--- Items ---");
    for (item, total) in &stats.item_totals {
        println!("{item:<24} total {total:>10}   per kill {:.4}", stats.mean_per_kill(item));
    }

    println!("\n--- Announcements ---");
    if stats.tier_counts.is_empty() {
        println!("(none)");
    }
    for (tier, count) in &stats.tier_counts {
        println!("{tier:<24} {count:>10}");
    }
}
