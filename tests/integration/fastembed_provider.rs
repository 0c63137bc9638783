//! End-to-end run against a real fastembed model.
//!
//! Downloads the model on first run, so it is ignored by default:
//! `cargo test fastembed -- --ignored`

use std::sync::Arc;

use notevault::chunking::ChunkingOptions;
use notevault::config::EngineConfig;
use notevault::engine::{DocumentInput, VectorStoreEngine};
use notevault::vector::FastEmbedGenerator;
use tempfile::TempDir;

fn test_cache_dir(test_name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "notevault_test_fastembed_{}_{}",
        test_name,
        std::process::id()
    ))
}

#[test]
#[ignore = "downloads an embedding model"]
fn test_fastembed_ranks_by_meaning() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = test_cache_dir("ranks_by_meaning");
    let provider = FastEmbedGenerator::new("AllMiniLML6V2", &cache_dir).unwrap();
    let config = EngineConfig::new("AllMiniLML6V2", temp_dir.path().join("store.db"));
    let engine = VectorStoreEngine::open(config, Arc::new(provider)).unwrap();

    for (name, text) in [
        ("garden.md", "Water the tomatoes and pull the weeds in the vegetable bed."),
        ("finance.md", "Quarterly budget review: cut travel spending by ten percent."),
        ("cooking.md", "Simmer the lentils with cumin and garlic for twenty minutes."),
    ] {
        engine
            .embed_document(&DocumentInput::new(name, name, text), ChunkingOptions::default())
            .unwrap();
    }

    let hits = engine.query("how do I make soup", 3).unwrap();
    assert_eq!(hits[0].document_name, "cooking.md");

    let hits = engine.query("plants need watering", 1).unwrap();
    assert_eq!(hits[0].document_name, "garden.md");

    let _ = std::fs::remove_dir_all(cache_dir);
}
