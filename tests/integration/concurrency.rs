//! Engine shared across threads.

use std::sync::Arc;
use std::thread;

use notevault::chunking::ChunkingOptions;
use notevault::engine::DocumentInput;
use tempfile::TempDir;

use crate::support::open_counting;

#[test]
fn test_concurrent_embeds_keep_index_consistent() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    let engine = Arc::new(engine);
    let options = ChunkingOptions::new(80, 20);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let name = format!("note-{}.md", i % 4);
                let text = format!("thread {i} wrote this note. ").repeat(10);
                for _ in 0..3 {
                    engine
                        .embed_document(&DocumentInput::new(&name, &name, &text), options)
                        .unwrap();
                    engine.query("wrote this note", 3).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let info = engine.info().unwrap();
    assert!(!info.is_drifted());
    assert_eq!(engine.list_document_names().unwrap().len(), 4);

    // Each document holds exactly one submission's chunks
    let expected = options
        .splitter()
        .unwrap()
        .split(&"thread 0 wrote this note. ".repeat(10))
        .len();
    for i in 0..4 {
        assert_eq!(
            engine.document_chunk_count(&format!("note-{i}.md")).unwrap(),
            expected
        );
    }
    assert_eq!(info.chunk_count, expected * 4);
}

#[test]
fn test_delete_races_with_embed() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    let engine = Arc::new(engine);

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for round in 0..20 {
                let doc = DocumentInput::new("shared.md", "shared.md", format!("round {round}"));
                engine.embed_document(&doc, ChunkingOptions::default()).unwrap();
            }
        })
    };
    let deleter = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..20 {
                engine.delete_document_embedding("shared.md").unwrap();
            }
        })
    };

    writer.join().unwrap();
    deleter.join().unwrap();

    let info = engine.info().unwrap();
    assert!(!info.is_drifted());
    assert!(info.chunk_count <= 1);
}
