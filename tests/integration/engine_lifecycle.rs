//! Embed, replace, delete and query through the public engine API.

use notevault::chunking::ChunkingOptions;
use notevault::engine::{DocumentInput, IndexInfo};
use tempfile::TempDir;

use crate::support::open_counting;

fn note(name: &str, content: &str) -> DocumentInput {
    DocumentInput::new(name, name, content)
}

#[test]
fn test_embed_then_delete_returns_to_baseline() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    let baseline = engine.info().unwrap();

    let written = engine
        .embed_document(&note("a.md", &"lorem ipsum ".repeat(100)), ChunkingOptions::new(200, 50))
        .unwrap();
    assert!(written > 1);
    assert_eq!(engine.info().unwrap().chunk_count, baseline.chunk_count + written);

    assert_eq!(engine.delete_document_embedding("a.md").unwrap(), written);
    assert_eq!(engine.info().unwrap(), baseline);
    assert!(engine.list_document_names().unwrap().is_empty());

    // Deleting again is a no-op
    assert_eq!(engine.delete_document_embedding("a.md").unwrap(), 0);
}

#[test]
fn test_reembedding_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    let doc = note("journal.md", &"today the weather was mild. ".repeat(40));
    let options = ChunkingOptions::new(300, 60);

    let first = engine.embed_document(&doc, options).unwrap();
    let after_first = engine.info().unwrap();
    let second = engine.embed_document(&doc, options).unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.info().unwrap(), after_first);
    assert_eq!(engine.document_chunk_count("journal.md").unwrap(), first);
}

#[test]
fn test_reembedding_replaces_chunks_and_keeps_other_documents() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    let options = ChunkingOptions::new(100, 0);

    engine.embed_document(&note("a.md", &"a".repeat(350)), options).unwrap();
    engine.embed_document(&note("b.md", &"b".repeat(150)), options).unwrap();
    assert_eq!(engine.document_chunk_count("a.md").unwrap(), 4);

    engine.embed_document(&note("a.md", &"c".repeat(120)), options).unwrap();
    assert_eq!(engine.document_chunk_count("a.md").unwrap(), 2);
    assert_eq!(engine.document_chunk_count("b.md").unwrap(), 2);

    let info = engine.info().unwrap();
    assert_eq!(info.chunk_count, 4);
    assert!(!info.is_drifted());

    // Old text is gone from query results
    let hits = engine.query(&"a".repeat(100), 10).unwrap();
    assert!(hits.iter().all(|hit| !hit.text.contains('a')));
}

#[test]
fn test_short_note_with_large_chunk_size() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());

    let written = engine
        .embed_document(
            &note("note.md", "hello world"),
            ChunkingOptions {
                chunk_size: Some(600),
                chunk_overlap: None,
            },
        )
        .unwrap();

    assert_eq!(written, 1);
    assert_eq!(
        engine.info().unwrap(),
        IndexInfo {
            index_size: 1,
            chunk_count: 1
        }
    );
}

#[test]
fn test_blank_query_never_calls_provider() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, provider) = open_counting(temp_dir.path());
    engine
        .embed_document(&note("note.md", "hello world"), ChunkingOptions::default())
        .unwrap();
    let calls = provider.calls();

    assert!(engine.query("", 5).unwrap().is_empty());
    assert!(engine.query("   \n\t", 5).unwrap().is_empty());
    assert_eq!(provider.calls(), calls);
}

#[test]
fn test_exact_text_is_nearest() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    engine
        .embed_document(&note("one.md", "the first note"), ChunkingOptions::default())
        .unwrap();
    engine
        .embed_document(&note("two.md", "a second, unrelated note"), ChunkingOptions::default())
        .unwrap();

    let hits = engine.query("a second, unrelated note", 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document_name, "two.md");
    assert!(hits[0].distance.abs() < 1e-5);
    assert!(hits[0].distance <= hits[1].distance);

    // More results requested than stored
    assert_eq!(engine.query("note", 50).unwrap().len(), 2);
}

#[test]
fn test_row_ids_keep_counting_after_reset() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    engine
        .embed_document(&note("a.md", "first"), ChunkingOptions::default())
        .unwrap();
    let before = engine.query("first", 1).unwrap()[0].row_id;

    engine.reset().unwrap();
    assert_eq!(
        engine.info().unwrap(),
        IndexInfo {
            index_size: 0,
            chunk_count: 0
        }
    );

    engine
        .embed_document(&note("a.md", "first"), ChunkingOptions::default())
        .unwrap();
    let after = engine.query("first", 1).unwrap()[0].row_id;
    assert!(after > before);
}

#[test]
fn test_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let (engine, _) = open_counting(temp_dir.path());
        engine
            .embed_document(&note("kept.md", "persisted text"), ChunkingOptions::default())
            .unwrap();
    }

    let (engine, _) = open_counting(temp_dir.path());
    assert!(engine.list_document_names().unwrap().contains("kept.md"));
    assert_eq!(engine.query("persisted text", 1).unwrap()[0].document_name, "kept.md");
}

#[test]
fn test_query_accepts_any_result_count() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _) = open_counting(temp_dir.path());
    engine
        .embed_document(&note("a.md", "hello world"), ChunkingOptions::default())
        .unwrap();

    assert_eq!(engine.query("hello", 50).unwrap().len(), 1);
    assert_eq!(engine.query("hello", 1usize << 40).unwrap().len(), 1);
    assert_eq!(engine.query("hello", usize::MAX).unwrap().len(), 1);
}
