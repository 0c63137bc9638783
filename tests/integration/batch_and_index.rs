//! Bulk embedding from a workspace scan and index maintenance.

use std::fs;
use std::path::Path;

use anyhow::Result;
use notevault::chunking::ChunkingOptions;
use notevault::engine::{DocumentInput, IndexScope};
use notevault::workspace::scan_workspace;
use rusqlite::{Connection, params};
use tempfile::TempDir;

use crate::support::open_counting;

fn write_vault(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("journal"))?;
    fs::create_dir_all(root.join(".obsidian"))?;
    fs::write(root.join("index.md"), "Home page of the vault. ".repeat(30))?;
    fs::write(root.join("journal/monday.md"), "Planted tomatoes in the garden.")?;
    fs::write(root.join("journal/tuesday.md"), "Cooked lentil soup. ".repeat(50))?;
    fs::write(root.join("journal/empty.md"), "")?;
    fs::write(root.join(".obsidian/workspace.md"), "editor state")?;
    Ok(())
}

fn scan(root: &Path) -> Result<Vec<DocumentInput>> {
    let documents = scan_workspace(
        root,
        &["md".to_string()],
        &[".obsidian".to_string(), ".notevault".to_string()],
    )?;
    Ok(documents.into_iter().map(DocumentInput::from_path).collect())
}

/// Index rows removed behind the engine's back.
fn drop_index_rows(store: &Path, document_name: Option<&str>) -> Result<usize> {
    let conn = Connection::open(store)?;
    let removed = match document_name {
        Some(name) => conn.execute(
            "DELETE FROM chunk_index WHERE row_id IN
                (SELECT id FROM note_chunks WHERE document_name = ?1)",
            params![name],
        )?,
        None => conn.execute(
            "DELETE FROM chunk_index WHERE row_id IN (SELECT row_id FROM chunk_index LIMIT 2)",
            [],
        )?,
    };
    Ok(removed)
}

#[test]
fn test_batch_then_full_update_matches_chunk_count() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_vault(temp_dir.path())?;
    let (engine, _) = open_counting(temp_dir.path());

    let documents = scan(temp_dir.path())?;
    assert_eq!(documents.len(), 4);

    let report = engine.embed_batch(&documents, ChunkingOptions::new(200, 40))?;
    assert!(report.is_clean());
    assert_eq!(report.embedded.len(), 3);
    assert_eq!(report.skipped_empty, vec!["journal/empty.md"]);

    let written = engine.update_index(IndexScope::Full)?;
    let info = engine.info()?;
    assert_eq!(written, info.chunk_count);
    assert_eq!(info.index_size, info.chunk_count);
    assert_eq!(info.chunk_count, report.chunk_total());

    let names = engine.list_document_names()?;
    assert!(names.contains("journal/monday.md"));
    assert!(!names.contains(".obsidian/workspace.md"));
    Ok(())
}

#[test]
fn test_full_update_repairs_drift() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_vault(temp_dir.path())?;
    let (engine, _) = open_counting(temp_dir.path());
    engine.embed_batch(&scan(temp_dir.path())?, ChunkingOptions::new(200, 40))?;

    assert_eq!(drop_index_rows(&temp_dir.path().join("store.db"), None)?, 2);
    let drifted = engine.info()?;
    assert!(drifted.is_drifted());
    assert_eq!(drifted.index_size + 2, drifted.chunk_count);

    engine.update_index(IndexScope::Full)?;
    assert!(!engine.info()?.is_drifted());
    Ok(())
}

#[test]
fn test_document_update_indexes_only_missing_entries() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_vault(temp_dir.path())?;
    let (engine, _) = open_counting(temp_dir.path());
    engine.embed_batch(&scan(temp_dir.path())?, ChunkingOptions::new(200, 40))?;

    let store = temp_dir.path().join("store.db");
    let removed = drop_index_rows(&store, Some("journal/tuesday.md"))?;
    assert!(removed > 0);

    // Other documents are already indexed
    assert_eq!(engine.update_index(IndexScope::Document("index.md".into()))?, 0);
    assert_eq!(
        engine.update_index(IndexScope::Document("journal/tuesday.md".into()))?,
        removed
    );
    assert!(!engine.info()?.is_drifted());

    // Unknown documents index nothing
    assert_eq!(engine.update_index(IndexScope::Document("nope.md".into()))?, 0);
    Ok(())
}

#[test]
fn test_batch_rerun_after_edits() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_vault(temp_dir.path())?;
    let (engine, _) = open_counting(temp_dir.path());
    let options = ChunkingOptions::new(200, 40);
    engine.embed_batch(&scan(temp_dir.path())?, options)?;
    let before = engine.document_chunk_count("journal/tuesday.md")?;

    fs::write(temp_dir.path().join("journal/tuesday.md"), "Short now.")?;
    fs::remove_file(temp_dir.path().join("index.md"))?;

    let report = engine.embed_batch(&scan(temp_dir.path())?, options)?;
    assert!(report.is_clean());
    assert!(before > 1);
    assert_eq!(engine.document_chunk_count("journal/tuesday.md")?, 1);

    // Removed files are not part of the scan, so their chunks stay until deleted
    assert!(engine.list_document_names()?.contains("index.md"));
    engine.delete_document_embedding("index.md")?;
    assert!(!engine.info()?.is_drifted());
    Ok(())
}
