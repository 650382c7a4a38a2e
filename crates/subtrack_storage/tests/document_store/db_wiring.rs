#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use subtrack_storage::document_store::{
    DocumentFields, DocumentFilter, DocumentStore, OrderBy, StorageError,
};
use subtrack_storage::repo::DocumentBackend;

const COLLECTION: &str = "subscriptions";

fn temp_journal(tag: &str) -> PathBuf {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    std::env::temp_dir()
        .join(format!("subtrack_storage_{tag}_{seed}"))
        .join("subscriptions.jsonl")
}

fn doc(owner: &str, name: &str, created_at: &str) -> DocumentFields {
    let mut f = DocumentFields::new();
    f.insert("owner_id".to_string(), json!(owner));
    f.insert("name".to_string(), json!(name));
    f.insert("created_at".to_string(), json!(created_at));
    f
}

fn journal_lines(path: &PathBuf) -> usize {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
}

fn cleanup(path: &PathBuf) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::remove_dir_all(parent);
    }
}

#[test]
fn at_docstore_db_01_journal_replays_inserts_replaces_and_removes() {
    let path = temp_journal("replay");
    let (kept, removed) = {
        let mut s = DocumentStore::open_with_journal(path.clone()).unwrap();
        let kept = s.insert(COLLECTION, doc("o1", "Netflix", "2024-01-01")).unwrap();
        let removed = s.insert(COLLECTION, doc("o1", "Spotify", "2024-01-02")).unwrap();
        s.replace(COLLECTION, &kept, doc("o1", "Netflix Premium", "2024-01-01"))
            .unwrap();
        s.remove(COLLECTION, &removed).unwrap();
        (kept, removed)
    };
    assert_eq!(journal_lines(&path), 4);

    let reopened = DocumentStore::open_with_journal(path.clone()).unwrap();
    assert_eq!(reopened.document_count(COLLECTION), 1);
    let row = reopened.get(COLLECTION, &kept).unwrap().unwrap();
    assert_eq!(row.fields["name"], json!("Netflix Premium"));
    assert_eq!(reopened.get(COLLECTION, &removed).unwrap(), None);
    cleanup(&path);
}

#[test]
fn at_docstore_db_02_ids_continue_after_replay() {
    let path = temp_journal("ids");
    let first = {
        let mut s = DocumentStore::open_with_journal(path.clone()).unwrap();
        s.insert(COLLECTION, doc("o1", "A", "1")).unwrap()
    };
    let mut reopened = DocumentStore::open_with_journal(path.clone()).unwrap();
    let second = reopened.insert(COLLECTION, doc("o1", "B", "2")).unwrap();
    assert_ne!(first, second);
    let all = reopened
        .list(COLLECTION, &DocumentFilter::All, Some(&OrderBy::desc("created_at")))
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second);
    cleanup(&path);
}

#[test]
fn at_docstore_db_03_failed_mutation_is_not_journaled() {
    let path = temp_journal("failed");
    let mut s = DocumentStore::open_with_journal(path.clone()).unwrap();
    let id = s.insert(COLLECTION, doc("o1", "A", "1")).unwrap();
    s.remove(COLLECTION, &id).unwrap();
    assert!(matches!(
        s.remove(COLLECTION, &id),
        Err(StorageError::NotFound { .. })
    ));
    assert_eq!(journal_lines(&path), 2);
    cleanup(&path);
}

#[test]
fn at_docstore_db_04_corrupt_or_future_journal_fails_open_with_line_number() {
    let path = temp_journal("corrupt");
    {
        let mut s = DocumentStore::open_with_journal(path.clone()).unwrap();
        s.insert(COLLECTION, doc("o1", "A", "1")).unwrap();
    }
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("{not json}\n");
    std::fs::write(&path, &contents).unwrap();
    let err = DocumentStore::open_with_journal(path.clone()).unwrap_err();
    assert!(matches!(err, StorageError::Journal { ref reason, .. } if reason.contains("line 2")));

    let future = r#"{"schema_version":9,"op":{"remove":{"collection":"subscriptions","id":"x"}}}"#;
    std::fs::write(&path, format!("{future}\n")).unwrap();
    let err = DocumentStore::open_with_journal(path.clone()).unwrap_err();
    assert!(err.to_string().contains("unsupported schema_version=9"));
    cleanup(&path);
}

#[test]
fn at_docstore_db_05_in_memory_store_has_no_journal() {
    let s = DocumentStore::new_in_memory();
    assert!(s.journal_path().is_none());
    let path = temp_journal("path");
    let j = DocumentStore::open_with_journal(path.clone()).unwrap();
    assert_eq!(j.journal_path(), Some(path.as_path()));
    cleanup(&path);
}

#[test]
fn at_docstore_db_06_two_handles_on_one_journal_keep_both_documents() {
    let path = temp_journal("two_handles");
    let mut adapter_handle = DocumentStore::open_with_journal(path.clone()).unwrap();
    let mut cli_handle = DocumentStore::open_with_journal(path.clone()).unwrap();
    let from_adapter = adapter_handle
        .insert(COLLECTION, doc("o1", "Netflix", "2024-01-01"))
        .unwrap();
    let from_cli = cli_handle
        .insert(COLLECTION, doc("o1", "Spotify", "2024-01-02"))
        .unwrap();
    assert_ne!(from_adapter, from_cli);
    assert_eq!(journal_lines(&path), 2);

    let reopened = DocumentStore::open_with_journal(path.clone()).unwrap();
    assert_eq!(reopened.document_count(COLLECTION), 2);
    assert_eq!(
        reopened.get(COLLECTION, &from_adapter).unwrap().unwrap().fields["name"],
        json!("Netflix")
    );
    assert_eq!(
        reopened.get(COLLECTION, &from_cli).unwrap().unwrap().fields["name"],
        json!("Spotify")
    );
    cleanup(&path);
}

#[test]
fn at_docstore_db_07_replayed_insert_of_existing_id_fails_open() {
    let path = temp_journal("dup_insert");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let line = r#"{"schema_version":1,"op":{"insert":{"collection":"subscriptions","id":"abc","seq":0,"fields":{"name":"A"}}}}"#;
    std::fs::write(&path, format!("{line}\n{line}\n")).unwrap();
    let err = DocumentStore::open_with_journal(path.clone()).unwrap_err();
    assert!(
        matches!(err, StorageError::Journal { ref reason, .. } if reason.contains("entry 2") && reason.contains("already exists")),
        "{err}"
    );
    cleanup(&path);
}
