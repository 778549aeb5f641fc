//! Tests for ScanIter and DeleteEngine
//!
//! These tests verify:
//! - Scans stream every live record and honor predicates
//! - Files are pruned by statistics
//! - Scans are pinned to the snapshot they started on
//! - Deletes rewrite, drop or leave files as appropriate
//! - Replacements land in a single snapshot
//! - Deletes through a stale handle act on the latest snapshot

use std::collections::HashSet;
use std::fs;

use stratum::catalog::Catalog;
use stratum::config::Config;
use stratum::metadata::{Operation, SnapshotId, TableIdentifier};
use stratum::schema::{Field, FieldType, Predicate, Record, Schema};
use stratum::storage::{write_file, WriterOptions};
use stratum::table::{DeleteEngine, ScanIter, SnapshotCommitter, Table};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_table() -> (TempDir, Table, SnapshotCommitter) {
    let temp_dir = TempDir::new().unwrap();
    let catalog = Catalog::open(temp_dir.path()).unwrap();
    let schema = Schema::new(vec![
        Field::required(1, "id", FieldType::Long),
        Field::required(2, "name", FieldType::String),
        Field::optional(3, "group", FieldType::String),
    ])
    .unwrap();
    let table = catalog
        .create_table(&TableIdentifier::new("test", "people").unwrap(), &schema)
        .unwrap();

    let config = Config::builder().retry_wait_ms(1, 4).build();
    (temp_dir, table, SnapshotCommitter::new(&config))
}

fn person(id: i64, group: &str) -> Record {
    Record::new()
        .with("id", id)
        .with("name", format!("person-{}", id))
        .with("group", group)
}

fn append(table: &Table, committer: &SnapshotCommitter, records: &[Record]) -> SnapshotId {
    let base = table.current_snapshot().unwrap();
    let options = WriterOptions::default();
    let file = write_file(table.location(), table.schema(), records, options).unwrap();
    committer
        .commit(table, base.id, vec![file], vec![], Operation::Append)
        .unwrap()
        .id
}

fn scan(table: &Table, predicate: Option<&Predicate>) -> Vec<Record> {
    let snapshot = table.current_snapshot().unwrap();
    ScanIter::new(table, snapshot, predicate, 16)
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

fn ids(records: &[Record]) -> Vec<i64> {
    let mut ids: Vec<i64> = records.iter().map(|r| r.get_long("id").unwrap()).collect();
    ids.sort();
    ids
}

fn data_file_names(table: &Table) -> HashSet<String> {
    fs::read_dir(table.data_dir())
        .unwrap()
        .map(|e| format!("data/{}", e.unwrap().file_name().to_string_lossy()))
        .collect()
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_empty_table() {
    let (_temp, table, _committer) = setup_temp_table();
    assert!(scan(&table, None).is_empty());
}

#[test]
fn test_scan_all_files() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(2, "a")]);
    append(&table, &committer, &[person(3, "b")]);

    assert_eq!(ids(&scan(&table, None)), vec![1, 2, 3]);
}

#[test]
fn test_scan_with_predicate() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(2, "b")]);
    append(&table, &committer, &[person(3, "a")]);

    let found = scan(&table, Some(&Predicate::eq("group", "a")));
    assert_eq!(ids(&found), vec![1, 3]);

    let none = scan(&table, Some(&Predicate::eq("id", 42i64)));
    assert!(none.is_empty());
}

#[test]
fn test_scan_prunes_files_by_stats() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(2, "a")]);
    append(&table, &committer, &[person(10, "a"), person(11, "a")]);
    append(&table, &committer, &[person(20, "a")]);

    let predicate = Predicate::eq("id", 10i64);
    let snapshot = table.current_snapshot().unwrap();
    let mut iter = ScanIter::new(&table, snapshot, Some(&predicate), 16).unwrap();
    let found: Vec<Record> = iter.by_ref().map(|r| r.unwrap()).collect();

    assert_eq!(ids(&found), vec![10]);
    assert_eq!(iter.files_scanned(), 1);
    assert_eq!(iter.files_skipped(), 2);
}

#[test]
fn test_scan_rejects_bad_predicate() {
    let (_temp, table, _committer) = setup_temp_table();
    let snapshot = table.current_snapshot().unwrap();

    let err = ScanIter::new(&table, snapshot.clone(), Some(&Predicate::eq("nope", 1i64)), 16)
        .err()
        .unwrap();
    assert!(err.is_validation());

    let err = ScanIter::new(&table, snapshot, Some(&Predicate::eq("id", "1")), 16)
        .err()
        .unwrap();
    assert!(err.is_validation());
}

#[test]
fn test_scan_is_pinned_to_its_snapshot() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a")]);

    let iter = ScanIter::new(&table, table.current_snapshot().unwrap(), None, 16).unwrap();
    append(&table, &committer, &[person(2, "a")]);

    let pinned: Vec<Record> = iter.map(|r| r.unwrap()).collect();
    assert_eq!(ids(&pinned), vec![1]);
    assert_eq!(ids(&scan(&table, None)), vec![1, 2]);
}

#[test]
fn test_scan_missing_data_file_is_storage_failure() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a")]);
    let file = table.current_snapshot().unwrap().files()[0].clone();
    fs::remove_file(file.location(table.location())).unwrap();

    let mut iter = ScanIter::new(&table, table.current_snapshot().unwrap(), None, 16).unwrap();
    let err = iter.next().unwrap().unwrap_err();
    assert!(err.is_storage_failure());
    assert!(iter.next().is_none());
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_rewrites_partial_file() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(2, "a"), person(3, "b")]);
    let before = table.current_snapshot().unwrap();

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    let ack = engine.delete_where(&table, &Predicate::eq("id", 2i64)).unwrap();

    assert_eq!(ack.records_deleted, 1);
    assert_eq!(ack.files_removed, 1);
    assert_eq!(ack.files_added, 1);
    assert_eq!(ack.snapshot_id, Some(before.id.next()));

    let after = table.current_snapshot().unwrap();
    assert_eq!(after.summary.operation, Operation::Delete);
    assert!(!after.contains_file(&before.files()[0].path));
    assert_eq!(ids(&scan(&table, None)), vec![1, 3]);
}

#[test]
fn test_delete_drops_fully_matching_file() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(2, "a")]);
    append(&table, &committer, &[person(3, "b")]);

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    let ack = engine.delete_where(&table, &Predicate::eq("group", "a")).unwrap();

    assert_eq!(ack.records_deleted, 2);
    assert_eq!(ack.files_removed, 1);
    assert_eq!(ack.files_added, 0);
    assert_eq!(table.current_snapshot().unwrap().files().len(), 1);
    assert_eq!(ids(&scan(&table, None)), vec![3]);
}

#[test]
fn test_delete_leaves_unmatched_files_untouched() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(5, "b")]);
    append(&table, &committer, &[person(2, "a"), person(4, "a")]);
    let untouched = table.current_snapshot().unwrap().files()[0].path.clone();

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    engine.delete_where(&table, &Predicate::eq("id", 4i64)).unwrap();

    assert!(table.current_snapshot().unwrap().contains_file(&untouched));
}

#[test]
fn test_delete_without_match_commits_nothing() {
    let (_temp, table, committer) = setup_temp_table();
    let before = append(&table, &committer, &[person(1, "a"), person(3, "a")]);
    let files_before = data_file_names(&table);

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    // Inside the file's id range, so the file is read but nothing matches
    let ack = engine.delete_where(&table, &Predicate::eq("id", 2i64)).unwrap();

    assert!(ack.is_noop());
    assert_eq!(ack.records_deleted, 0);
    assert_eq!(table.current_snapshot().unwrap().id, before);
    assert_eq!(data_file_names(&table), files_before);
}

#[test]
fn test_delete_many_files_in_parallel() {
    let (_temp, table, committer) = setup_temp_table();
    for i in 0..12 {
        append(&table, &committer, &[person(i, "odd"), person(100 + i, "even")]);
    }

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    let ack = engine.delete_where(&table, &Predicate::eq("group", "odd")).unwrap();

    assert_eq!(ack.records_deleted, 12);
    assert_eq!(ack.files_removed, 12);
    assert_eq!(ack.files_added, 12);
    assert_eq!(ids(&scan(&table, None)), (100..112).collect::<Vec<_>>());
}

#[test]
fn test_delete_through_stale_handle() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(2, "b")]);

    // Loaded separately, so it does not share the table's pointer
    let other = Table::load(table.location()).unwrap();
    append(&table, &committer, &[person(3, "a")]);
    assert_eq!(other.cached_snapshot().id, SnapshotId(2));

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    let ack = engine.delete_where(&other, &Predicate::eq("group", "a")).unwrap();

    // The row appended through the other handle is deleted too
    assert_eq!(ack.records_deleted, 2);
    assert_eq!(ids(&scan(&table, None)), vec![2]);

    // Every data file on disk is either live or was live in history
    let live: HashSet<String> = table
        .current_snapshot()
        .unwrap()
        .files()
        .iter()
        .map(|f| f.path.clone())
        .collect();
    let historical: HashSet<String> = table
        .history()
        .unwrap()
        .iter()
        .flat_map(|s| s.files().iter().map(|f| f.path.clone()).collect::<Vec<_>>())
        .collect();
    assert!(live.is_subset(&historical));
    assert!(data_file_names(&table).is_subset(&historical));
}

#[test]
fn test_failed_delete_removes_finished_rewrites() {
    let (_temp, table, committer) = setup_temp_table();
    append(&table, &committer, &[person(1, "a"), person(2, "b")]);
    let before = append(&table, &committer, &[person(3, "a")]);

    let snapshot = table.current_snapshot().unwrap();
    let lost = snapshot.files()[1].clone();
    fs::remove_file(lost.location(table.location())).unwrap();
    let files_before = data_file_names(&table);

    // The first file rewrites cleanly; reading the second one fails
    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    assert!(engine.delete_where(&table, &Predicate::eq("group", "a")).is_err());

    assert_eq!(table.current_snapshot().unwrap().id, before);
    assert_eq!(data_file_names(&table), files_before);
}

// =============================================================================
// Replace Tests
// =============================================================================

#[test]
fn test_replace_where_single_snapshot() {
    let (_temp, table, committer) = setup_temp_table();
    let before = append(&table, &committer, &[person(1, "a"), person(2, "a")]);

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    let replacement = Record::new().with("id", 2i64).with("name", "renamed");
    let ack = engine
        .replace_where(&table, &Predicate::eq("id", 2i64), &[replacement.clone()])
        .unwrap();

    assert_eq!(ack.snapshot_id, Some(before.next()));
    assert_eq!(ack.records_deleted, 1);
    assert_eq!(ack.records_added, 1);

    let snapshot = table.current_snapshot().unwrap();
    assert_eq!(snapshot.summary.operation, Operation::Overwrite);
    assert_eq!(scan(&table, Some(&Predicate::eq("id", 2i64))), vec![replacement]);
    assert_eq!(ids(&scan(&table, None)), vec![1, 2]);
}

#[test]
fn test_replace_where_without_match_is_not_found() {
    let (_temp, table, committer) = setup_temp_table();
    let before = append(&table, &committer, &[person(1, "a")]);

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    let err = engine
        .replace_where(&table, &Predicate::eq("id", 9i64), &[person(9, "a")])
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(table.current_snapshot().unwrap().id, before);
}

#[test]
fn test_replace_where_validates_replacement_first() {
    let (_temp, table, committer) = setup_temp_table();
    let before = append(&table, &committer, &[person(1, "a")]);
    let files_before = data_file_names(&table);

    let engine = DeleteEngine::new(&committer, WriterOptions::default(), 16);
    let err = engine
        .replace_where(&table, &Predicate::eq("id", 1i64), &[Record::new().with("id", 1i64)])
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(table.current_snapshot().unwrap().id, before);
    assert_eq!(data_file_names(&table), files_before);
}
