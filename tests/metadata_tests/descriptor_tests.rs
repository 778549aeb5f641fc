//! Tests for metadata descriptors
//!
//! These tests verify:
//! - Descriptor framing and corruption detection
//! - Snapshot derivation (file set arithmetic, summaries, lineage)
//! - Snapshot file naming
//! - No-clobber publishing
//! - Table identifier validation

use std::fs;

use stratum::metadata::{
    decode_descriptor, encode_descriptor, DescriptorKind, Operation, PublishResult, Snapshot,
    SnapshotId, StagedDescriptor, TableIdentifier, TableMetadata,
};
use stratum::schema::{Field, FieldType, Schema};
use stratum::storage::DataFile;
use stratum::StratumError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn data_file(name: &str, records: u64) -> DataFile {
    DataFile {
        path: format!("data/{}.parquet", name),
        record_count: records,
        file_size: 100,
        schema_id: 0,
        column_stats: Vec::new(),
    }
}

fn test_schema() -> Schema {
    Schema::new(vec![Field::required(1, "id", FieldType::Long)]).unwrap()
}

fn assert_corruption<T: std::fmt::Debug>(result: stratum::Result<T>) {
    match result {
        Err(StratumError::Corruption(_)) => {}
        other => panic!("expected corruption, got {:?}", other),
    }
}

// =============================================================================
// Codec Tests
// =============================================================================

#[test]
fn test_snapshot_descriptor_round_trip() {
    let base = Snapshot::initial(0);
    let snapshot = Snapshot::derive(&base, &[data_file("a", 3)], &[], Operation::Append).unwrap();

    let bytes = encode_descriptor(DescriptorKind::Snapshot, &snapshot).unwrap();
    assert_eq!(&bytes[0..4], b"STRM");

    let decoded: Snapshot = decode_descriptor(DescriptorKind::Snapshot, &bytes).unwrap();
    assert_eq!(decoded, snapshot);
}

#[test]
fn test_table_descriptor_round_trip() {
    let identifier = TableIdentifier::new("app", "users").unwrap();
    let metadata = TableMetadata::new(identifier, test_schema());

    let bytes = encode_descriptor(DescriptorKind::Table, &metadata).unwrap();
    let decoded: TableMetadata = decode_descriptor(DescriptorKind::Table, &bytes).unwrap();

    assert_eq!(decoded, metadata);
}

#[test]
fn test_decode_truncated_header() {
    assert_corruption(decode_descriptor::<Snapshot>(DescriptorKind::Snapshot, b"STRM"));
}

#[test]
fn test_decode_bad_magic() {
    let mut bytes = encode_descriptor(DescriptorKind::Snapshot, &Snapshot::initial(0)).unwrap();
    bytes[0] = b'X';
    assert_corruption(decode_descriptor::<Snapshot>(DescriptorKind::Snapshot, &bytes));
}

#[test]
fn test_decode_kind_mismatch() {
    let bytes = encode_descriptor(DescriptorKind::Snapshot, &Snapshot::initial(0)).unwrap();
    assert_corruption(decode_descriptor::<TableMetadata>(DescriptorKind::Table, &bytes));
}

#[test]
fn test_decode_unknown_version() {
    let mut bytes = encode_descriptor(DescriptorKind::Snapshot, &Snapshot::initial(0)).unwrap();
    bytes[5] = 0xFF;
    assert_corruption(decode_descriptor::<Snapshot>(DescriptorKind::Snapshot, &bytes));
}

#[test]
fn test_decode_truncated_payload() {
    let bytes = encode_descriptor(DescriptorKind::Snapshot, &Snapshot::initial(0)).unwrap();
    assert_corruption(decode_descriptor::<Snapshot>(
        DescriptorKind::Snapshot,
        &bytes[..bytes.len() - 1],
    ));
}

#[test]
fn test_decode_flipped_payload_bit() {
    let mut bytes = encode_descriptor(DescriptorKind::Snapshot, &Snapshot::initial(0)).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    assert_corruption(decode_descriptor::<Snapshot>(DescriptorKind::Snapshot, &bytes));
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_initial_snapshot() {
    let snapshot = Snapshot::initial(0);

    assert_eq!(snapshot.id, SnapshotId::INITIAL);
    assert_eq!(snapshot.parent_id, None);
    assert!(snapshot.files().is_empty());
    assert_eq!(snapshot.summary.operation, Operation::Create);
    assert_eq!(snapshot.total_records(), 0);
}

#[test]
fn test_derive_adds_and_removes() {
    let s1 = Snapshot::initial(0);
    let s2 = Snapshot::derive(&s1, &[data_file("a", 2), data_file("b", 3)], &[], Operation::Append)
        .unwrap();
    let s3 = Snapshot::derive(&s2, &[data_file("c", 1)], &[data_file("a", 2)], Operation::Delete)
        .unwrap();

    assert_eq!(s2.id, SnapshotId(2));
    assert_eq!(s3.id, SnapshotId(3));
    assert_eq!(s3.parent_id, Some(SnapshotId(2)));
    assert!(s3.timestamp_ms >= s2.timestamp_ms);

    assert!(!s3.contains_file("data/a.parquet"));
    assert!(s3.contains_file("data/b.parquet"));
    assert!(s3.contains_file("data/c.parquet"));

    let summary = &s3.summary;
    assert_eq!(summary.operation, Operation::Delete);
    assert_eq!(summary.added_files, 1);
    assert_eq!(summary.removed_files, 1);
    assert_eq!(summary.added_records, 1);
    assert_eq!(summary.removed_records, 2);
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.total_records, 4);

    // The base is untouched
    assert_eq!(s2.files().len(), 2);
}

#[test]
fn test_derive_rejects_removing_missing_file() {
    let s1 = Snapshot::initial(0);
    let err = Snapshot::derive(&s1, &[], &[data_file("ghost", 1)], Operation::Delete).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_derive_rejects_duplicate_add() {
    let s1 = Snapshot::initial(0);
    let s2 = Snapshot::derive(&s1, &[data_file("a", 1)], &[], Operation::Append).unwrap();

    let err = Snapshot::derive(&s2, &[data_file("a", 1)], &[], Operation::Append).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_snapshot_file_names_sort_by_id() {
    let names: Vec<String> = [1u64, 2, 10, 100]
        .iter()
        .map(|id| SnapshotId(*id).file_name())
        .collect();

    assert_eq!(names[0], "snap-00000000000000000001.bin");
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(sorted, names);

    for (id, name) in [1u64, 2, 10, 100].iter().zip(&names) {
        assert_eq!(SnapshotId::parse_file_name(name), Some(SnapshotId(*id)));
    }
    assert_eq!(SnapshotId::parse_file_name("table.bin"), None);
    assert_eq!(SnapshotId::parse_file_name(".staged-x.tmp"), None);
}

// =============================================================================
// Publish Tests
// =============================================================================

#[test]
fn test_publish_no_clobber() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("snap.bin");

    let first = StagedDescriptor::write(temp.path(), b"first").unwrap();
    let second = StagedDescriptor::write(temp.path(), b"second").unwrap();

    assert_eq!(first.publish(&target).unwrap(), PublishResult::Published);
    assert_eq!(second.publish(&target).unwrap(), PublishResult::AlreadyExists);
    assert_eq!(fs::read(&target).unwrap(), b"first");
}

#[test]
fn test_staged_temp_file_removed_on_drop() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("snap.bin");

    {
        let staged = StagedDescriptor::write(temp.path(), b"bytes").unwrap();
        staged.publish(&target).unwrap();
    }

    let entries: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert!(target.exists());
}

/// The target directory can be linked into but not opened, so its fsync fails
#[cfg(unix)]
#[test]
fn test_publish_is_final_once_linked() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let target_dir = temp.path().join("metadata");
    fs::create_dir(&staging).unwrap();
    fs::create_dir(&target_dir).unwrap();

    let staged = StagedDescriptor::write(&staging, b"bytes").unwrap();
    fs::set_permissions(&target_dir, fs::Permissions::from_mode(0o300)).unwrap();

    // Permission bits do not apply to root
    if fs::read_dir(&target_dir).is_ok() {
        fs::set_permissions(&target_dir, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let target = target_dir.join("snap.bin");
    let result = staged.publish(&target);
    fs::set_permissions(&target_dir, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(result.unwrap(), PublishResult::Published);
    assert_eq!(fs::read(&target).unwrap(), b"bytes");
}

// =============================================================================
// Identifier Tests
// =============================================================================

#[test]
fn test_table_identifier_validation() {
    let identifier = TableIdentifier::new("app", "user_events-v2").unwrap();
    assert_eq!(identifier.to_string(), "app.user_events-v2");

    assert!(TableIdentifier::new("", "users").unwrap_err().is_validation());
    assert!(TableIdentifier::new("app", "").unwrap_err().is_validation());
    assert!(TableIdentifier::new("app", "../etc").unwrap_err().is_validation());
    assert!(TableIdentifier::new("a.b", "users").unwrap_err().is_validation());
}
