// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_core::{CheckpointId, NodeId, PartitionId};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn id() -> BackupIdentifier {
    BackupIdentifier::new(NodeId(2), PartitionId(1), CheckpointId(42))
}

fn source_files(dir: &Path) -> (NamedFiles, NamedFiles) {
    let segment = dir.join("journal-1.log");
    std::fs::write(&segment, b"segment bytes").unwrap();
    let data = dir.join("snapshot.data");
    std::fs::write(&data, b"snapshot bytes").unwrap();
    (
        BTreeMap::from([("journal-1.log".to_string(), segment)]),
        BTreeMap::from([("snapshot.data".to_string(), data)]),
    )
}

#[tokio::test]
async fn missing_backup_does_not_exist() {
    let root = TempDir::new().unwrap();
    let store = FsBackupStore::new(root.path());

    let status = store.get_status(&id()).await.unwrap();

    assert_eq!(status.code, BackupStatusCode::DoesNotExist);
    assert!(matches!(
        store.restore(&id(), root.path()).await,
        Err(BackupError::NotFound(_))
    ));
}

#[tokio::test]
async fn saved_backup_is_completed_and_restorable() {
    let root = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let store = FsBackupStore::new(root.path());
    let (segments, snapshot) = source_files(source.path());
    let backup = Backup {
        id: id(),
        descriptor: BackupDescriptor {
            checkpoint_position: 99,
            snapshot_id: Some("state-50".to_string()),
        },
        segments,
        snapshot,
    };

    store.save(&backup).await.unwrap();

    assert!(root.path().join("1/42/2/status.json").is_file());
    assert!(store.get_status(&id()).await.unwrap().is_completed());

    let restored = store.restore(&id(), target.path()).await.unwrap();
    assert_eq!(restored.descriptor, backup.descriptor);
    let segment = &restored.segments["journal-1.log"];
    assert!(segment.starts_with(target.path()));
    assert_eq!(std::fs::read(segment).unwrap(), b"segment bytes");
    assert_eq!(
        std::fs::read(&restored.snapshot["snapshot.data"]).unwrap(),
        b"snapshot bytes"
    );
}

#[tokio::test]
async fn in_progress_backup_cannot_be_restored() {
    let root = TempDir::new().unwrap();
    let store = FsBackupStore::new(root.path());
    store
        .set_status(&BackupStatus::new(id(), BackupStatusCode::InProgress))
        .await
        .unwrap();

    let err = store.restore(&id(), root.path()).await.unwrap_err();

    assert!(matches!(
        err,
        BackupError::NotComplete {
            code: BackupStatusCode::InProgress,
            ..
        }
    ));
}

#[tokio::test]
async fn file_names_cannot_escape_backup() {
    let root = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let store = FsBackupStore::new(root.path());
    let file = source.path().join("x");
    std::fs::write(&file, b"x").unwrap();
    let backup = Backup {
        id: id(),
        descriptor: BackupDescriptor {
            checkpoint_position: 1,
            snapshot_id: None,
        },
        segments: BTreeMap::from([("../escape".to_string(), file)]),
        snapshot: NamedFiles::new(),
    };

    let err = store.save(&backup).await.unwrap_err();
    assert!(matches!(err, BackupError::InvalidFileName(_)));
}
