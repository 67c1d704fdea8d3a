// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bbq_core::SecretMode;

fn store(dir: &Path, secret: &str) -> PayloadStore {
    let s = PayloadStore::new(dir, PayloadCipher::from_options(secret, SecretMode::Legacy));
    s.ensure_dir().unwrap();
    s
}

#[test]
fn file_name_is_md5_of_id_with_extension() {
    let id = Uuid::nil();
    let expected_hash = format!("{:x}", md5::compute(id.to_string()));
    assert_eq!(PayloadStore::file_name(id), format!("{expected_hash}.knmbbq"));
    assert_eq!(PayloadStore::relative_path(id), format!("msgs/{expected_hash}.knmbbq"));
}

#[test]
fn write_read_round_trip_plain() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(tmp.path(), "");
    let id = Uuid::new_v4();

    store.write(id, "hello").unwrap();
    assert!(store.exists(id));
    assert_eq!(store.read(id).unwrap(), "hello");

    // Plaintext on disk when no key is configured.
    let raw = std::fs::read_to_string(tmp.path().join(PayloadStore::relative_path(id))).unwrap();
    assert_eq!(raw, "hello");
}

#[test]
fn write_read_round_trip_encrypted() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(tmp.path(), "hush");
    let id = Uuid::new_v4();

    store.write(id, r#"{"a":1}"#).unwrap();
    assert_eq!(store.read(id).unwrap(), r#"{"a":1}"#);

    let raw = std::fs::read_to_string(tmp.path().join(PayloadStore::relative_path(id))).unwrap();
    assert_ne!(raw, r#"{"a":1}"#);
    assert!(hex::decode(&raw).is_ok());
}

#[test]
fn remove_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(tmp.path(), "");
    let id = Uuid::new_v4();

    store.write(id, "x").unwrap();
    store.remove(id).unwrap();
    assert!(!store.exists(id));
    store.remove(id).unwrap();
}

#[test]
fn read_missing_payload_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(tmp.path(), "");
    assert!(matches!(store.read(Uuid::new_v4()), Err(StorageError::Io(_))));
}

#[test]
fn prune_removes_only_untracked_files() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(tmp.path(), "");
    let kept_id = Uuid::new_v4();
    let orphan_id = Uuid::new_v4();
    store.write(kept_id, "kept").unwrap();
    store.write(orphan_id, "orphan").unwrap();

    let keep: HashSet<String> = [PayloadStore::file_name(kept_id)].into_iter().collect();
    assert_eq!(store.prune(&keep).unwrap(), 1);
    assert!(store.exists(kept_id));
    assert!(!store.exists(orphan_id));

    // Nothing left to prune.
    assert_eq!(store.prune(&keep).unwrap(), 0);
}
