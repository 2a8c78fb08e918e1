//! Two devices sharing one drive: authorization split and disjoint nonces.

use std::sync::Arc;

use sealfs_core::config::DriveSettings;
use sealfs_crypto::nonce_to_u64;
use sealfs_drive::Drive;
use sealfs_sequence::{FileSequencer, NonceSequencer};
use sealfs_storage::LocalFile;
use secrecy::SecretString;

fn settings() -> DriveSettings {
    DriveSettings {
        kdf_iterations: 16,
        ..Default::default()
    }
}

#[test]
fn split_at_pivot_gives_disjoint_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("drive");
    let password = SecretString::from("pass123");

    let seq_a = Arc::new(FileSequencer::open(&dir.path().join("a/sequences.json")));
    let drive_a = Drive::create(LocalFile::shared(&root), &password, seq_a.clone(), settings())
        .unwrap();
    let drive_hex = drive_a.drive_id_hex().unwrap();
    let auth_a = drive_a.auth_id().unwrap();

    // bring device A to next = 5, max = 100
    seq_a.set_max_nonce(&drive_hex, &auth_a, 100).unwrap();
    for expected in 0..5u64 {
        assert_eq!(nonce_to_u64(&drive_a.next_nonce().unwrap()), expected);
    }

    let seq_b = Arc::new(FileSequencer::open(&dir.path().join("b/sequences.json")));
    let drive_b = Drive::open(LocalFile::shared(&root), seq_b.clone(), settings()).unwrap();
    drive_b.unlock(&password).unwrap();
    let auth_b = drive_b.auth_id().unwrap();
    assert_ne!(auth_a, auth_b);

    let auth_file = drive_a.auth_file().unwrap();
    let config = drive_a.export_auth_file(&auth_b, &auth_file).unwrap();
    assert_eq!(config.start_nonce, 52);
    assert_eq!(config.max_nonce, 100);

    let a = seq_a.get_sequence(&drive_hex).unwrap().unwrap();
    assert_eq!(a.max_nonce, Some(52));
    // the auth file itself was encrypted with A's nonce 5
    assert_eq!(a.next_nonce, Some(6));

    drive_b.import_auth_file(&auth_file).unwrap();
    let b = seq_b.get_sequence(&drive_hex).unwrap().unwrap();
    assert_eq!((b.start_nonce, b.next_nonce, b.max_nonce), (Some(52), Some(52), Some(100)));

    let mut from_a = Vec::new();
    while let Ok(nonce) = drive_a.next_nonce() {
        from_a.push(nonce_to_u64(&nonce));
    }
    let mut from_b = Vec::new();
    while let Ok(nonce) = drive_b.next_nonce() {
        from_b.push(nonce_to_u64(&nonce));
    }
    assert_eq!(from_a, (6..52).collect::<Vec<_>>());
    assert_eq!(from_b, (52..100).collect::<Vec<_>>());
    assert!(drive_a.next_nonce().unwrap_err().is_range_exceeded());
    assert!(drive_b.next_nonce().unwrap_err().is_range_exceeded());
}

#[test]
fn imported_authorization_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("drive");
    let password = SecretString::from("pw");
    let store_b = dir.path().join("b/sequences.json");

    let drive_a = Drive::create(
        LocalFile::shared(&root),
        &password,
        Arc::new(FileSequencer::open(&dir.path().join("a/sequences.json"))),
        settings(),
    )
    .unwrap();

    let drive_b =
        Drive::open(LocalFile::shared(&root), Arc::new(FileSequencer::open(&store_b)), settings())
            .unwrap();
    drive_b.unlock(&password).unwrap();
    let auth_b = drive_b.auth_id().unwrap();
    let file = drive_a.auth_file().unwrap();
    drive_a.export_auth_file(&auth_b, &file).unwrap();
    drive_b.import_auth_file(&file).unwrap();
    let first = nonce_to_u64(&drive_b.next_nonce().unwrap());
    drop(drive_b);

    let reopened =
        Drive::open(LocalFile::shared(&root), Arc::new(FileSequencer::open(&store_b)), settings())
            .unwrap();
    reopened.unlock(&password).unwrap();
    assert_eq!(reopened.auth_id().unwrap(), auth_b);
    assert_eq!(nonce_to_u64(&reopened.next_nonce().unwrap()), first + 1);
    assert!(reopened.import_auth_file(&file).unwrap_err().is_auth());
}
