//! Two devices sharing one drive, each with its own sequence store.

use sealfs_core::SequenceStatus;
use sealfs_crypto::split_nonce_range;
use sealfs_sequence::{FileSequencer, MemorySequencer, NonceSequencer};

const DRIVE: &str = "00112233445566778899aabbccddeeff";

fn hand_off(owner: &dyn NonceSequencer, requester: &dyn NonceSequencer, requester_auth: &str) {
    let seq = owner.get_sequence(DRIVE).unwrap().unwrap();
    let (next, max) = (seq.next_nonce.unwrap(), seq.max_nonce.unwrap());
    let pivot = split_nonce_range(next, max).unwrap();
    owner.set_max_nonce(DRIVE, &seq.auth_id, pivot).unwrap();
    requester
        .initialize_sequence(DRIVE, requester_auth, pivot, max)
        .unwrap();
}

#[test]
fn devices_never_share_a_nonce() {
    let dir = tempfile::tempdir().unwrap();
    let laptop = FileSequencer::open(&dir.path().join("laptop.json"));
    let phone = FileSequencer::open(&dir.path().join("phone.json"));

    laptop.create_sequence(DRIVE, "aa").unwrap();
    laptop.initialize_sequence(DRIVE, "aa", 0, 64).unwrap();
    for _ in 0..10 {
        laptop.next_nonce(DRIVE).unwrap();
    }

    phone.create_sequence(DRIVE, "bb").unwrap();
    assert_eq!(
        phone.get_sequence(DRIVE).unwrap().unwrap().status,
        SequenceStatus::New
    );
    assert!(phone.next_nonce(DRIVE).unwrap_err().is_auth());
    hand_off(&laptop, &phone, "bb");

    let mut laptop_nonces = Vec::new();
    while let Ok(n) = laptop.next_nonce(DRIVE) {
        laptop_nonces.push(n);
    }
    let mut phone_nonces = Vec::new();
    while let Ok(n) = phone.next_nonce(DRIVE) {
        phone_nonces.push(n);
    }

    assert_eq!(laptop_nonces, (10..37).collect::<Vec<_>>());
    assert_eq!(phone_nonces, (37..64).collect::<Vec<_>>());
    assert!(laptop.next_nonce(DRIVE).unwrap_err().is_range_exceeded());
}

#[test]
fn chained_hand_off_keeps_ranges_disjoint() {
    let a = MemorySequencer::new();
    let b = MemorySequencer::new();
    let c = MemorySequencer::new();
    a.create_sequence(DRIVE, "a1").unwrap();
    a.initialize_sequence(DRIVE, "a1", 0, 1000).unwrap();
    b.create_sequence(DRIVE, "b1").unwrap();
    c.create_sequence(DRIVE, "c1").unwrap();

    hand_off(&a, &b, "b1");
    hand_off(&b, &c, "c1");

    let range = |s: &MemorySequencer| {
        let seq = s.get_sequence(DRIVE).unwrap().unwrap();
        (seq.next_nonce.unwrap(), seq.max_nonce.unwrap())
    };
    assert_eq!(range(&a), (0, 500));
    assert_eq!(range(&b), (500, 750));
    assert_eq!(range(&c), (750, 1000));
}

#[test]
fn revoked_device_can_request_again_under_a_new_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seq.json");
    let store = FileSequencer::open(&path);
    store.create_sequence(DRIVE, "aa").unwrap();
    store.initialize_sequence(DRIVE, "aa", 0, 10).unwrap();
    store.revoke_sequence(DRIVE).unwrap();

    let reopened = FileSequencer::open(&path);
    assert!(reopened.next_nonce(DRIVE).is_err());
    assert!(reopened.create_sequence(DRIVE, "aa").is_err());
    reopened.create_sequence(DRIVE, "cc").unwrap();
    assert_eq!(reopened.get_sequence(DRIVE).unwrap().unwrap().auth_id, "cc");
}

#[test]
fn corrupt_store_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seq.json");
    std::fs::write(&path, b"{ not json").unwrap();
    let store = FileSequencer::open(&path);
    assert!(store.get_sequence(DRIVE).is_err());
    assert!(store.next_nonce(DRIVE).is_err());
    assert_eq!(std::fs::read(&path).unwrap(), b"{ not json");
}
