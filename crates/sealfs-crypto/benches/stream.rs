use sealfs_crypto::{decrypt_bytes, encrypt_bytes, Integrity};

const KEY: [u8; 32] = [0x42; 32];
const HASH_KEY: [u8; 32] = [0x24; 32];

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_untagged(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encrypt_bytes(
                divan::black_box(&data),
                &KEY,
                [0u8; 8],
                Integrity::disabled(),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_tagged(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    let integrity = Integrity::new(256 * 1024, &HASH_KEY).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encrypt_bytes(
                divan::black_box(&data),
                &KEY,
                [0u8; 8],
                integrity.clone(),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_verified(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    let integrity = Integrity::new(256 * 1024, &HASH_KEY).unwrap();
    let encrypted = encrypt_bytes(&data, &KEY, [0u8; 8], integrity).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt_bytes(divan::black_box(&encrypted), &KEY, Some(&HASH_KEY)).unwrap());
}

fn main() {
    divan::main();
}
