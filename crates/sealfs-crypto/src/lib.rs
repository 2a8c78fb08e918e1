//! sealfs-crypto: content and filename encryption for sealfs drives
//!
//! Architecture: AES-256-CTR stream with optional chunked HMAC-SHA256
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, PBKDF2-HMAC-SHA256 from password + 24-byte salt)
//!   └── Drive Config blob: AES-CTR(master, iv) over drive key ‖ hash key ‖ drive id
//!         ├── Drive Key (256-bit random): file contents and filenames
//!         └── Hash Key (256-bit random): HMAC-SHA256 chunk tags, config signature
//! ```
//!
//! Encrypted file layout:
//! ```text
//! [17-byte header: magic ‖ version ‖ chunk size ‖ nonce]
//! [chunk 0 ciphertext][32-byte tag 0][chunk 1 ciphertext][32-byte tag 1] ...
//! ```
//! With a chunk size of 0 there are no tags and the body is plain CTR output.

pub mod drive_config;
pub mod header;
pub mod integrity;
pub mod kdf;
pub mod keys;
pub mod nonce;
pub mod stream;
pub mod text;
pub mod transform;

pub use drive_config::DriveConfig;
pub use header::FileHeader;
pub use integrity::{encrypted_len, plaintext_len, Integrity};
pub use kdf::{derive_master_key, MasterKey};
pub use keys::{generate_auth_id, generate_drive_id, DriveKey};
pub use nonce::{
    increase_nonce, nonce_from_slice, nonce_from_u64, nonce_to_u64, split_nonce_range, Nonce,
};
pub use stream::{decrypt_bytes, encrypt_bytes, AesStream, EncryptionMode, StreamOptions};
pub use text::{decrypt_name, decrypt_string, encrypt_name, encrypt_string};
pub use transform::CtrTransformer;

/// Size of an AES-256 key, drive key, or hash key (256-bit)
pub const KEY_SIZE: usize = 32;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Size of the CTR initial counter block
pub const IV_SIZE: usize = 16;

/// Size of an HMAC-SHA256 tag
pub const HASH_SIZE: usize = 32;

/// Size of the PBKDF2 salt stored in the drive config
pub const SALT_SIZE: usize = 24;

/// Magic bytes opening every file header and drive config
pub const MAGIC: [u8; 4] = *b"SEAL";

/// On-disk format version
pub const VERSION: u8 = 2;
