//! CRC32-based hashing for cache key components.

use crc32fast::Hasher;

/// Compute CRC32 checksum of the given data.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Hash of a data source identity string.
///
/// Identities can be long or contain characters unsuitable for keys, so
/// keys carry this hash instead.
pub fn identity_hash(identity: &str) -> u32 {
    crc32(identity.as_bytes())
}

/// Hash of an ordered column list.
///
/// Names are separated by a NUL byte so that `["ab", "c"]` and
/// `["a", "bc"]` hash differently.
pub fn column_list_hash<S: AsRef<str>>(columns: &[S]) -> u32 {
    let mut hasher = Hasher::new();
    for column in columns {
        hasher.update(column.as_ref().as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

/// Fixed-width hex rendering used inside keys.
pub fn to_hex(hash: u32) -> String {
    format!("{:08x}", hash)
}
