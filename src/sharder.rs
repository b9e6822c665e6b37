//! Deterministic MD5-based sharding.
//!
//! Shard values must agree bit-for-bit with every other implementation evaluating the same
//! configuration, so the hashing convention is fixed: MD5 over the UTF-8 bytes of the input, first
//! four bytes of the digest read as a big-endian `u32`, reduced modulo the number of shards.

/// Compute the shard for the concatenation of `input` parts.
///
/// Passing parts separately is equivalent to hashing `input.concat()` but avoids allocating the
/// intermediate string.
///
/// `total_shards` must be non-zero.
pub fn get_md5_shard(input: &[&str], total_shards: u64) -> u64 {
    let mut hasher = md5::Context::new();
    for part in input {
        hasher.consume(part.as_bytes());
    }
    let md5::Digest(hash) = hasher.compute();
    let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
    u64::from(value) % total_shards
}
