//! Deterministic string hashing used for bucketing users into rollouts and experiment variants.
//!
//! Hashes exist purely for uniform, reproducible bucketing. They carry no security properties.

/// Number of buckets users are distributed over. Percentages are expressed against it.
pub const TOTAL_BUCKETS: u32 = 100;

/// A deterministic string hash.
///
/// Implementations must return the same value for the same input across processes, restarts and
/// platforms, otherwise users would silently change buckets.
pub trait StringHasher: Send + Sync {
    /// Hash `input` into a non-negative 32-bit integer.
    fn hash(&self, input: &str) -> u32;

    /// Bucket of `user_id` for `key`, in `[0, TOTAL_BUCKETS)`.
    ///
    /// The hash input is `"<user_id>:<key>"`.
    fn bucket(&self, user_id: &str, key: &str) -> u32 {
        self.hash(&format!("{user_id}:{key}")) % TOTAL_BUCKETS
    }
}

/// The default hasher: `h = h * 31 + code_unit` over UTF-16 code units with 32-bit wrapping,
/// returning the absolute value of the signed result.
///
/// For ASCII input this is `abs(String.hashCode())` as found in Java and most JavaScript ports,
/// so assignments stay compatible with clients that bucket the same way.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolynomialHasher;

impl StringHasher for PolynomialHasher {
    fn hash(&self, input: &str) -> u32 {
        let h = input.encode_utf16().fold(0i32, |h, unit| {
            h.wrapping_mul(31).wrapping_add(i32::from(unit))
        });
        h.unsigned_abs()
    }
}

/// Hasher based on the first four bytes of the MD5 digest.
///
/// Better spread than [`PolynomialHasher`], but not compatible with assignments produced by it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Hasher;

impl StringHasher for Md5Hasher {
    fn hash(&self, input: &str) -> u32 {
        let digest = md5::compute(input);
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

#[cfg(test)]
pub(crate) struct DeterministicHasher(pub std::collections::HashMap<String, u32>);

#[cfg(test)]
impl StringHasher for DeterministicHasher {
    fn hash(&self, input: &str) -> u32 {
        self.0.get(input).copied().unwrap_or(0)
    }
}
