/// Maps a caller key to the gene (sharding hint) embedded in every ID.
///
/// Implementations receive the key passed to
/// [`SnowflakeComposer::next_id`](crate::SnowflakeComposer::next_id) and the
/// modulus `2^gene_bits`, and must return a value below that modulus. The
/// composer rejects anything larger with
/// [`Error::InvalidGene`](crate::Error::InvalidGene).
///
/// Any `Fn(Option<&str>, u64) -> u64` is a gene function:
///
/// ```
/// use segflake::GeneFunc;
///
/// let by_len = |key: Option<&str>, modulus: u64| key.map_or(0, |k| k.len() as u64 % modulus);
/// assert_eq!(by_len.gene(Some("tenant-7"), 16), 8);
/// ```
pub trait GeneFunc {
    fn gene(&self, key: Option<&str>, modulus: u64) -> u64;
}

impl<F> GeneFunc for F
where
    F: Fn(Option<&str>, u64) -> u64,
{
    fn gene(&self, key: Option<&str>, modulus: u64) -> u64 {
        self(key, modulus)
    }
}

/// Default gene: the key read as a decimal integer, reduced modulo `2^gene`.
///
/// Only numeric-like keys (user ids, order numbers) spread well under this
/// function. Non-numeric or absent keys all map to `0`; use [`Fnv1aGene`] or
/// a custom [`GeneFunc`] for arbitrary strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericGene;

impl GeneFunc for NumericGene {
    fn gene(&self, key: Option<&str>, modulus: u64) -> u64 {
        key.and_then(|k| k.trim().parse::<i128>().ok())
            .map_or(0, |n| {
                // rem_euclid of a positive u64 modulus always fits a u64
                n.rem_euclid(i128::from(modulus.max(1))) as u64
            })
    }
}

/// 64-bit FNV-1a over the key bytes, reduced modulo `2^gene`.
///
/// Stable across processes and releases, so every instance places the same
/// key in the same gene bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1aGene;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl GeneFunc for Fnv1aGene {
    fn gene(&self, key: Option<&str>, modulus: u64) -> u64 {
        let Some(key) = key else {
            return 0;
        };
        let hash = key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        });
        hash % modulus.max(1)
    }
}
