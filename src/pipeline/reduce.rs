//! Size-reduction stage.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::{CacheError, Result};

/// Reversible size-reduction transform.
pub trait Reducer: Send + Sync + std::fmt::Debug {
    fn reduce(&self, data: &[u8]) -> Vec<u8>;
    fn restore(&self, reduced: &[u8]) -> Result<Vec<u8>>;
}

// == LZ4 Reducer ==
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Reducer;

impl Reducer for Lz4Reducer {
    fn reduce(&self, data: &[u8]) -> Vec<u8> {
        compress_prepend_size(data)
    }

    fn restore(&self, reduced: &[u8]) -> Result<Vec<u8>> {
        decompress_size_prepended(reduced)
            .map_err(|e| CacheError::Serialization(format!("decompression failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_shrinks_repetitive_payload() {
        let data = "abcdefgh".repeat(512).into_bytes();
        let reduced = Lz4Reducer.reduce(&data);

        assert!(reduced.len() < data.len());
        assert_eq!(Lz4Reducer.restore(&reduced).unwrap(), data);
    }

    #[test]
    fn test_lz4_rejects_garbage() {
        assert!(Lz4Reducer.restore(&[10, 0, 0, 0, 0xff]).is_err());
    }
}
