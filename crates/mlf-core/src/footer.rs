//! Fixed-layout footer record appended to every `.mref`/`.mrkl` file.
//!
//! All scalars are big-endian on the wire. The record is always exactly
//! [`FIXED_FOOTER_SIZE`] bytes; unused trailing bytes are reserved zero
//! padding so the layout has room to grow without shifting existing fields.

use crate::error::{Error, Result};
use crate::shape::Shape;

/// Total on-disk size of a footer record, in bytes.
pub const FIXED_FOOTER_SIZE: usize = 64;

const ENCODED_FIELDS_SIZE: usize = 8 + 8 + 4 * 8; // chunk_size + total_content_size + 8 i32 fields
const RESERVED_PADDING: usize = FIXED_FOOTER_SIZE - ENCODED_FIELDS_SIZE;

/// Decoded footer record: shape scalars plus the bitset region length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footer {
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Total logical content size in bytes.
    pub total_content_size: u64,
    /// Total chunk (leaf) count, mirrored as `total_chunks` on the wire.
    pub total_chunks: u32,
    /// Real leaf count (same value as `total_chunks`; kept distinct on the
    /// wire for compatibility with the source format's two historical
    /// field names).
    pub leaf_count: u32,
    /// Padded leaf count (power of two).
    pub cap_leaf: u32,
    /// Total node count in the flat array.
    pub node_count: u32,
    /// Index of the first leaf in the flat node array.
    pub offset: u32,
    /// Number of internal node slots.
    pub internal_node_count: u32,
    /// Length of the bitset region, in bytes.
    pub bit_set_size: u32,
    /// Length of this footer record (always [`FIXED_FOOTER_SIZE`] for
    /// records this crate writes; checked, not assumed, on decode).
    pub footer_length: u32,
}

impl Footer {
    /// Build a footer from a `Shape` and an explicit bitset length.
    #[must_use]
    pub fn from_shape(shape: &Shape, bit_set_size: u32) -> Self {
        Self {
            chunk_size: shape.chunk_size(),
            total_content_size: shape.total_content_size(),
            total_chunks: shape.leaf_count(),
            leaf_count: shape.leaf_count(),
            cap_leaf: shape.cap_leaf(),
            node_count: shape.node_count(),
            offset: shape.offset(),
            internal_node_count: shape.internal_node_count(),
            bit_set_size,
            footer_length: FIXED_FOOTER_SIZE as u32,
        }
    }

    /// Reconstruct the `Shape` this footer describes.
    #[must_use]
    pub fn shape(&self) -> Shape {
        Shape::from_scalars(
            self.chunk_size,
            self.total_content_size,
            self.leaf_count,
            self.cap_leaf,
            self.node_count,
            self.offset,
            self.internal_node_count,
        )
    }

    /// Encode to exactly [`FIXED_FOOTER_SIZE`] bytes, big-endian.
    #[must_use]
    pub fn encode(&self) -> [u8; FIXED_FOOTER_SIZE] {
        let mut buf = [0u8; FIXED_FOOTER_SIZE];
        let mut w = 0usize;

        macro_rules! put {
            ($val:expr, $ty:ty) => {{
                let bytes = <$ty>::to_be_bytes($val);
                buf[w..w + bytes.len()].copy_from_slice(&bytes);
                w += bytes.len();
            }};
        }

        put!(self.chunk_size, u64);
        put!(self.total_content_size, u64);
        put!(self.total_chunks, u32);
        put!(self.leaf_count, u32);
        put!(self.cap_leaf, u32);
        put!(self.node_count, u32);
        put!(self.offset, u32);
        put!(self.internal_node_count, u32);
        put!(self.bit_set_size, u32);
        put!(self.footer_length, u32);

        debug_assert_eq!(w, ENCODED_FIELDS_SIZE);
        debug_assert_eq!(RESERVED_PADDING, FIXED_FOOTER_SIZE - ENCODED_FIELDS_SIZE);
        buf
    }

    /// Decode a footer from its raw bytes and validate internal consistency
    /// against the file's total length.
    ///
    /// `file_len` must be the full size of the `.mref`/`.mrkl` file on disk;
    /// this enforces spec invariant I4 (one geometry, checked everywhere).
    pub fn decode(bytes: &[u8], file_len: u64) -> Result<Self> {
        if bytes.len() < FIXED_FOOTER_SIZE {
            return Err(Error::corrupt_format(format!(
                "footer record too short: {} < {FIXED_FOOTER_SIZE}",
                bytes.len()
            )));
        }
        let bytes = &bytes[bytes.len() - FIXED_FOOTER_SIZE..];

        let mut r = 0usize;
        macro_rules! take {
            ($ty:ty) => {{
                const N: usize = std::mem::size_of::<$ty>();
                let val = <$ty>::from_be_bytes(bytes[r..r + N].try_into().expect("fixed width"));
                r += N;
                val
            }};
        }

        let chunk_size: u64 = take!(u64);
        let total_content_size: u64 = take!(u64);
        let total_chunks: u32 = take!(u32);
        let leaf_count: u32 = take!(u32);
        let cap_leaf: u32 = take!(u32);
        let node_count: u32 = take!(u32);
        let offset: u32 = take!(u32);
        let internal_node_count: u32 = take!(u32);
        let bit_set_size: u32 = take!(u32);
        let footer_length: u32 = take!(u32);

        if footer_length as usize != FIXED_FOOTER_SIZE {
            return Err(Error::corrupt_format(format!(
                "unexpected footer_length {footer_length} (expected {FIXED_FOOTER_SIZE})"
            )));
        }

        let expected_len =
            u64::from(node_count) * 32 + u64::from(bit_set_size) + footer_length as u64;
        if expected_len != file_len {
            return Err(Error::corrupt_format(format!(
                "file length {file_len} does not match node_count*32 + bit_set_size + footer_length ({expected_len})"
            )));
        }

        Ok(Self {
            chunk_size,
            total_content_size,
            total_chunks,
            leaf_count,
            cap_leaf,
            node_count,
            offset,
            internal_node_count,
            bit_set_size,
            footer_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_footer() -> Footer {
        let shape = Shape::new(1_572_864);
        Footer::from_shape(&shape, 1)
    }

    #[test]
    fn encode_decode_roundtrip() {
        let f = sample_footer();
        let encoded = f.encode();
        let file_len =
            u64::from(f.node_count) * 32 + u64::from(f.bit_set_size) + f.footer_length as u64;
        let decoded = Footer::decode(&encoded, file_len).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn rejects_length_mismatch() {
        let f = sample_footer();
        let encoded = f.encode();
        assert!(Footer::decode(&encoded, 1).is_err());
    }

    #[test]
    fn rejects_bad_footer_length_field() {
        let f = sample_footer();
        let mut encoded = f.encode();
        // Corrupt footer_length (last 4 bytes).
        let n = encoded.len();
        encoded[n - 4..].copy_from_slice(&999u32.to_be_bytes());
        assert!(Footer::decode(&encoded, 0).is_err());
    }

    proptest::proptest! {
        #[test]
        fn roundtrip_for_arbitrary_sizes(size in 0u64..(64u64 << 20), bit_set_size in 0u32..64) {
            let shape = Shape::new(size);
            let f = Footer::from_shape(&shape, bit_set_size);
            let encoded = f.encode();
            let file_len = u64::from(f.node_count) * 32 + u64::from(bit_set_size) + FIXED_FOOTER_SIZE as u64;
            let decoded = Footer::decode(&encoded, file_len).unwrap();
            prop_assert_eq!(decoded, f);
        }
    }
}
