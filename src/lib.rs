//! # huffpack
//!
//! Lossless compression with a static Huffman code.  The input is scanned once to
//! count symbols, a prefix tree is built from the counts, and the tree shape is
//! written ahead of the coded data so the output describes itself.
//!
//! ```rust
//! let data = "I am Sam. Sam I am.".as_bytes();
//! let compressed = huffpack::tree_huff::compress_slice(data)?;
//! let expanded = huffpack::tree_huff::expand_slice(&compressed)?;
//! assert_eq!(data.to_vec(),expanded);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod tools;
pub mod tree_huff;

type DYNERR = Box<dyn std::error::Error>;

/// Codec Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("invalid magic number")]
    InvalidMagicNumber,
    #[error("malformed tree header")]
    MalformedHeader,
    #[error("stream ended before end-of-stream symbol")]
    TruncatedStream
}
