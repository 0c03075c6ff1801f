//! Building blocks for the codecs: bit streams and the Huffman tree

pub mod bit_io;
pub mod static_huff;
