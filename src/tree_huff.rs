//! Static Huffman Compression with a Tree Header
//!
//! The input is read twice.  The first pass counts how often each byte occurs, and
//! a Huffman tree is built from the counts.  The tree shape goes into the output,
//! followed by the code of every byte from the second pass, followed by the code of a
//! pseudo-symbol marking the end of the data.  Because of that last code, the
//! expanded length does not need to be stored.
//!
//! Layout of the compressed data, bits are packed MSB first:
//! * 32 bit format tag `0xFACE8201`
//! * tree header, see `tools::static_huff::HuffTree::write_header`
//! * one code for each input byte
//! * code for the end-of-stream symbol
//! * zero bits out to a byte boundary

use std::io::{Cursor,Read,Write,Seek,SeekFrom,BufWriter};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use crate::tools::bit_io::{BitReader,BitWriter};
use crate::tools::static_huff::*;
use crate::DYNERR;

const BITS_PER_WORD: usize = 8;
const BITS_PER_INT: usize = 32;

/// Values of the leading 32 bits.  Only the tree header format is supported,
/// the counts header format is listed so it can be reported as such.
#[derive(FromPrimitive,Debug,PartialEq)]
#[repr(u32)]
enum FormatTag {
    Counts = 0xface8200,
    Tree = 0xface8201
}

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// starting position in the input file
    pub in_offset: u64,
    /// starting position in the output file
    pub out_offset: u64
}

pub const STD_OPTIONS: Options = Options {
    in_offset: 0,
    out_offset: 0
};

/// Count every byte until the reader runs out, the end-of-stream symbol is counted once.
/// Returns the table and the number of bytes read.
pub fn count_symbols<R: Read + Seek>(reader: &mut BitReader<R>) -> Result<(FrequencyTable,u64),std::io::Error> {
    let mut freq = FrequencyTable::new();
    let mut count: u64 = 0;
    while let Some(val) = reader.read_bits(BITS_PER_WORD)? {
        freq.tally(val as u8);
        count += 1;
    }
    Ok((freq,count))
}

fn put_symbol<W: Write>(codes: &CodeTable,symbol: u16,writer: &mut BitWriter<W>) -> Result<(),DYNERR> {
    match codes.get(symbol) {
        Some(code) => Ok(writer.write_code(code)?),
        None => {
            log::error!("no code for symbol {}, input changed between passes",symbol);
            Err(Box::new(crate::Error::FileFormatMismatch))
        }
    }
}

/// Both passes over the input, returns the number of bytes coded.
fn encode<R,W>(reader: &mut BitReader<R>,writer: &mut BitWriter<W>) -> Result<u64,DYNERR>
where R: Read + Seek, W: Write {
    let (freq,in_size) = count_symbols(reader)?;
    log::debug!("counted {} bytes with {} distinct symbols",in_size,freq.distinct() - 1);
    let tree = HuffTree::from_counts(&freq);
    let codes = tree.code_table();
    log::debug!("tree has {} leaves and weight {}",tree.leaf_count(),tree.weight());
    writer.write_bits(BITS_PER_INT,FormatTag::Tree as u32)?;
    tree.write_header(writer)?;
    reader.rewind()?;
    log::debug!("entering coding loop");
    while let Some(val) = reader.read_bits(BITS_PER_WORD)? {
        put_symbol(&codes,val as u16,writer)?;
    }
    put_symbol(&codes,EOF_SYMBOL,writer)?;
    Ok(in_size)
}

/// Check the tag, read the tree, and walk it until the end-of-stream symbol turns up.
/// Returns the number of bytes written.
fn decode<R,W>(reader: &mut BitReader<R>,writer: &mut W) -> Result<u64,DYNERR>
where R: Read + Seek, W: Write {
    let tag = reader.read_bits(BITS_PER_INT)?;
    match tag.and_then(FormatTag::from_u32) {
        Some(FormatTag::Tree) => {},
        Some(FormatTag::Counts) => {
            log::error!("counts header is not supported");
            return Err(Box::new(crate::Error::InvalidMagicNumber));
        },
        None => {
            log::error!("invalid magic number {:x?}",tag);
            return Err(Box::new(crate::Error::InvalidMagicNumber));
        }
    }
    let tree = HuffTree::read_header(reader)?;
    log::debug!("header has {} leaves",tree.leaf_count());
    let mut out_size: u64 = 0;
    let mut curr = tree.root();
    loop {
        let bit = match reader.read_bits(1)? {
            Some(b) => b == 1,
            None => {
                log::error!("no end-of-stream symbol after {} bytes",out_size);
                return Err(Box::new(crate::Error::TruncatedStream));
            }
        };
        curr = tree.step(curr,bit);
        match tree.symbol(curr) {
            Some(EOF_SYMBOL) => break,
            Some(symbol) => {
                log::trace!("decoded {}",symbol);
                writer.write_all(&[symbol as u8])?;
                out_size += 1;
                curr = tree.root();
            },
            None => {}
        }
    }
    Ok(out_size)
}

/// Main compression function.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let expanded_length = expanded_in.seek(SeekFrom::End(0))?;
    if opt.in_offset > expanded_length {
        return Err(Box::new(crate::Error::FileFormatMismatch));
    }
    compressed_out.seek(SeekFrom::Start(opt.out_offset))?;
    let mut reader = BitReader::create(expanded_in,opt.in_offset)?;
    let mut writer = BitWriter::new(compressed_out);
    let result = encode(&mut reader,&mut writer);
    // the writer is closed even if coding failed
    let closed = writer.close();
    let in_size = result?;
    let out_size = closed?;
    log::debug!("compressed {} bytes into {}",in_size,out_size);
    Ok((in_size,out_size))
}

/// Main decompression function.
/// `compressed_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.  Nothing is written if the format tag is wrong.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let compressed_length = compressed_in.seek(SeekFrom::End(0))?;
    if opt.in_offset > compressed_length {
        return Err(Box::new(crate::Error::FileFormatMismatch));
    }
    expanded_out.seek(SeekFrom::Start(opt.out_offset))?;
    let mut reader = BitReader::create(compressed_in,opt.in_offset)?;
    let mut writer = BufWriter::new(expanded_out);
    let result = decode(&mut reader,&mut writer);
    // flush even if decoding failed
    let flushed = writer.flush();
    let out_size = result?;
    flushed?;
    log::debug!("expanded {} bytes into {}",reader.bytes_read(),out_size);
    Ok((reader.bytes_read(),out_size))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,&STD_OPTIONS)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,&STD_OPTIONS)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[cfg(test)]
fn expect_error(compressed: &[u8],expected: crate::Error) -> Vec<u8> {
    let mut src = Cursor::new(compressed);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    match expand(&mut src,&mut ans,&STD_OPTIONS) {
        Ok(_) => panic!("expansion should have failed"),
        Err(e) => match e.downcast_ref::<crate::Error>() {
            Some(err) => assert_eq!(std::mem::discriminant(err),std::mem::discriminant(&expected)),
            None => panic!("unexpected error {}",e)
        }
    }
    ans.into_inner()
}

#[test]
fn compression_works() {
    let test_data = "".as_bytes();
    let huff_str = "FA CE 82 01 C0 00";
    let compressed = compress_slice(test_data).expect("compression failed");
    assert_eq!(compressed,hex::decode(huff_str.replace(" ","")).unwrap());

    let test_data = "AB".as_bytes();
    let huff_str = "FA CE 82 01 60 09 06 42 B0";
    let compressed = compress_slice(test_data).expect("compression failed");
    assert_eq!(compressed,hex::decode(huff_str.replace(" ","")).unwrap());

    let test_data = "I am Sam. Sam I am.".as_bytes();
    let huff_str = "FA CE 82 01 26 D4 93 29 A2 03 00 8B A6 15 72 7C D9 F2 57 37 00";
    let compressed = compress_slice(test_data).expect("compression failed");
    assert_eq!(compressed,hex::decode(huff_str.replace(" ","")).unwrap());
}

#[test]
fn repeated_byte() {
    let test_data = [b'A';100];
    let huff_str = "FA CE 82 01 60 12 0F FF FF FF FF FF FF FF FF FF FF FF FF 80";
    let compressed = compress_slice(&test_data).expect("compression failed");
    assert_eq!(compressed,hex::decode(huff_str.replace(" ","")).unwrap());
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    let test_data = "".as_bytes();
    let compressed = compress_slice(test_data).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded.len(),0);
}

#[test]
fn invertibility_all_bytes() {
    let test_data: Vec<u8> = (0..=255).collect();
    let compressed = compress_slice(&test_data).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);

    // long enough to cross buffer boundaries, with a skewed distribution
    let test_data: Vec<u8> = (0..20000u32).map(|i| ((i*i) % 251 % (1 + i % 17)) as u8).collect();
    let compressed = compress_slice(&test_data).expect("compression failed");
    assert!(compressed.len() < test_data.len());
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn invertibility_large() {
    // 256 KB, each reader chunk is consumed bit by bit many times over
    let mut state: u32 = 12345;
    let test_data: Vec<u8> = (0..0x40000).map(|_| {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        (state >> 16) as u8 & 0x3f
    }).collect();
    let compressed = compress_slice(&test_data).expect("compression failed");
    assert!(compressed.len() < test_data.len());
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn determinism() {
    // two symbols with one occurrence each, tied with end-of-stream
    let test_data = "xy".as_bytes();
    let first = compress_slice(test_data).expect("compression failed");
    let second = compress_slice(test_data).expect("compression failed");
    assert_eq!(first,second);
    let test_data = "the quick brown fox jumps over the lazy dog".as_bytes();
    let first = compress_slice(test_data).expect("compression failed");
    let second = compress_slice(test_data).expect("compression failed");
    assert_eq!(first,second);
}

#[test]
fn counting() {
    let mut reader = BitReader::create(Cursor::new("hello".as_bytes()),1).expect("seek failed");
    let (freq,count) = count_symbols(&mut reader).expect("counting failed");
    assert_eq!(count,4);
    assert_eq!(freq.get(b'l' as u16),2);
    assert_eq!(freq.get(b'h' as u16),0);
    assert_eq!(freq.get(EOF_SYMBOL),1);
}

#[test]
fn offsets() {
    let test_data = "HEADabracadabra".as_bytes();
    let opt = Options {
        in_offset: 4,
        out_offset: 2
    };
    let mut src = Cursor::new(test_data);
    let mut compressed: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let (in_size,out_size) = compress(&mut src,&mut compressed,&opt).expect("compression failed");
    assert_eq!((in_size,out_size),(11,16));
    let compressed = compressed.into_inner();
    assert_eq!(compressed[0..2].to_vec(),vec![0,0]);
    assert_eq!(compressed[2..].to_vec(),hex::decode("FA CE 82 01 4C 26 01 31 27 24 C7 32 2E 73 D7 20".replace(" ","")).unwrap());

    // the compressed data starts where compression put it
    let opt = Options {
        in_offset: 2,
        out_offset: 2
    };
    let mut src = Cursor::new(compressed);
    let mut expanded: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let (in_size,out_size) = expand(&mut src,&mut expanded,&opt).expect("expansion failed");
    assert_eq!((in_size,out_size),(16,11));
    assert_eq!(expanded.into_inner()[2..].to_vec(),test_data[4..].to_vec());

    let opt = Options {
        in_offset: 100,
        out_offset: 0
    };
    let mut src = Cursor::new(test_data);
    let mut compressed: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    assert!(compress(&mut src,&mut compressed,&opt).is_err());
}

#[test]
fn bad_magic() {
    let mut compressed = compress_slice("I am Sam".as_bytes()).expect("compression failed");
    compressed[0] = 0x00;
    let written = expect_error(&compressed,crate::Error::InvalidMagicNumber);
    assert_eq!(written.len(),0);
    // the counts format is not supported
    compressed[0] = 0xfa;
    compressed[3] = 0x00;
    expect_error(&compressed,crate::Error::InvalidMagicNumber);
    // too short to hold a tag
    expect_error(&[0xfa,0xce],crate::Error::InvalidMagicNumber);
}

#[test]
fn truncated_header() {
    let compressed = compress_slice(&[b'A';100]).expect("compression failed");
    // header ends at bit 53
    expect_error(&compressed[0..5],crate::Error::MalformedHeader);
    expect_error(&compressed[0..4],crate::Error::MalformedHeader);
}

#[test]
fn truncated_stream() {
    let compressed = compress_slice(&[b'A';100]).expect("compression failed");
    expect_error(&compressed[0..10],crate::Error::TruncatedStream);
    expect_error(&compressed[0..compressed.len()-1],crate::Error::TruncatedStream);
    let compressed = compress_slice("I am Sam. Sam I am.".as_bytes()).expect("compression failed");
    expect_error(&compressed[0..compressed.len()-2],crate::Error::TruncatedStream);
}
