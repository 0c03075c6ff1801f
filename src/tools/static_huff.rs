//! Module to build and serialize a static Huffman tree.
//! This is used by the `tree_huff` module.
//!
//! Nodes live in a pool and refer to their sons by index.  Every branch has
//! exactly two sons, and every node except the root is the son of exactly one branch.

use bit_vec::BitVec;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read,Write,Seek};
use super::bit_io::{BitReader,BitWriter};
use crate::DYNERR;

/// bits used to store a symbol in the header
pub const SYMBOL_BITS: usize = 9;
/// pseudo-symbol that terminates the coded data
pub const EOF_SYMBOL: u16 = 256;
/// 256 byte values plus the end-of-stream symbol
pub const NUM_SYMBOLS: usize = 257;
/// largest pool a tree with NUM_SYMBOLS leaves can need
const MAX_NODES: usize = 2*NUM_SYMBOLS - 1;

/// Occurrence count of each symbol.
/// The end-of-stream symbol is counted once from the start.
#[derive(Clone,Debug,PartialEq)]
pub struct FrequencyTable {
    counts: [u64;NUM_SYMBOLS]
}

impl FrequencyTable {
    pub fn new() -> Self {
        let mut counts = [0;NUM_SYMBOLS];
        counts[EOF_SYMBOL as usize] = 1;
        Self {
            counts
        }
    }
    pub fn tally(&mut self,byte: u8) {
        self.counts[byte as usize] += 1;
    }
    pub fn get(&self,symbol: u16) -> u64 {
        self.counts[symbol as usize]
    }
    /// number of symbols that will get a leaf
    pub fn distinct(&self) -> usize {
        self.counts.iter().filter(|c| **c > 0).count()
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Map from symbols to codes, symbols that never occurred have no code.
#[derive(Clone,Debug,PartialEq)]
pub struct CodeTable {
    codes: Vec<Option<BitVec>>
}

impl CodeTable {
    pub fn get(&self,symbol: u16) -> Option<&BitVec> {
        self.codes[symbol as usize].as_ref()
    }
    /// iterate over (symbol,code) for the symbols that have a code
    pub fn iter(&self) -> impl Iterator<Item = (u16,&BitVec)> {
        self.codes.iter().enumerate().filter_map(|(s,c)| c.as_ref().map(|code| (s as u16,code)))
    }
}

#[derive(Clone,Debug)]
enum Node {
    Leaf {
        symbol: u16,
        weight: u64
    },
    Branch {
        weight: u64,
        left: usize,
        right: usize
    }
}

impl Node {
    fn weight(&self) -> u64 {
        match self {
            Node::Leaf { weight, .. } => *weight,
            Node::Branch { weight, .. } => *weight
        }
    }
}

/// Huffman tree stored in a node pool.
/// Trees read back from a header carry zero weights, only the shape matters for decoding.
pub struct HuffTree {
    nodes: Vec<Node>,
    root: usize
}

impl HuffTree {
    /// Build the tree by repeatedly merging the two lightest nodes.
    /// The first node taken becomes the left son.
    ///
    /// Ties are broken by a sequence number: leaves are numbered by their symbol value,
    /// and branches are numbered 257, 258, ... in the order they are created.
    /// Hence among equal weights, leaves come before branches, smaller symbols before
    /// larger ones, and older branches before newer ones.  This makes the tree, and
    /// therefore the compressed output, the same on every run.
    pub fn from_counts(freq: &FrequencyTable) -> Self {
        let mut nodes = Vec::new();
        // heap entries are (weight,sequence,pool index)
        let mut heap = BinaryHeap::new();
        for symbol in 0..NUM_SYMBOLS {
            let weight = freq.counts[symbol];
            if weight > 0 {
                heap.push(Reverse((weight,symbol,nodes.len())));
                nodes.push(Node::Leaf { symbol: symbol as u16, weight });
            }
        }
        let mut seq = NUM_SYMBOLS;
        while heap.len() > 1 {
            // both pops succeed since the heap holds at least two entries
            let (Some(Reverse((w0,_,left))),Some(Reverse((w1,_,right)))) = (heap.pop(),heap.pop()) else {
                break;
            };
            heap.push(Reverse((w0+w1,seq,nodes.len())));
            nodes.push(Node::Branch { weight: w0+w1, left, right });
            seq += 1;
        }
        // The node created last is the root.  There is always at least one,
        // since the end-of-stream symbol is always counted.
        let root = nodes.len() - 1;
        Self {
            nodes,
            root
        }
    }
    /// index of the root node
    pub fn root(&self) -> usize {
        self.root
    }
    /// total weight, for a tree built from counts this is the number of symbols coded
    pub fn weight(&self) -> u64 {
        self.nodes[self.root].weight()
    }
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n,Node::Leaf {..})).count()
    }
    /// symbol at `pos`, or None if `pos` is a branch
    pub fn symbol(&self,pos: usize) -> Option<u16> {
        match self.nodes[pos] {
            Node::Leaf { symbol, .. } => Some(symbol),
            Node::Branch { .. } => None
        }
    }
    /// Go down one level from `pos`, to the right son if `bit` is set.
    /// A leaf maps to itself, which only happens when the root is a leaf.
    pub fn step(&self,pos: usize,bit: bool) -> usize {
        match self.nodes[pos] {
            Node::Branch { left, right, .. } => match bit {
                true => right,
                false => left
            },
            Node::Leaf { .. } => pos
        }
    }
    /// Assign each leaf the path from the root, 0 going left and 1 going right.
    /// If the root is a leaf its path is empty, so it gets the one bit code `0` instead.
    pub fn code_table(&self) -> CodeTable {
        let mut codes = vec![None;NUM_SYMBOLS];
        match self.nodes[self.root] {
            Node::Leaf { symbol, .. } => {
                codes[symbol as usize] = Some(BitVec::from_elem(1,false));
            },
            Node::Branch { .. } => {
                self.collect_codes(self.root,&mut BitVec::new(),&mut codes);
            }
        }
        CodeTable {
            codes
        }
    }
    fn collect_codes(&self,pos: usize,path: &mut BitVec,codes: &mut Vec<Option<BitVec>>) {
        match self.nodes[pos] {
            Node::Leaf { symbol, .. } => {
                codes[symbol as usize] = Some(path.clone());
            },
            Node::Branch { left, right, .. } => {
                path.push(false);
                self.collect_codes(left,path,codes);
                path.pop();
                path.push(true);
                self.collect_codes(right,path,codes);
                path.pop();
            }
        }
    }
    /// Write the shape of the tree in preorder.  A branch is a 0 followed by its left
    /// and right subtrees, a leaf is a 1 followed by the 9 bit symbol.
    pub fn write_header<W: Write>(&self,writer: &mut BitWriter<W>) -> Result<(),std::io::Error> {
        self.write_node(self.root,writer)
    }
    fn write_node<W: Write>(&self,pos: usize,writer: &mut BitWriter<W>) -> Result<(),std::io::Error> {
        match self.nodes[pos] {
            Node::Leaf { symbol, .. } => {
                writer.write_bits(1,1)?;
                writer.write_bits(SYMBOL_BITS,symbol as u32)
            },
            Node::Branch { left, right, .. } => {
                writer.write_bits(1,0)?;
                self.write_node(left,writer)?;
                self.write_node(right,writer)
            }
        }
    }
    /// Rebuild a tree from a header written by `write_header`.
    pub fn read_header<R: Read + Seek>(reader: &mut BitReader<R>) -> Result<Self,DYNERR> {
        let mut nodes = Vec::new();
        let root = Self::read_node(reader,&mut nodes)?;
        Ok(Self {
            nodes,
            root
        })
    }
    fn read_node<R: Read + Seek>(reader: &mut BitReader<R>,nodes: &mut Vec<Node>) -> Result<usize,DYNERR> {
        if nodes.len() >= MAX_NODES {
            log::error!("header describes more than {} nodes",MAX_NODES);
            return Err(Box::new(crate::Error::MalformedHeader));
        }
        let pos = nodes.len();
        match reader.read_bits(1)? {
            Some(1) => {
                let symbol = match reader.read_bits(SYMBOL_BITS)? {
                    Some(s) if s <= EOF_SYMBOL as u32 => s as u16,
                    Some(s) => {
                        log::error!("symbol {} out of range",s);
                        return Err(Box::new(crate::Error::MalformedHeader));
                    },
                    None => {
                        log::error!("header ended inside a leaf");
                        return Err(Box::new(crate::Error::MalformedHeader));
                    }
                };
                nodes.push(Node::Leaf { symbol, weight: 0 });
            },
            Some(_) => {
                // hold the slot so the branch precedes its sons
                nodes.push(Node::Branch { weight: 0, left: pos, right: pos });
                let left = Self::read_node(reader,nodes)?;
                let right = Self::read_node(reader,nodes)?;
                nodes[pos] = Node::Branch { weight: 0, left, right };
            },
            None => {
                log::error!("header ended after {} nodes",nodes.len());
                return Err(Box::new(crate::Error::MalformedHeader));
            }
        }
        Ok(pos)
    }
}

#[cfg(test)]
fn counts_of(dat: &[u8]) -> FrequencyTable {
    let mut freq = FrequencyTable::new();
    for by in dat {
        freq.tally(*by);
    }
    freq
}

#[cfg(test)]
fn code_str(code: &BitVec) -> String {
    code.iter().map(|b| if b { '1' } else { '0' }).collect()
}

#[cfg(test)]
fn header_round_trip(tree: &HuffTree) -> HuffTree {
    let mut buf: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut buf);
    tree.write_header(&mut writer).expect("write failed");
    writer.close().expect("close failed");
    let mut reader = BitReader::create(std::io::Cursor::new(buf),0).expect("seek failed");
    HuffTree::read_header(&mut reader).expect("header rejected")
}

#[cfg(test)]
fn assert_prefix_free(table: &CodeTable) {
    let all: Vec<(u16,&BitVec)> = table.iter().collect();
    for (s1,c1) in &all {
        assert!(c1.len() > 0);
        for (s2,c2) in &all {
            if s1 != s2 && c1.len() <= c2.len() {
                assert!(c2.iter().take(c1.len()).ne(c1.iter()),"code for {} is a prefix of code for {}",s1,s2);
            }
        }
    }
}

#[test]
fn sentinel_always_counted() {
    let freq = FrequencyTable::new();
    assert_eq!(freq.get(EOF_SYMBOL),1);
    assert_eq!(freq.distinct(),1);
    let freq = counts_of("abracadabra".as_bytes());
    assert_eq!(freq.get(EOF_SYMBOL),1);
    assert_eq!(freq.get(b'a' as u16),5);
    assert_eq!(freq.distinct(),6);
}

#[test]
fn codes_with_ties() {
    // a=5 b=2 r=2 c=1 d=1 EOF=1
    let tree = HuffTree::from_counts(&counts_of("abracadabra".as_bytes()));
    assert_eq!(tree.weight(),12);
    assert_eq!(tree.leaf_count(),6);
    let table = tree.code_table();
    let expected = [(b'a' as u16,"0"),(EOF_SYMBOL,"100"),(b'b' as u16,"101"),(b'r' as u16,"110"),(b'c' as u16,"1110"),(b'd' as u16,"1111")];
    for (symbol,code) in expected {
        assert_eq!(code_str(table.get(symbol).unwrap()),code);
    }
    assert_eq!(table.iter().count(),6);
}

#[test]
fn two_leaf_tree() {
    let tree = HuffTree::from_counts(&counts_of(&[65;100]));
    assert_eq!(tree.leaf_count(),2);
    let table = tree.code_table();
    assert_eq!(code_str(table.get(EOF_SYMBOL).unwrap()),"0");
    assert_eq!(code_str(table.get(65).unwrap()),"1");
}

#[test]
fn single_leaf_tree() {
    let tree = HuffTree::from_counts(&FrequencyTable::new());
    assert_eq!(tree.leaf_count(),1);
    assert_eq!(tree.symbol(tree.root()),Some(EOF_SYMBOL));
    assert_eq!(tree.step(tree.root(),true),tree.root());
    let table = tree.code_table();
    assert_eq!(code_str(table.get(EOF_SYMBOL).unwrap()),"0");
    let copy = header_round_trip(&tree);
    assert_eq!(copy.code_table(),table);
}

#[test]
fn all_symbols() {
    let dat: Vec<u8> = (0..=255).collect();
    let tree = HuffTree::from_counts(&counts_of(&dat));
    assert_eq!(tree.leaf_count(),257);
    let table = tree.code_table();
    assert_eq!(table.iter().count(),257);
    assert_prefix_free(&table);
}

#[test]
fn skewed_prefix_free() {
    let mut dat = Vec::new();
    for i in 0..20 {
        for _j in 0..(1 << (i % 12)) {
            dat.push(i as u8 * 11);
        }
    }
    let tree = HuffTree::from_counts(&counts_of(&dat));
    assert_prefix_free(&tree.code_table());
}

#[test]
fn header_isomorphic() {
    let samples: [&[u8];4] = [
        "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes(),
        "abracadabra".as_bytes(),
        &[0,0,0,255,255,1],
        &[]
    ];
    for dat in samples {
        let tree = HuffTree::from_counts(&counts_of(dat));
        let copy = header_round_trip(&tree);
        assert_eq!(copy.leaf_count(),tree.leaf_count());
        assert_eq!(copy.code_table(),tree.code_table());
    }
}

#[test]
fn header_bits() {
    // 0 1 001000001 1 100000000 with 3 bits of padding
    let tree = HuffTree::from_counts(&counts_of("A".as_bytes()));
    let mut buf: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut buf);
    tree.write_header(&mut writer).expect("write failed");
    writer.close().expect("close failed");
    assert_eq!(buf,hex::decode("483800").unwrap());
}

#[test]
fn header_too_short() {
    let mut reader = BitReader::create(std::io::Cursor::new(vec![0x60,0x12]),0).expect("seek failed");
    match HuffTree::read_header(&mut reader) {
        Err(e) => assert!(matches!(e.downcast_ref::<crate::Error>(),Some(crate::Error::MalformedHeader))),
        Ok(_) => panic!("truncated header was accepted")
    }
}

#[test]
fn header_symbol_out_of_range() {
    // leaf with symbol 511
    let mut reader = BitReader::create(std::io::Cursor::new(vec![0xff,0xc0]),0).expect("seek failed");
    match HuffTree::read_header(&mut reader) {
        Err(e) => assert!(matches!(e.downcast_ref::<crate::Error>(),Some(crate::Error::MalformedHeader))),
        Ok(_) => panic!("bad symbol was accepted")
    }
}

#[test]
fn header_too_deep() {
    // nothing but branch markers
    let mut reader = BitReader::create(std::io::Cursor::new(vec![0;100]),0).expect("seek failed");
    match HuffTree::read_header(&mut reader) {
        Err(e) => assert!(matches!(e.downcast_ref::<crate::Error>(),Some(crate::Error::MalformedHeader))),
        Ok(_) => panic!("runaway header was accepted")
    }
}
