//! Bit streams for the Huffman coder.
//!
//! Bits are packed most significant first, the same as `bit_vec::BitVec::to_bytes`.
//! The reader can be rewound to where it started, which the encoder needs since
//! it scans the input twice.  The writer pads the last byte with zeros on `close`.

use bit_vec::BitVec;
use std::io::{Read,Write,Seek,SeekFrom,BufReader,BufWriter,ErrorKind};

/// number of bytes moved to or from the stream at a time
const CHUNK_SIZE: usize = 512;

pub struct BitReader<R: Read + Seek> {
    reader: BufReader<R>,
    start: u64,
    bits: BitVec,
    ptr: usize,
    consumed: u64
}

pub struct BitWriter<W: Write> {
    writer: BufWriter<W>,
    bits: BitVec,
    count: u64
}

impl <R: Read + Seek> BitReader<R> {
    /// Wrap `reader`, positioning it at `start`.  Rewinding returns to `start`.
    pub fn create(reader: R,start: u64) -> Result<Self,std::io::Error> {
        let mut ans = Self {
            reader: BufReader::new(reader),
            start,
            bits: BitVec::new(),
            ptr: 0,
            consumed: 0
        };
        ans.rewind()?;
        Ok(ans)
    }
    /// go back to the starting position, any buffered bits are discarded
    pub fn rewind(&mut self) -> Result<(),std::io::Error> {
        self.reader.seek(SeekFrom::Start(self.start))?;
        self.bits = BitVec::new();
        self.ptr = 0;
        self.consumed = 0;
        Ok(())
    }
    /// keep the bit vector small, we don't need the bits behind us
    fn drop_leading_bits(&mut self) {
        self.bits = self.bits.iter().skip(self.ptr).collect();
        self.ptr = 0;
    }
    /// Buffer at least `num_bits` ahead of the pointer, unless the stream runs out first.
    fn fill(&mut self,num_bits: usize) -> Result<(),std::io::Error> {
        let mut buf: [u8;CHUNK_SIZE] = [0;CHUNK_SIZE];
        while self.bits.len() - self.ptr < num_bits {
            let n = match self.reader.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind()==ErrorKind::Interrupted => continue,
                Err(e) => return Err(e)
            };
            self.drop_leading_bits();
            self.bits.append(&mut BitVec::from_bytes(&buf[0..n]));
        }
        Ok(())
    }
    /// Read `num_bits` (at most 32) as an unsigned value, first bit is the MSB.
    /// Returns `None` if the stream ends before all the bits are available.
    pub fn read_bits(&mut self,num_bits: usize) -> Result<Option<u32>,std::io::Error> {
        self.fill(num_bits)?;
        if self.bits.len() - self.ptr < num_bits {
            return Ok(None);
        }
        let mut ans: u32 = 0;
        for i in self.ptr..self.ptr+num_bits {
            ans = (ans << 1) | self.bits.get(i).unwrap_or(false) as u32;
        }
        self.ptr += num_bits;
        self.consumed += num_bits as u64;
        Ok(Some(ans))
    }
    /// bytes consumed since the start, a partially read byte counts as a whole one
    pub fn bytes_read(&self) -> u64 {
        (self.consumed + 7) / 8
    }
}

impl <W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            bits: BitVec::new(),
            count: 0
        }
    }
    /// Send whole bytes to the stream once enough have piled up.
    /// A trailing partial byte stays in the bit vector.
    fn drain(&mut self) -> Result<(),std::io::Error> {
        if self.bits.len() < 8*CHUNK_SIZE {
            return Ok(());
        }
        let whole = self.bits.len() / 8;
        let bytes = self.bits.to_bytes();
        self.writer.write_all(&bytes[0..whole])?;
        self.count += whole as u64;
        self.bits = self.bits.iter().skip(whole*8).collect();
        Ok(())
    }
    /// output the low `num_bits` of `code` (at most 32), starting from the MSB
    pub fn write_bits(&mut self,num_bits: usize,code: u32) -> Result<(),std::io::Error> {
        for i in (0..num_bits).rev() {
            self.bits.push((code >> i) & 1 > 0);
        }
        self.drain()
    }
    /// output a code of any length
    pub fn write_code(&mut self,code: &BitVec) -> Result<(),std::io::Error> {
        self.bits.extend(code.iter());
        self.drain()
    }
    /// Pad the last byte with zeros and flush.
    /// Returns the number of bytes written over the life of the writer.
    pub fn close(mut self) -> Result<u64,std::io::Error> {
        let bytes = self.bits.to_bytes();
        self.writer.write_all(&bytes)?;
        self.count += bytes.len() as u64;
        self.bits = BitVec::new();
        self.writer.flush()?;
        Ok(self.count)
    }
}

#[test]
fn msb_first() {
    let mut out: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut out);
    writer.write_bits(1,1).expect("write failed");
    writer.write_bits(9,256).expect("write failed");
    writer.write_bits(3,0b101).expect("write failed");
    assert_eq!(writer.close().expect("close failed"),2);
    // 1 100000000 101 + 3 padding bits
    assert_eq!(out,vec![0b11000000,0b00101000]);
}

#[test]
fn read_past_end() {
    let mut reader = BitReader::create(std::io::Cursor::new(vec![0xfa,0xce]),0).expect("seek failed");
    assert_eq!(reader.read_bits(4).unwrap(),Some(0xf));
    assert_eq!(reader.read_bits(9).unwrap(),Some(0b101011001));
    assert_eq!(reader.read_bits(4).unwrap(),None);
    // a failed read does not consume anything
    assert_eq!(reader.read_bits(3).unwrap(),Some(0b110));
    assert_eq!(reader.read_bits(1).unwrap(),None);
    assert_eq!(reader.bytes_read(),2);
}

#[test]
fn rewind_to_start() {
    let mut reader = BitReader::create(std::io::Cursor::new(vec![1,2,3]),1).expect("seek failed");
    assert_eq!(reader.read_bits(8).unwrap(),Some(2));
    assert_eq!(reader.read_bits(8).unwrap(),Some(3));
    assert_eq!(reader.read_bits(8).unwrap(),None);
    reader.rewind().expect("seek failed");
    assert_eq!(reader.bytes_read(),0);
    assert_eq!(reader.read_bits(16).unwrap(),Some(0x0203));
}

#[test]
fn long_stream() {
    // enough data to cross the chunk boundaries on both sides
    let data: Vec<u8> = (0..3000).map(|i| (i*7 % 256) as u8).collect();
    let mut out: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut out);
    writer.write_bits(3,0b111).expect("write failed");
    for by in &data {
        writer.write_bits(8,*by as u32).expect("write failed");
    }
    assert_eq!(writer.close().expect("close failed"),3001);
    let mut reader = BitReader::create(std::io::Cursor::new(out),0).expect("seek failed");
    assert_eq!(reader.read_bits(3).unwrap(),Some(0b111));
    for by in &data {
        assert_eq!(reader.read_bits(8).unwrap(),Some(*by as u32));
    }
    assert_eq!(reader.read_bits(5).unwrap(),Some(0));
    assert_eq!(reader.read_bits(1).unwrap(),None);
}
