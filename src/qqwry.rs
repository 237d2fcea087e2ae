//! Reader for the legacy QQWry binary database.
//!
//! ```text
//! +-------------+------------+
//! | first_index | last_index |   header, u32 LE each
//! +-------------+------------+
//! | detail records ...       |   end_ip u32 LE, location
//! +--------------------------+
//! | index records ...        |   start_ip u32 LE, record offset u24 LE
//! +--------------------------+
//! ```

use std::borrow::Cow;
use std::io;
use std::path::Path;

use bstr::{BString, ByteSlice as _};
use byteorder::{ByteOrder as _, LE};
use encoding_rs::GBK;
use positioned_io::{RandomAccessFile, ReadAt, ReadBytesAtExt as _};

use crate::adapter::{AdaptError, Adapted};
use crate::source::Unit;
use crate::validate::Candidate;

const HEADER_LEN: usize = 8;
const INDEX_LEN: u64 = 7;

/// Location is stored elsewhere, including the area.
const REDIRECT_FULL: u8 = 0x01;
/// Only the country is stored elsewhere.
const REDIRECT_COUNTRY: u8 = 0x02;

/// Longest string accepted before giving up on a missing terminator.
const MAX_STR_LEN: usize = 1024;

/// Filler the database uses for unknown values.
pub const UNKNOWN: &str = "CZ88.NET";

#[derive(Debug, Clone, Copy)]
pub struct Header {
    first_index: u32,
    last_index: u32,
}

impl Header {
    fn read(buf: &[u8]) -> io::Result<Header> {
        let first_index = LE::read_u32(&buf[0..4]);
        let last_index = LE::read_u32(&buf[4..8]);

        if last_index < first_index || (last_index - first_index) % INDEX_LEN as u32 != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "misaligned index bounds"));
        }
        if (first_index as usize) < HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "index overlaps header"));
        }

        Ok(Header { first_index, last_index })
    }

    pub fn first_index(&self) -> u32 {
        self.first_index
    }

    pub fn last_index(&self) -> u32 {
        self.last_index
    }

    /// Number of index records.
    pub fn records(&self) -> u32 {
        (self.last_index - self.first_index) / INDEX_LEN as u32 + 1
    }
}

/// One decoded range with its raw location strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub start: u32,
    pub end: u32,
    pub country: BString,
    pub area: BString,
}

/// Character encoding of the strings in a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Distributed files use GBK.
    #[default]
    Gbk,
    /// Files that were converted beforehand.
    Utf8,
}

impl Encoding {
    /// Decodes `bytes`, replacing invalid sequences with U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            Encoding::Gbk => GBK.decode_without_bom_handling(bytes).0,
            Encoding::Utf8 => bytes.to_str_lossy(),
        }
    }
}

impl Entry {
    /// Decoded candidate. Empty strings and the `CZ88.NET` filler count as
    /// unknown.
    pub fn candidate(&self, encoding: Encoding) -> Candidate {
        Candidate {
            start: self.start,
            end: self.end,
            locality: known(encoding.decode(&self.country)),
            provider: known(encoding.decode(&self.area)),
        }
    }
}

fn known(text: Cow<'_, str>) -> Option<String> {
    let text = text.trim();
    match text.is_empty() || text == UNKNOWN {
        true => None,
        false => Some(text.to_owned()),
    }
}

pub struct Database<R> {
    raf: R,
    header: Header,
    encoding: Encoding,
}

impl<R> Database<R> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn len(&self) -> u32 {
        self.header.records()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Sets how strings are decoded by [`Database::units`].
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl Database<RandomAccessFile> {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(RandomAccessFile::open(path)?)
    }
}

impl<R: ReadAt> Database<R> {
    pub fn new(raf: R) -> io::Result<Self> {
        let mut header_buf = [0; HEADER_LEN];
        raf.read_exact_at(0, &mut header_buf)?;
        let header = Header::read(&header_buf)?;

        // The last index record must be readable.
        let mut probe = [0; INDEX_LEN as usize];
        raf.read_exact_at(u64::from(header.last_index), &mut probe)?;

        Ok(Database {
            raf,
            header,
            encoding: Encoding::default(),
        })
    }

    /// Decodes the record at `index`, counting from 0.
    pub fn entry(&self, index: u32) -> io::Result<Entry> {
        if index >= self.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "record index out of range"));
        }

        // +----------+--------+
        // | start_ip | offset |
        // +----------+--------+
        let mut buf = [0; INDEX_LEN as usize];
        self.raf.read_exact_at(u64::from(self.header.first_index) + u64::from(index) * INDEX_LEN, &mut buf)?;
        let start = LE::read_u32(&buf[..4]);
        let offset = u64::from(LE::read_u24(&buf[4..]));

        let end = self.raf.read_u32_at::<LE>(offset)?;
        let (country, area) = self.read_location(offset + 4)?;

        Ok(Entry { start, end, country, area })
    }

    pub fn entries(&self) -> Entries<'_, R> {
        Entries { db: self, next: 0 }
    }

    /// Units for the conversion pipeline, numbered from 1.
    pub fn units(&self) -> impl Iterator<Item = crate::Result<Unit>> + '_ {
        let encoding = self.encoding;
        self.entries().enumerate().map(move |(i, entry)| {
            let outcome = entry
                .map(|entry| Adapted::Candidate(entry.candidate(encoding)))
                .map_err(|err| AdaptError::Record(err.to_string()));
            Ok(Unit { position: i as u64 + 1, outcome })
        })
    }

    fn read_location(&self, ptr: u64) -> io::Result<(BString, BString)> {
        match self.raf.read_u8_at(ptr)? {
            REDIRECT_FULL => {
                let target = self.read_u24(ptr + 1)?;
                if self.raf.read_u8_at(target)? == REDIRECT_COUNTRY {
                    let country = self.read_str(self.read_u24(target + 1)?)?;
                    Ok((country, self.read_area(target + 4)?))
                } else {
                    let country = self.read_str(target)?;
                    let next = target + country.len() as u64 + 1;
                    Ok((country, self.read_area(next)?))
                }
            }
            REDIRECT_COUNTRY => {
                let country = self.read_str(self.read_u24(ptr + 1)?)?;
                Ok((country, self.read_area(ptr + 4)?))
            }
            _ => {
                let country = self.read_str(ptr)?;
                let next = ptr + country.len() as u64 + 1;
                Ok((country, self.read_area(next)?))
            }
        }
    }

    fn read_area(&self, ptr: u64) -> io::Result<BString> {
        match self.raf.read_u8_at(ptr)? {
            REDIRECT_FULL | REDIRECT_COUNTRY => match self.read_u24(ptr + 1)? {
                0 => Ok(BString::from("")),
                target => self.read_str(target),
            },
            _ => self.read_str(ptr),
        }
    }

    fn read_u24(&self, ptr: u64) -> io::Result<u64> {
        let mut buf = [0; 3];
        self.raf.read_exact_at(ptr, &mut buf)?;
        Ok(u64::from(LE::read_u24(&buf)))
    }

    fn read_str(&self, ptr: u64) -> io::Result<BString> {
        // +-------+-------+-----+------+
        // | buf 0 | buf 1 | ... | 0x00 |
        // +-------+-------+-----+------+
        let mut out = Vec::new();
        let mut chunk = [0; 64];
        loop {
            let n = self.raf.read_at(ptr + out.len() as u64, &mut chunk)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unterminated string"));
            }
            match chunk[..n].find_byte(0) {
                Some(end) => {
                    out.extend_from_slice(&chunk[..end]);
                    return Ok(out.into());
                }
                None => out.extend_from_slice(&chunk[..n]),
            }
            if out.len() > MAX_STR_LEN {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "string too long"));
            }
        }
    }
}

pub struct Entries<'a, R> {
    db: &'a Database<R>,
    next: u32,
}

impl<'a, R: ReadAt> Iterator for Entries<'a, R> {
    type Item = io::Result<Entry>;

    fn next(&mut self) -> Option<io::Result<Entry>> {
        if self.next >= self.db.len() {
            return None;
        }
        let entry = self.db.entry(self.next);
        self.next += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = (self.db.len() - self.next) as usize;
        (rest, Some(rest))
    }
}
