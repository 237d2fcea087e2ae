//! Readers that split raw input into rows and run them through an
//! [`Adapter`].

use std::io::{self, BufRead, Read};

use crate::adapter::{AdaptError, Adapted, Adapter, COMMENT};
use crate::config::HeaderPolicy;
use crate::error::{Error, Result};

/// One input unit: a line, a CSV row or a binary record.
#[derive(Debug)]
pub struct Unit {
    /// 1-based line, row or record number.
    pub position: u64,
    pub outcome: std::result::Result<Adapted, AdaptError>,
}

/// Delimited text, one record per line.
pub struct TextSource<R> {
    reader: R,
    delimiter: char,
    adapter: Adapter,
    line: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> TextSource<R> {
    pub fn new(reader: R, delimiter: char, adapter: Adapter) -> TextSource<R> {
        TextSource {
            reader,
            delimiter,
            adapter,
            line: 0,
            buf: Vec::new(),
        }
    }

    fn read_unit(&mut self) -> io::Result<Option<Unit>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;

        let outcome = match std::str::from_utf8(&self.buf) {
            Ok(line) => {
                let line = line.trim_end_matches(&['\r', '\n'][..]);
                let fields: Vec<&str> = line.split(self.delimiter).collect();
                self.adapter.adapt(&fields)
            }
            Err(_) => Err(AdaptError::Encoding),
        };

        Ok(Some(Unit {
            position: self.line,
            outcome,
        }))
    }
}

impl<R: BufRead> Iterator for TextSource<R> {
    type Item = Result<Unit>;

    fn next(&mut self) -> Option<Result<Unit>> {
        self.read_unit().map_err(Error::from).transpose()
    }
}

/// Comma separated values, optionally starting with a header row.
pub struct CsvSource<R> {
    records: csv::StringRecordsIntoIter<R>,
    adapter: Adapter,
    header: Option<HeaderPolicy>,
    row: u64,
}

impl<R: Read> CsvSource<R> {
    pub fn new(reader: R, adapter: Adapter, header: HeaderPolicy) -> CsvSource<R> {
        let records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader)
            .into_records();

        CsvSource {
            records,
            adapter,
            header: Some(header),
            row: 0,
        }
    }
}

impl<R: Read> Iterator for CsvSource<R> {
    type Item = Result<Unit>;

    fn next(&mut self) -> Option<Result<Unit>> {
        loop {
            let record = self.records.next()?;
            self.row += 1;

            let record = match record {
                Ok(record) => record,
                Err(err) if err.is_io_error() => return Some(Err(err.into())),
                Err(err) => {
                    let position = err.position().map_or(self.row, |p| p.line());
                    let outcome = match err.kind() {
                        csv::ErrorKind::Utf8 { .. } => Err(AdaptError::Encoding),
                        _ => Err(AdaptError::Record(err.to_string())),
                    };
                    self.header = None;
                    return Some(Ok(Unit { position, outcome }));
                }
            };

            let position = record.position().map_or(self.row, |p| p.line());
            let fields: Vec<&str> = record.iter().collect();

            // Comments may precede the header row.
            let comment = fields.first().map_or(false, |field| field.starts_with(COMMENT));
            if !comment {
                if let Some(policy) = self.header.take() {
                    if policy.is_header(&fields) {
                        tracing::debug!(line = position, "skipping header row");
                        continue;
                    }
                }
            }

            return Some(Ok(Unit {
                position,
                outcome: self.adapter.adapt(&fields),
            }));
        }
    }
}
