//! Batching of accepted ranges and the sinks they are flushed to.

use std::io::Write;

use tracing::{debug, error};

use crate::error::Result;
use crate::AddressRange;

/// Destination for flushed batches.
pub trait Sink {
    /// Writes one non-empty batch. An error for which
    /// [`Error::is_batch_failure`](crate::Error::is_batch_failure) holds
    /// must leave the destination as it was before the call.
    fn write_batch(&mut self, batch: &[AddressRange]) -> Result<()>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write_batch(&mut self, batch: &[AddressRange]) -> Result<()> {
        (**self).write_batch(batch)
    }
}

/// Counters kept by a [`BatchEmitter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatchStats {
    pub batches: u64,
    pub rows: u64,
    pub failed_batches: u64,
    pub lost_rows: u64,
}

/// Accumulates ranges and hands them to a [`Sink`] in groups of
/// `batch_size`.
pub struct BatchEmitter<S> {
    sink: S,
    buffer: Vec<AddressRange>,
    batch_size: usize,
    stats: BatchStats,
}

impl<S: Sink> BatchEmitter<S> {
    /// # Panics
    ///
    /// If `batch_size` is 0. Use [`Settings::validate`](crate::Settings::validate)
    /// on user input.
    pub fn new(sink: S, batch_size: usize) -> BatchEmitter<S> {
        assert!(batch_size > 0, "batch size must be positive");
        BatchEmitter {
            sink,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            stats: BatchStats::default(),
        }
    }

    pub fn push(&mut self, range: AddressRange) -> Result<()> {
        self.buffer.push(range);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes out the pending ranges, if any.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let rows = self.buffer.len() as u64;
        let result = self.sink.write_batch(&self.buffer);
        self.buffer.clear();

        match result {
            Ok(()) => {
                self.stats.batches += 1;
                self.stats.rows += rows;
                debug!(batch = self.stats.batches, rows, "flushed batch");
                Ok(())
            }
            Err(err) if err.is_batch_failure() => {
                self.stats.failed_batches += 1;
                self.stats.lost_rows += rows;
                error!(rows, error = %err, "batch rolled back");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Flushes the remainder and gives back the sink.
    pub fn finish(mut self) -> Result<(S, BatchStats)> {
        self.flush()?;
        Ok((self.sink, self.stats))
    }
}

/// In-memory sink that keeps every batch it receives.
#[derive(Debug, Default)]
pub struct Recorder {
    pub batches: Vec<Vec<AddressRange>>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    pub fn ranges(&self) -> impl Iterator<Item = &AddressRange> {
        self.batches.iter().flatten()
    }
}

impl Sink for Recorder {
    fn write_batch(&mut self, batch: &[AddressRange]) -> Result<()> {
        self.batches.push(batch.to_vec());
        Ok(())
    }
}

/// Sink that renders batches as MySQL `INSERT` statements.
pub struct SqlScript<W> {
    out: W,
    table: String,
}

impl<W: Write> SqlScript<W> {
    /// Writes the script header. With `clear` set the script empties the
    /// table before inserting, otherwise the statement is left commented
    /// out.
    pub fn new(mut out: W, source: &str, database: &str, table: &str, clear: bool) -> Result<SqlScript<W>> {
        writeln!(out, "-- IP address data ({})", source)?;
        writeln!(out, "-- generated by {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "-- columns: start_ip, end_ip, address1 (locality), address2 (provider)")?;
        writeln!(out)?;
        writeln!(out, "USE {};", database)?;
        writeln!(out)?;
        match clear {
            true => writeln!(out, "TRUNCATE TABLE {};", table)?,
            false => writeln!(out, "-- TRUNCATE TABLE {};", table)?,
        }
        writeln!(out)?;

        Ok(SqlScript {
            out,
            table: table.to_owned(),
        })
    }

    /// Appends the summary comment and flushes the writer.
    pub fn finish(mut self, imported: u64, errors: u64) -> Result<W> {
        writeln!(self.out)?;
        writeln!(self.out, "-- import complete")?;
        writeln!(self.out, "-- {} records imported", imported)?;
        writeln!(self.out, "-- {} records failed", errors)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Sink for SqlScript<W> {
    fn write_batch(&mut self, batch: &[AddressRange]) -> Result<()> {
        writeln!(self.out, "INSERT INTO {} (start_ip, end_ip, address1, address2) VALUES", self.table)?;
        for (i, range) in batch.iter().enumerate() {
            if i > 0 {
                writeln!(self.out, ",")?;
            }
            write!(
                self.out,
                "({}, {}, {}, {})",
                range.start,
                range.end,
                quote(&range.locality),
                quote(&range.provider)
            )?;
        }
        writeln!(self.out, ";")?;
        writeln!(self.out)?;
        Ok(())
    }
}

/// Quotes a string literal for MySQL.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Placeholders;
    use crate::validate::{validate, Candidate};
    use crate::Error;

    fn range(start: u32) -> AddressRange {
        let candidate = Candidate {
            start,
            end: start + 9,
            locality: Some(format!("loc{}", start)),
            provider: None,
        };
        validate(candidate, &Placeholders::default()).unwrap()
    }

    #[test]
    fn test_batch_sizes() {
        for (total, size) in [(0, 3), (1, 3), (3, 3), (7, 3), (10, 1), (1000, 1000), (2500, 1000)] {
            let mut emitter = BatchEmitter::new(Recorder::new(), size);
            for i in 0..total {
                emitter.push(range(i + 1)).unwrap();
            }
            let (recorder, stats) = emitter.finish().unwrap();

            let sizes: Vec<usize> = recorder.batches.iter().map(Vec::len).collect();
            assert_eq!(sizes.iter().sum::<usize>(), total as usize);
            assert_eq!(stats.rows, u64::from(total));
            assert_eq!(stats.batches, sizes.len() as u64);
            if let Some((last, full)) = sizes.split_last() {
                assert!(full.iter().all(|&n| n == size));
                assert!(1 <= *last && *last <= size);
            }
            let order: Vec<u32> = recorder.ranges().map(|r| r.start).collect();
            assert_eq!(order, (1..=total).collect::<Vec<u32>>());
        }
    }

    #[test]
    fn test_pending() {
        let mut emitter = BatchEmitter::new(Recorder::new(), 3);
        emitter.push(range(1)).unwrap();
        emitter.push(range(11)).unwrap();
        assert_eq!(emitter.pending(), 2);
        assert_eq!(emitter.stats(), BatchStats::default());
        assert!(emitter.sink().batches.is_empty());

        emitter.push(range(21)).unwrap();
        assert_eq!(emitter.pending(), 0);
        assert_eq!(emitter.stats().batches, 1);
        assert_eq!(emitter.sink().batches[0].len(), 3);

        emitter.push(range(31)).unwrap();
        emitter.flush().unwrap();
        assert_eq!(emitter.pending(), 0);
        assert_eq!(emitter.stats().rows, 4);
    }

    struct Flaky {
        calls: usize,
        written: Vec<usize>,
    }

    impl Sink for Flaky {
        fn write_batch(&mut self, batch: &[AddressRange]) -> Result<()> {
            self.calls += 1;
            if self.calls == 2 {
                return Err(Error::Store(rusqlite::Error::QueryReturnedNoRows));
            }
            self.written.push(batch.len());
            Ok(())
        }
    }

    #[test]
    fn test_batch_failure_continues() {
        let mut emitter = BatchEmitter::new(Flaky { calls: 0, written: Vec::new() }, 2);
        for i in 0..5 {
            emitter.push(range(i + 1)).unwrap();
        }
        let (sink, stats) = emitter.finish().unwrap();
        assert_eq!(sink.written, vec![2, 1]);
        assert_eq!(stats, BatchStats { batches: 2, rows: 3, failed_batches: 1, lost_rows: 2 });
    }

    #[test]
    fn test_sql_script() {
        let script = SqlScript::new(Vec::new(), "test", "aq3stat", "ip_data", false).unwrap();
        let mut emitter = BatchEmitter::new(script, 2);
        for i in 0..3 {
            emitter.push(range(i * 10 + 1)).unwrap();
        }
        let (script, _) = emitter.finish().unwrap();
        let text = String::from_utf8(script.finish(3, 0).unwrap()).unwrap();

        assert!(text.contains("USE aq3stat;\n"));
        assert!(text.contains("-- TRUNCATE TABLE ip_data;\n"));
        assert_eq!(text.matches("INSERT INTO ip_data (start_ip, end_ip, address1, address2) VALUES\n").count(), 2);
        assert!(text.contains("VALUES\n(1, 10, 'loc1', 'unknown provider'),\n(11, 20, 'loc11', 'unknown provider');\n"));
        assert!(text.contains("VALUES\n(21, 30, 'loc21', 'unknown provider');\n"));
        assert!(text.ends_with("-- 3 records imported\n-- 0 records failed\n"));
    }

    #[test]
    fn test_sql_script_empty() {
        let script = SqlScript::new(Vec::new(), "test", "aq3stat", "ip_data", true).unwrap();
        let (script, stats) = BatchEmitter::new(script, 1000).finish().unwrap();
        assert_eq!(stats.batches, 0);
        let text = String::from_utf8(script.finish(0, 0).unwrap()).unwrap();
        assert!(!text.contains("INSERT"));
        assert!(text.contains("\nTRUNCATE TABLE ip_data;\n"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("北京市"), "'北京市'");
        assert_eq!(quote("O'Brien"), "'O''Brien'");
        assert_eq!(quote(r"a\b"), r"'a\\b'");
        assert_eq!(quote(""), "''");
    }
}
