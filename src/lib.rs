//! Convert IP geolocation datasets into normalized address range tables.
//!
//! Every source (ip2region dumps, CSV files, the legacy QQWry database)
//! yields [`Unit`]s. Each unit is validated into an [`AddressRange`] and
//! flushed in batches to a [`Sink`]: an SQL script, an SQLite database or
//! memory.
//!
//! # Example
//!
//! ```
//! use ipdata::{convert, Adapter, BatchEmitter, Placeholders, Recorder, Schema, TextSource};
//!
//! let input = "1.0.1.0|1.0.3.255|中国|0|福建省|福州市|电信\n";
//! let source = TextSource::new(input.as_bytes(), '|', Adapter::new(Schema::ip2region()));
//! let emitter = BatchEmitter::new(Recorder::new(), 1000);
//! let (recorder, summary) = convert(source, emitter, &Placeholders::default()).unwrap();
//!
//! assert_eq!(summary.valid, 1);
//! let range = recorder.ranges().next().unwrap();
//! assert_eq!((range.start, range.end), (16777472, 16778239));
//! assert_eq!(range.locality, "中国 福建省 福州市");
//! ```

// TODO:
// - Fuzzing the QQWry reader

#![forbid(unsafe_code)]

use std::net::Ipv4Addr;

pub mod adapter;
pub mod codec;
pub mod config;
pub mod convert;
pub mod emit;
mod error;
pub mod qqwry;
mod schema;
pub mod source;
pub mod store;
pub mod validate;

pub use adapter::Adapter;
pub use config::{HeaderPolicy, Placeholders, Settings};
pub use convert::{convert, Summary};
pub use emit::{BatchEmitter, BatchStats, Recorder, Sink, SqlScript};
pub use error::{Error, Result};
pub use schema::{Bounds, Parts, Schema, ShortRows};
pub use source::{CsvSource, TextSource, Unit};
pub use store::SqliteStore;

/// A validated range of IPv4 addresses with its two descriptions.
///
/// Only [`validate::validate`] creates values of this type, so
/// `0 < start <= end` always holds and neither text is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AddressRange {
    /// First address, inclusive.
    pub start: u32,
    /// Last address, inclusive.
    pub end: u32,
    /// Country, region, province and city, known parts only. Stored as
    /// `address1`.
    pub locality: String,
    /// Network operator. Stored as `address2`.
    pub provider: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    _priv: (),
}

impl AddressRange {
    pub fn first(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.start)
    }

    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.end)
    }

    /// Number of addresses covered.
    pub fn len(&self) -> u64 {
        u64::from(self.end) - u64::from(self.start) + 1
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.start <= addr && addr <= self.end
    }
}
