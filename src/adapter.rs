//! Turns the fields of one input row into a [`Candidate`].

use thiserror::Error;

use crate::codec::{self, AddressError};
use crate::schema::{Bounds, Parts, Schema, ShortRows, LOCALITY_ORDER};
use crate::validate::Candidate;

/// Marker that starts a comment row.
pub const COMMENT: char = '#';

/// Result of adapting a row that is not malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adapted {
    Candidate(Candidate),
    Skip(Skip),
}

/// Rows that are passed over without counting as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Blank,
    Comment,
    ShortRow { found: usize, required: usize },
}

/// A malformed unit.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("expected at least {required} fields, found {found}")]
    ShortRow { found: usize, required: usize },
    #[error("input is not valid UTF-8")]
    Encoding,
    #[error("unreadable record: {0}")]
    Record(String),
}

/// Adapter configured by a [`Schema`].
#[derive(Debug, Clone)]
pub struct Adapter {
    schema: Schema,
}

impl Adapter {
    pub fn new(schema: Schema) -> Adapter {
        Adapter { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Maps one row of fields onto a candidate range.
    ///
    /// # Example
    ///
    /// ```
    /// use ipdata::adapter::{Adapted, Adapter};
    /// use ipdata::Schema;
    ///
    /// let adapter = Adapter::new(Schema::custom());
    /// match adapter.adapt(&["1.0.0.0", "1.0.0.255", "Brisbane"]).unwrap() {
    ///     Adapted::Candidate(candidate) => assert_eq!(candidate.start, 16777216),
    ///     Adapted::Skip(skip) => panic!("skipped: {:?}", skip),
    /// }
    /// ```
    pub fn adapt<S: AsRef<str>>(&self, fields: &[S]) -> Result<Adapted, AdaptError> {
        let first = fields.first().map(|f| f.as_ref().trim()).unwrap_or("");
        if first.starts_with(COMMENT) {
            return Ok(Adapted::Skip(Skip::Comment));
        }
        if fields.iter().all(|f| f.as_ref().trim().is_empty()) {
            return Ok(Adapted::Skip(Skip::Blank));
        }

        let required = self.schema.required();
        if fields.len() < required {
            let found = fields.len();
            return match self.schema.short_rows() {
                ShortRows::Skip => Ok(Adapted::Skip(Skip::ShortRow { found, required })),
                ShortRows::Reject => Err(AdaptError::ShortRow { found, required }),
            };
        }

        let (start, end) = match self.schema.bounds() {
            Bounds::Pair { start, end } => (
                codec::parse(field(fields, start).unwrap_or(""))?,
                codec::parse(field(fields, end).unwrap_or(""))?,
            ),
            Bounds::Numeric { start, end } => (
                codec::parse_numeric(field(fields, start).unwrap_or(""))?,
                codec::parse_numeric(field(fields, end).unwrap_or(""))?,
            ),
            Bounds::Network(column) => codec::network(field(fields, column).unwrap_or(""))?,
        };

        Ok(Adapted::Candidate(Candidate {
            start,
            end,
            locality: self.locality(fields),
            provider: self.part(fields, Parts::ISP).map(str::to_owned),
        }))
    }

    /// Joins the known locality parts in their fixed order.
    fn locality<S: AsRef<str>>(&self, fields: &[S]) -> Option<String> {
        let parts: Vec<&str> = LOCALITY_ORDER
            .iter()
            .filter_map(|&part| self.part(fields, part))
            .collect();

        match parts.is_empty() {
            true => None,
            false => Some(parts.join(" ")),
        }
    }

    /// Trimmed text of a part, or `None` if it is absent, empty or the
    /// unknown token.
    fn part<'a, S: AsRef<str>>(&self, fields: &'a [S], part: Parts) -> Option<&'a str> {
        let value = field(fields, self.schema.column(part)?)?;
        if value.is_empty() || Some(value) == self.schema.unknown() {
            None
        } else {
            Some(value)
        }
    }
}

fn field<S: AsRef<str>>(fields: &[S], column: usize) -> Option<&str> {
    fields.get(column).map(|f| f.as_ref().trim().trim_matches('"').trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(adapted: Adapted) -> Candidate {
        match adapted {
            Adapted::Candidate(candidate) => candidate,
            Adapted::Skip(skip) => panic!("unexpected skip: {:?}", skip),
        }
    }

    fn split(line: &str) -> Vec<&str> {
        line.split('|').collect()
    }

    #[test]
    fn test_ip2region() {
        let adapter = Adapter::new(Schema::ip2region());

        let c = candidate(adapter.adapt(&split("1.0.0.0|1.0.0.255|澳大利亚|0|0|0|0")).unwrap());
        assert_eq!((c.start, c.end), (16777216, 16777471));
        assert_eq!(c.locality.as_deref(), Some("澳大利亚"));
        assert_eq!(c.provider, None);

        let c = candidate(adapter.adapt(&split("1.0.1.0|1.0.3.255|中国|0|福建省|福州市|电信")).unwrap());
        assert_eq!((c.start, c.end), (16777472, 16778239));
        assert_eq!(c.locality.as_deref(), Some("中国 福建省 福州市"));
        assert_eq!(c.provider.as_deref(), Some("电信"));

        let c = candidate(adapter.adapt(&split("0.0.0.0|0.255.255.255|0|0|0|内网IP|内网IP")).unwrap());
        assert_eq!((c.start, c.end), (0, 16777215));
        assert_eq!(c.locality.as_deref(), Some("内网IP"));
    }

    #[test]
    fn test_ip2region_malformed() {
        let adapter = Adapter::new(Schema::ip2region());
        assert!(matches!(
            adapter.adapt(&split("1.0.0.0|1.0.0.255|澳大利亚")),
            Err(AdaptError::ShortRow { found: 3, required: 7 })
        ));
        assert!(matches!(
            adapter.adapt(&split("1.0.0|1.0.0.255|澳大利亚|0|0|0|0")),
            Err(AdaptError::Address(AddressError::Invalid(_)))
        ));
    }

    #[test]
    fn test_skips() {
        let adapter = Adapter::new(Schema::ip2region());
        assert_eq!(adapter.adapt(&[""]).unwrap(), Adapted::Skip(Skip::Blank));
        assert_eq!(adapter.adapt::<&str>(&[]).unwrap(), Adapted::Skip(Skip::Blank));
        assert_eq!(adapter.adapt(&["  ", ""]).unwrap(), Adapted::Skip(Skip::Blank));
        assert_eq!(adapter.adapt(&split("# start|end|country")).unwrap(), Adapted::Skip(Skip::Comment));

        let custom = Adapter::new(Schema::custom());
        assert_eq!(
            custom.adapt(&["1.0.0.0"]).unwrap(),
            Adapted::Skip(Skip::ShortRow { found: 1, required: 2 })
        );
    }

    #[test]
    fn test_custom() {
        let adapter = Adapter::new(Schema::custom());
        let c = candidate(adapter.adapt(&["192.168.1.1", " 192.168.1.255 ", "北京市", "联通"]).unwrap());
        assert_eq!((c.start, c.end), (3232235777, 3232236031));
        assert_eq!(c.locality.as_deref(), Some("北京市"));
        assert_eq!(c.provider.as_deref(), Some("联通"));

        let c = candidate(adapter.adapt(&["1.0.0.0", "1.0.0.255"]).unwrap());
        assert_eq!(c.locality, None);
        assert_eq!(c.provider, None);

        // No unknown token for CSV sources.
        let c = candidate(adapter.adapt(&["1.0.0.0", "1.0.0.255", "0"]).unwrap());
        assert_eq!(c.locality.as_deref(), Some("0"));
    }

    #[test]
    fn test_network() {
        let adapter = Adapter::new(Schema::network());
        let c = candidate(adapter.adapt(&["192.168.1.0/24", "中国", "", "电信"]).unwrap());
        assert_eq!((c.start, c.end), (3232235776, 3232236031));
        assert_eq!(c.locality.as_deref(), Some("中国"));
        assert_eq!(c.provider.as_deref(), Some("电信"));

        assert!(matches!(
            adapter.adapt(&["192.168.1.0/40", "中国"]),
            Err(AdaptError::Address(AddressError::Prefix(_)))
        ));
    }

    #[test]
    fn test_named_schemas() {
        let geoip2 = Adapter::new(Schema::geoip2());
        let c = candidate(geoip2.adapt(&["1.0.0.0/24", "2077456", "2077456", "", "0", "0"]).unwrap());
        assert_eq!((c.start, c.end), (16777216, 16777471));
        assert_eq!(c.locality.as_deref(), Some("2077456 2077456"));
        assert_eq!(c.provider, None);

        let ip2location = Adapter::new(Schema::ip2location());
        let row = ["\"1.0.0.0\"", "\"1.0.0.255\"", "\"AU\"", "\"Australia\"", "\"Queensland\"", "\"Brisbane\""];
        let c = candidate(ip2location.adapt(&row).unwrap());
        assert_eq!((c.start, c.end), (16777216, 16777471));
        assert_eq!(c.locality.as_deref(), Some("Australia Queensland Brisbane"));

        // Exports usually carry the bounds as integers.
        let row = ["\"16777216\"", "\"16777471\"", "\"AU\"", "\"Australia\"", "\"Queensland\"", "\"Brisbane\""];
        let c = candidate(ip2location.adapt(&row).unwrap());
        assert_eq!((c.start, c.end), (16777216, 16777471));
        assert_eq!(c.locality.as_deref(), Some("Australia Queensland Brisbane"));
        assert!(matches!(
            ip2location.adapt(&["16777216", "4294967296", "AU"]),
            Err(AdaptError::Address(AddressError::Invalid(_)))
        ));
        // Other pair schemas stay strict.
        assert!(Adapter::new(Schema::custom()).adapt(&["16777216", "16777471"]).is_err());

        assert!(matches!(
            ip2location.adapt(&["1.0.0.0"]),
            Err(AdaptError::ShortRow { found: 1, required: 2 })
        ));
    }

    #[test]
    fn test_selected_parts() {
        let adapter = Adapter::new(Schema::ip2region().select(Parts::COUNTRY | Parts::CITY));
        let c = candidate(adapter.adapt(&split("1.0.8.0|1.0.15.255|中国|华南|广东省|广州市|电信")).unwrap());
        assert_eq!(c.locality.as_deref(), Some("中国 广州市"));
        assert_eq!(c.provider, None);
    }
}
