//! Conversion between dotted-quad IPv4 text and `u32`.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Failure to interpret address text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid IPv4 address: '{0}'")]
    Invalid(String),
    #[error("invalid prefix length in network '{0}'")]
    Prefix(String),
    #[error("network '{0}' extends past 255.255.255.255")]
    Overflow(String),
}

/// Parses a dotted quad such as `1.0.1.0` into its big-endian integer
/// value. Surrounding whitespace is ignored.
///
/// # Example
///
/// ```
/// assert_eq!(ipdata::codec::parse("1.0.1.0"), Ok(16777472));
/// assert!(ipdata::codec::parse("1.0.1").is_err());
/// ```
pub fn parse(text: &str) -> Result<u32, AddressError> {
    text.trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| AddressError::Invalid(text.to_owned()))
}

/// Parses an address written either as a dotted quad or as its plain
/// decimal value, as in IP2Location exports.
///
/// # Example
///
/// ```
/// assert_eq!(ipdata::codec::parse_numeric("16777472"), Ok(16777472));
/// assert_eq!(ipdata::codec::parse_numeric("1.0.1.0"), Ok(16777472));
/// assert!(ipdata::codec::parse_numeric("4294967296").is_err());
/// ```
pub fn parse_numeric(text: &str) -> Result<u32, AddressError> {
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse().map_err(|_| AddressError::Invalid(text.to_owned()));
    }
    parse(text)
}

/// Renders an integer as a dotted quad. Inverse of [`parse`].
pub fn format(addr: u32) -> String {
    Ipv4Addr::from(addr).to_string()
}

/// Derives the inclusive range covered by `<quad>/<prefix>`.
///
/// Host bits are not masked off: the range starts at the given address.
/// Text without a slash denotes a single host.
///
/// # Example
///
/// ```
/// assert_eq!(ipdata::codec::network("192.168.1.0/24"), Ok((3232235776, 3232236031)));
/// ```
pub fn network(text: &str) -> Result<(u32, u32), AddressError> {
    let (addr, prefix) = match text.trim().split_once('/') {
        Some((addr, prefix)) => (addr, prefix),
        None => {
            let addr = parse(text)?;
            return Ok((addr, addr));
        }
    };

    let start = parse(addr)?;
    let prefix: u32 = match prefix.trim().parse() {
        Ok(prefix) if prefix <= 32 => prefix,
        _ => return Err(AddressError::Prefix(text.to_owned())),
    };

    let end = u64::from(start) + (1u64 << (32 - prefix)) - 1;
    u32::try_from(end)
        .map(|end| (start, end))
        .map_err(|_| AddressError::Overflow(text.to_owned()))
}
