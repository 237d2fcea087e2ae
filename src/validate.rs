//! Range validation and placeholder normalization.

use thiserror::Error;

use crate::codec;
use crate::config::Placeholders;
use crate::AddressRange;

/// A range as produced by an adapter, before any invariant is checked.
///
/// `None` in a text field means the source marked the value as unknown or
/// did not carry it at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub start: u32,
    pub end: u32,
    pub locality: Option<String>,
    pub provider: Option<String>,
}

/// Reason a candidate was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("address conversion failed ({} - {})", quad(.start), quad(.end))]
    ZeroBound { start: u32, end: u32 },
    #[error("inverted range ({} > {})", quad(.start), quad(.end))]
    Inverted { start: u32, end: u32 },
}

/// Checks the range invariants and fills unknown text fields.
///
/// # Example
///
/// ```
/// use ipdata::config::Placeholders;
/// use ipdata::validate::{validate, Candidate, Rejection};
///
/// let placeholders = Placeholders::default();
/// let candidate = Candidate { start: 20, end: 10, locality: None, provider: None };
/// assert_eq!(validate(candidate, &placeholders), Err(Rejection::Inverted { start: 20, end: 10 }));
/// ```
pub fn validate(candidate: Candidate, placeholders: &Placeholders) -> Result<AddressRange, Rejection> {
    let Candidate { start, end, locality, provider } = candidate;

    if start == 0 || end == 0 {
        return Err(Rejection::ZeroBound { start, end });
    }
    if start > end {
        return Err(Rejection::Inverted { start, end });
    }

    Ok(AddressRange {
        start,
        end,
        locality: or_placeholder(locality, &placeholders.locality),
        provider: or_placeholder(provider, &placeholders.provider),
        _priv: (),
    })
}

fn quad(addr: &u32) -> String {
    codec::format(*addr)
}

fn or_placeholder(value: Option<String>, placeholder: &str) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => value,
        _ => placeholder.to_owned(),
    }
}
