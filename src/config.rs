//! Run settings shared by all sources and sinks.

use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DATABASE: &str = "aq3stat";
pub const DEFAULT_TABLE: &str = "ip_data";

/// Texts substituted for unknown locality and provider values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub locality: String,
    pub provider: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Placeholders {
            locality: "unknown region".to_owned(),
            provider: "unknown provider".to_owned(),
        }
    }
}

/// Whether the first CSV row names the columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderPolicy {
    /// Skip the first row if its first field looks like a column name.
    #[default]
    Auto,
    Present,
    Absent,
}

impl HeaderPolicy {
    pub(crate) fn is_header<S: AsRef<str>>(self, first_row: &[S]) -> bool {
        match self {
            HeaderPolicy::Present => true,
            HeaderPolicy::Absent => false,
            HeaderPolicy::Auto => first_row.first().map_or(false, |field| {
                let field = field.as_ref().trim().to_lowercase();
                ["ip", "start", "network"].iter().any(|prefix| field.starts_with(prefix))
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub batch_size: usize,
    /// Database selected with `USE` in generated scripts.
    pub database: String,
    pub table: String,
    pub placeholders: Placeholders,
    pub header: HeaderPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            batch_size: DEFAULT_BATCH_SIZE,
            database: DEFAULT_DATABASE.to_owned(),
            table: DEFAULT_TABLE.to_owned(),
            placeholders: Placeholders::default(),
            header: HeaderPolicy::default(),
        }
    }
}

impl Settings {
    /// Rejects settings that would produce broken output. Names end up
    /// verbatim in SQL text, so only plain identifiers are allowed.
    pub fn validate(self) -> Result<Self> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }
        for (what, name) in [("database", &self.database), ("table", &self.table)] {
            if !is_identifier(name) {
                return Err(Error::Config(format!("invalid {} name: '{}'", what, name)));
            }
        }
        if self.placeholders.locality.trim().is_empty() || self.placeholders.provider.trim().is_empty() {
            return Err(Error::Config("placeholders must not be empty".into()));
        }
        Ok(self)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}
