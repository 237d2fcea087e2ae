use bitflags::bitflags;

bitflags! {
    /// Set of text parts a source carries, or a run keeps.
    ///
    /// # Example
    ///
    /// ```
    /// use ipdata::Parts;
    ///
    /// assert_eq!(Parts::IP2LOCATION, Parts::COUNTRY | Parts::REGION | Parts::CITY);
    /// ```
    pub struct Parts: u32 {
        const COUNTRY  = 1 << 0;
        const REGION   = 1 << 1;
        const PROVINCE = 1 << 2;
        const CITY     = 1 << 3;
        /// Locality text that the source already composed.
        const ADDRESS  = 1 << 4;
        /// Network operator, becomes the provider field.
        const ISP      = 1 << 5;

        /// Everything that may end up in the locality field.
        const LOCALITY = Parts::COUNTRY.bits | Parts::REGION.bits | Parts::PROVINCE.bits
            | Parts::CITY.bits | Parts::ADDRESS.bits;

        /// Alias for parts of ip2region dumps: country, region, province, city, isp.
        const IP2REGION = Parts::COUNTRY.bits | Parts::REGION.bits | Parts::PROVINCE.bits
            | Parts::CITY.bits | Parts::ISP.bits;
        /// Alias for parts of the custom CSV layout.
        const CUSTOM = Parts::ADDRESS.bits | Parts::ISP.bits;
        /// Alias for parts of the network CSV layout.
        const NETWORK = Parts::COUNTRY.bits | Parts::REGION.bits | Parts::ISP.bits;
        /// Alias for parts of GeoIP2 block files.
        const GEOIP2 = Parts::COUNTRY.bits | Parts::CITY.bits;
        /// Alias for parts of IP2Location CSV files.
        const IP2LOCATION = Parts::COUNTRY.bits | Parts::REGION.bits | Parts::CITY.bits;
    }
}

/// Order in which locality parts are joined.
pub(crate) const LOCALITY_ORDER: [Parts; 5] = [
    Parts::COUNTRY,
    Parts::REGION,
    Parts::PROVINCE,
    Parts::CITY,
    Parts::ADDRESS,
];

/// Where a row keeps its address bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bounds {
    /// Two dotted quads in separate columns.
    Pair { start: usize, end: usize },
    /// Two columns holding either dotted quads or decimal integers.
    Numeric { start: usize, end: usize },
    /// One CIDR network (or single host) column.
    Network(usize),
}

/// What to do with a row that has fewer columns than required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortRows {
    Skip,
    Reject,
}

/// Column layout of one input format.
#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    bounds: Bounds,
    columns: Vec<(Parts, usize)>,
    required: usize,
    short_rows: ShortRows,
    unknown: Option<&'static str>,
    selected: Parts,
}

impl Schema {
    /// `start|end|country|region|province|city|isp`, `0` marking unknown parts.
    pub fn ip2region() -> Schema {
        Schema {
            name: "ip2region",
            bounds: Bounds::Pair { start: 0, end: 1 },
            columns: vec![
                (Parts::COUNTRY, 2),
                (Parts::REGION, 3),
                (Parts::PROVINCE, 4),
                (Parts::CITY, 5),
                (Parts::ISP, 6),
            ],
            required: 7,
            short_rows: ShortRows::Reject,
            unknown: Some("0"),
            selected: Parts::all(),
        }
    }

    /// `start,end,address1,address2`.
    pub fn custom() -> Schema {
        Schema {
            name: "custom",
            bounds: Bounds::Pair { start: 0, end: 1 },
            columns: vec![(Parts::ADDRESS, 2), (Parts::ISP, 3)],
            required: 2,
            short_rows: ShortRows::Skip,
            unknown: None,
            selected: Parts::all(),
        }
    }

    /// `network,country,region,isp`.
    pub fn network() -> Schema {
        Schema {
            name: "network",
            bounds: Bounds::Network(0),
            columns: vec![(Parts::COUNTRY, 1), (Parts::REGION, 2), (Parts::ISP, 3)],
            required: 2,
            short_rows: ShortRows::Skip,
            unknown: None,
            selected: Parts::all(),
        }
    }

    /// GeoIP2 blocks: network in the first column, then country and city.
    pub fn geoip2() -> Schema {
        Schema {
            name: "geoip2",
            bounds: Bounds::Network(0),
            columns: vec![(Parts::COUNTRY, 1), (Parts::CITY, 2)],
            required: 1,
            short_rows: ShortRows::Reject,
            unknown: None,
            selected: Parts::all(),
        }
    }

    /// IP2Location: start, end, country code, country, region, city, ...
    /// Bounds may be decimal integers and `-` marks unknown parts.
    pub fn ip2location() -> Schema {
        Schema {
            name: "ip2location",
            bounds: Bounds::Numeric { start: 0, end: 1 },
            columns: vec![(Parts::COUNTRY, 3), (Parts::REGION, 4), (Parts::CITY, 5)],
            required: 2,
            short_rows: ShortRows::Reject,
            unknown: Some("-"),
            selected: Parts::all(),
        }
    }

    /// Restricts the parts a run keeps. Unselected parts are treated as
    /// absent.
    pub fn select(mut self, parts: Parts) -> Schema {
        self.selected = parts;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn short_rows(&self) -> ShortRows {
        self.short_rows
    }

    pub fn unknown(&self) -> Option<&'static str> {
        self.unknown
    }

    /// Parts this schema can produce.
    pub fn parts(&self) -> Parts {
        self.columns.iter().fold(Parts::empty(), |acc, &(part, _)| acc | part)
    }

    /// Parts this schema produces after selection.
    pub fn selected(&self) -> Parts {
        self.parts() & self.selected
    }

    /// Column of `part`, if the schema carries it and it is selected.
    pub fn column(&self, part: Parts) -> Option<usize> {
        if !self.selected.contains(part) {
            return None;
        }
        self.columns.iter().find(|&&(p, _)| p == part).map(|&(_, column)| column)
    }
}
