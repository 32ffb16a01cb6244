//! IP category data in the ipcat CSV format.
//!
//! Each line is `start,end,name,url` where `start` and `end` are dotted
//! IPv4 addresses bounding an inclusive range. Only IPv4 is classified.

use super::CategoryClassifier;
use crate::modules::access_control::error::{
    AccessControlError, AccessControlResult, LookupError,
};
use async_trait::async_trait;
use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tracing::info;

/// A named, inclusive IPv4 range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInterval {
    /// First address.
    pub start: Ipv4Addr,
    /// Last address.
    pub end: Ipv4Addr,
    /// Category label.
    pub name: String,
    /// Reference URL.
    pub url: String,
}

/// Sorted interval set answering "which category holds this address".
#[derive(Debug, Clone, Default)]
pub struct CategorySet {
    intervals: Vec<CategoryInterval>,
}

impl CategorySet {
    /// Create a set from intervals in any order.
    #[must_use]
    pub fn new(mut intervals: Vec<CategoryInterval>) -> Self {
        intervals.sort_by_key(|interval| interval.start);
        Self { intervals }
    }

    /// Load a set from an ipcat CSV file.
    pub fn open(path: impl AsRef<Path>) -> AccessControlResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| AccessControlError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let set = Self::from_csv(std::io::BufReader::new(file))?;
        info!(path = %path.display(), intervals = set.len(), "Loaded ipcat data");
        Ok(set)
    }

    /// Parse ipcat CSV. Blank lines and `#` comments are skipped.
    pub fn from_csv(reader: impl BufRead) -> AccessControlResult<Self> {
        let mut intervals = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| AccessControlError::CategoryData {
                line: line_no,
                message: e.to_string(),
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            intervals.push(parse_line(line).map_err(|message| {
                AccessControlError::CategoryData {
                    line: line_no,
                    message,
                }
            })?);
        }

        Ok(Self::new(intervals))
    }

    /// Number of intervals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Find the interval containing `ip`.
    #[must_use]
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<&CategoryInterval> {
        let after = self.intervals.partition_point(|interval| interval.start <= ip);
        let candidate = self.intervals.get(after.checked_sub(1)?)?;
        (ip <= candidate.end).then_some(candidate)
    }
}

fn parse_line(line: &str) -> Result<CategoryInterval, String> {
    let mut fields = line.splitn(4, ',').map(str::trim);

    let start = parse_addr(fields.next(), "start")?;
    let end = parse_addr(fields.next(), "end")?;
    if end < start {
        return Err(format!("range end {end} precedes start {start}"));
    }

    let name = fields
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "missing category name".to_string())?
        .to_string();
    let url = fields.next().unwrap_or_default().to_string();

    Ok(CategoryInterval {
        start,
        end,
        name,
        url,
    })
}

fn parse_addr(field: Option<&str>, what: &str) -> Result<Ipv4Addr, String> {
    let field = field.ok_or_else(|| format!("missing {what} address"))?;
    field
        .parse()
        .map_err(|e| format!("invalid {what} address '{field}': {e}"))
}

#[async_trait]
impl CategoryClassifier for CategorySet {
    async fn classify(&self, ip: IpAddr) -> Result<Option<String>, LookupError> {
        let v4 = match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        };

        Ok(v4
            .and_then(|v4| self.lookup(v4))
            .map(|interval| interval.name.clone()))
    }
}
