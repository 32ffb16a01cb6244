//! Access rules and the single-line rule parser.
//!
//! Grammar, checked in order on a trimmed line with comments removed:
//!
//! | Syntax                          | Rule                          |
//! |---------------------------------|-------------------------------|
//! | `!<rule>`                       | negated rule                  |
//! | `*`                             | wildcard                      |
//! | `ipcat <glob>`                  | IP category glob              |
//! | `@ <lat>, <lng> (<r><unit>)`    | geofence                      |
//! | `~<regex>`                      | reverse-DNS regular expression|
//! | `10.0.0.0/8`                    | network                       |
//! | `10.1.2.3`                      | address                       |
//! | anything else                   | hostname                      |
//!
//! Malformed lines never fail the whole list. They become comment rules
//! carrying an `Error: ...` message and never match.

use super::geofence::Geofence;
use ipnet::IpNet;
use regex::{Regex, RegexBuilder};
use std::fmt;
use ipnet::Ipv4Net;
use std::net::IpAddr;
use std::sync::LazyLock;

/// Radius used when a geofence line omits one, in the line's unit.
pub const DEFAULT_GEOFENCE_RADIUS: f64 = 25.0;

static GEOFENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([-+]?[0-9]*\.?[0-9]+)[^-+0-9]+([-+]?[0-9]*\.?[0-9]+)(?:[^0-9]+([0-9]*\.?[0-9]+)([A-Za-z]*)[^0-9]*)?$",
    )
    .expect("geofence pattern is valid")
});

/// IPv4-mapped IPv6 addresses are the same address as their IPv4 form.
#[must_use]
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}

/// `::ffff:a.b.c.d/(96 + n)` is the IPv4 network `a.b.c.d/n`.
#[must_use]
pub fn canonical_network(net: IpNet) -> IpNet {
    let IpNet::V6(v6) = net else {
        return net;
    };
    if v6.prefix_len() < 96 {
        return net;
    }
    v6.network()
        .to_ipv4_mapped()
        .and_then(|addr| Ipv4Net::new(addr, v6.prefix_len() - 96).ok())
        .map_or(net, IpNet::V4)
}

/// Meters per radial unit.
fn unit_factor(unit: &str) -> Option<f64> {
    match unit {
        "" | "m" => Some(1.0),
        "km" => Some(1000.0),
        "mi" => Some(1609.0),
        "ft" => Some(1609.0 / 5280.0),
        _ => None,
    }
}

/// A category glob, kept with its compiled matcher.
#[derive(Debug, Clone)]
pub struct CategoryGlob {
    glob: String,
    matcher: Regex,
}

impl CategoryGlob {
    /// Compile a glob where `*` matches any run of characters.
    pub fn new(glob: &str) -> Result<Self, regex::Error> {
        let body = regex::escape(&glob.to_lowercase()).replace(r"\*", ".*");
        let matcher = RegexBuilder::new(&format!("^{body}$"))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            glob: glob.to_string(),
            matcher,
        })
    }

    /// The glob as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Check a category label against the glob.
    #[must_use]
    pub fn matches(&self, label: &str) -> bool {
        self.matcher.is_match(label)
    }
}

/// What a rule matches against.
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Every requester.
    Wildcard,
    /// A CIDR range.
    Network(IpNet),
    /// A single address.
    Address(IpAddr),
    /// A lower-cased DNS name checked by forward and reverse lookup.
    Hostname(String),
    /// A regular expression over reverse-DNS names.
    Pattern(Regex),
    /// A circular region.
    Geofence(Geofence),
    /// A glob over third-party IP category labels.
    Category(CategoryGlob),
    /// No matching semantics.
    Comment,
}

impl RuleKind {
    /// Label appended to rendered rules.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Wildcard => "Wildcard",
            Self::Network(_) => "Network",
            Self::Address(_) => "IP Address",
            Self::Hostname(_) => "Hostname",
            Self::Pattern(_) => "Regular Expression",
            Self::Geofence(_) => "Geofence",
            Self::Category(_) => "IP Category",
            Self::Comment => "Comment",
        }
    }
}

/// One entry of an access policy.
#[derive(Debug, Clone)]
pub struct Rule {
    /// What the rule matches.
    pub kind: RuleKind,
    /// A match allows instead of denies.
    pub negated: bool,
    /// Free text attached to the rule.
    pub comment: Option<String>,
}

impl Rule {
    /// Create a non-negated rule.
    #[must_use]
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            negated: false,
            comment: None,
        }
    }

    /// Create a comment-only rule.
    #[must_use]
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Comment,
            negated: false,
            comment: Some(text.into()),
        }
    }

    /// Create an address rule.
    #[must_use]
    pub fn address(ip: IpAddr) -> Self {
        Self::new(RuleKind::Address(canonical_ip(ip)))
    }

    /// Create a geofence rule.
    #[must_use]
    pub fn geofence(fence: Geofence) -> Self {
        Self::new(RuleKind::Geofence(fence))
    }

    /// Set the negation flag.
    #[must_use]
    pub fn negate(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    /// Attach a comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether the rule can match at all.
    #[must_use]
    pub fn is_matchable(&self) -> bool {
        !matches!(self.kind, RuleKind::Comment)
    }

    /// Parse a single line of rule text.
    ///
    /// The line must already have comments removed and be trimmed.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut line = line.trim();
        let mut negated = false;

        if let Some(rest) = line.strip_prefix('!') {
            negated = true;
            line = rest.trim();
        }

        let rule = if line.is_empty() {
            Err("Error: !: missing rule after negation".to_string())
        } else if line == "*" {
            Ok(RuleKind::Wildcard)
        } else if let Some(glob) = line.strip_prefix("ipcat ") {
            parse_category(glob.trim())
        } else if let Some(rest) = line.strip_prefix('@') {
            parse_geofence(rest.trim()).map(RuleKind::Geofence)
        } else if let Some(rest) = line.strip_prefix('~') {
            parse_pattern(rest.trim())
        } else if let Ok(net) = line.parse::<IpNet>() {
            Ok(RuleKind::Network(canonical_network(net.trunc())))
        } else if let Ok(ip) = line.parse::<IpAddr>() {
            Ok(RuleKind::Address(canonical_ip(ip)))
        } else {
            Ok(RuleKind::Hostname(line.to_lowercase()))
        };

        match rule {
            Ok(kind) => Self::new(kind).negate(negated),
            Err(message) => Self::comment(message).negate(negated),
        }
    }
}

fn parse_category(glob: &str) -> Result<RuleKind, String> {
    if glob.is_empty() {
        return Err("Error: ipcat: missing category pattern".to_string());
    }

    CategoryGlob::new(glob)
        .map(RuleKind::Category)
        .map_err(|e| format!("Error: {glob}: malformed category pattern: {e}"))
}

fn parse_pattern(text: &str) -> Result<RuleKind, String> {
    Regex::new(text)
        .map(RuleKind::Pattern)
        .map_err(|e| format!("Error: {text}: malformed regular expression: {e}"))
}

/// Parse `<lat> , <lng> (<radius><unit>)?` into a geofence in meters.
pub fn parse_geofence(text: &str) -> Result<Geofence, String> {
    let Some(captures) = GEOFENCE_PATTERN.captures(text) else {
        return Err(format!(
            "Error: {text}: invalid format: must be <lat>, <lng> (<radius><unit>)?"
        ));
    };

    let field = |i: usize| captures.get(i).map_or("", |m| m.as_str());

    let latitude: f64 = field(1)
        .parse()
        .map_err(|e| format!("Error: {text}: could not parse latitude: {e}"))?;
    let longitude: f64 = field(2)
        .parse()
        .map_err(|e| format!("Error: {text}: could not parse longitude: {e}"))?;

    let radius = match field(3) {
        "" => DEFAULT_GEOFENCE_RADIUS,
        value => value
            .parse::<f64>()
            .map_err(|e| format!("Error: {text}: could not parse radius: {e}"))?,
    };

    let unit = field(4).to_lowercase();
    let factor =
        unit_factor(&unit).ok_or_else(|| format!("Error: {text}: invalid radial units: {unit:?}"))?;

    Ok(Geofence::new(latitude, longitude, radius * factor))
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.kind {
            RuleKind::Comment => {
                let comment = self.comment.as_deref().unwrap_or_default();
                return write!(f, "# {}", single_line(comment));
            },
            RuleKind::Wildcard => "*".to_string(),
            RuleKind::Network(net) => net.to_string(),
            RuleKind::Address(ip) => ip.to_string(),
            RuleKind::Hostname(host) => host.clone(),
            RuleKind::Pattern(regex) => format!("~{}", regex.as_str()),
            RuleKind::Geofence(fence) => fence.to_string(),
            RuleKind::Category(glob) => format!("ipcat {}", glob.as_str()),
        };

        if self.negated {
            f.write_str("!")?;
        }
        write!(f, "{body} # {}", self.kind.tag())?;
        if let Some(comment) = &self.comment {
            write!(f, ": {}", single_line(comment))?;
        }
        Ok(())
    }
}

/// Rendered rules occupy one line each; regex errors span several.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
