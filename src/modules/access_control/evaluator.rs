//! Rule evaluation.
//!
//! Every rule is considered in order and the last matching rule decides:
//! a plain match denies, a negated match allows. With no match the request
//! is allowed. Rules that need geolocation or category data deny the whole
//! request when that data is missing or failing.

use super::error::LookupError;
use super::geofence::Geofence;
use super::lookup::LookupContext;
use super::rule::{canonical_ip, Rule, RuleKind};
use super::ruleset::RuleSet;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Outcome of evaluating a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No rule denied, or a negated rule matched last.
    Allow {
        /// Index of the last matching rule, if any.
        rule_index: Option<usize>,
    },
    /// A plain rule matched last.
    Deny {
        /// Index of that rule.
        rule_index: usize,
    },
    /// A required data source was missing or failed.
    FailClosed {
        /// Index of the rule that needed the source.
        rule_index: usize,
        /// What went wrong.
        reason: LookupError,
    },
}

impl Decision {
    /// Whether the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Per-request lookup results.
#[derive(Debug, Default)]
struct RequestMemo {
    location: Option<Geofence>,
    category: Option<Option<String>>,
    reverse_names: Option<Vec<String>>,
}

/// Evaluates rule sets for one requester.
#[derive(Debug)]
pub struct Evaluator<'a> {
    ctx: &'a LookupContext,
    ip: IpAddr,
    memo: RequestMemo,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator for `ip`. IPv4-mapped addresses are evaluated
    /// as IPv4.
    #[must_use]
    pub fn new(ctx: &'a LookupContext, ip: IpAddr) -> Self {
        Self {
            ctx,
            ip: canonical_ip(ip),
            memo: RequestMemo::default(),
        }
    }

    /// Whether `rules` allow the requester.
    pub async fn evaluate(&mut self, rules: &RuleSet) -> bool {
        self.evaluate_detailed(rules).await.is_allowed()
    }

    /// Evaluate `rules` and report which rule decided.
    pub async fn evaluate_detailed(&mut self, rules: &RuleSet) -> Decision {
        let mut decision = Decision::Allow { rule_index: None };

        for (index, rule) in rules.iter().enumerate() {
            let matched = match self.matches(rule).await {
                Ok(matched) => matched,
                Err(reason) => {
                    if reason.is_not_available() {
                        warn!(ip = %self.ip, rule = index, "Denying access by {} rule: {reason}", rule.kind.tag());
                    } else {
                        warn!(ip = %self.ip, rule = index, "Denying access by {} rule error: {reason}", rule.kind.tag());
                    }
                    return Decision::FailClosed {
                        rule_index: index,
                        reason,
                    };
                },
            };

            if matched {
                debug!(ip = %self.ip, rule = index, negated = rule.negated, "Rule matched");
                decision = if rule.negated {
                    Decision::Allow {
                        rule_index: Some(index),
                    }
                } else {
                    Decision::Deny { rule_index: index }
                };
            }
        }

        decision
    }

    /// Whether `rule` matches. Errors mean the request must be denied.
    async fn matches(&mut self, rule: &Rule) -> Result<bool, LookupError> {
        let ip = self.ip;

        let matched = match &rule.kind {
            RuleKind::Wildcard => true,
            RuleKind::Network(net) => net.contains(&ip),
            RuleKind::Address(addr) => *addr == ip,
            RuleKind::Hostname(host) => self.matches_hostname(host).await,
            RuleKind::Pattern(regex) => self
                .reverse_names()
                .await
                .iter()
                .any(|name| regex.is_match(name)),
            RuleKind::Geofence(bounds) => {
                let user = self.location().await?;
                let intersection = bounds.intersection(&user);
                if rule.negated {
                    // Allow only when the user is entirely inside the bounds.
                    intersection.superset
                } else {
                    !intersection.disjoint
                }
            },
            RuleKind::Category(glob) => match self.category().await? {
                Some(label) => glob.matches(&label),
                None => false,
            },
            RuleKind::Comment => false,
        };

        Ok(matched)
    }

    async fn matches_hostname(&mut self, host: &str) -> bool {
        match self.ctx.forward(host).await {
            Ok(addrs) if addrs.contains(&self.ip) => return true,
            Ok(_) => {},
            Err(e) => debug!(host, "Forward lookup failed: {e}"),
        }

        self.reverse_names().await.iter().any(|name| name == host)
    }

    async fn reverse_names(&mut self) -> &[String] {
        if self.memo.reverse_names.is_none() {
            let names = match self.ctx.reverse(self.ip).await {
                Ok(names) => names.into_iter().map(|name| name.to_lowercase()).collect(),
                Err(e) => {
                    debug!(ip = %self.ip, "Reverse lookup failed: {e}");
                    Vec::new()
                },
            };
            self.memo.reverse_names = Some(names);
        }

        self.memo.reverse_names.as_deref().unwrap_or_default()
    }

    async fn location(&mut self) -> Result<Geofence, LookupError> {
        if let Some(location) = self.memo.location {
            return Ok(location);
        }

        let location = self.ctx.resolve_geo(self.ip).await?;
        self.memo.location = Some(location);
        Ok(location)
    }

    async fn category(&mut self) -> Result<Option<String>, LookupError> {
        if let Some(category) = &self.memo.category {
            return Ok(category.clone());
        }

        let category = self.ctx.classify(self.ip).await?;
        self.memo.category = Some(category.clone());
        Ok(category)
    }
}

/// Evaluate `rules` for `ip` with fresh per-request state.
pub async fn evaluate(rules: &RuleSet, ctx: &LookupContext, ip: IpAddr) -> bool {
    Evaluator::new(ctx, ip).evaluate(rules).await
}
