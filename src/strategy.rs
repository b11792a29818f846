//! Strategy selection for intercepted requests.
//!
//! A `Selector` holds an ordered list of compiled rules. Each rule pairs a
//! URL pattern with a serving strategy and a max-age; the first rule whose
//! pattern matches either the URL path or the full URL wins. Requests that
//! match no rule fall back to network-first with a one-day max-age.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Max-age applied when no rule matches (one day).
const DEFAULT_MAX_AGE_MS: u64 = 86_400_000;

/// Rule name reported for the fallback decision.
const DEFAULT_RULE_NAME: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Serve from cache when fresh; fall back to the network, and prefer a
    /// stale entry over a failed fetch.
    CacheFirst,
    /// Fetch first; fall back to a non-expired cache entry on failure.
    NetworkFirst,
    /// Serve whatever is cached and refresh it in the background.
    StaleWhileRevalidate,
}

/// Serializable form of a strategy rule, as it appears in the worker
/// configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub pattern: String,
    pub strategy: StrategyKind,
    pub max_age_ms: u64,
}

impl RuleSpec {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        strategy: StrategyKind,
        max_age_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            strategy,
            max_age_ms,
        }
    }
}

/// The rule table shipped with the worker: images, API calls, static assets,
/// pages. Declared order is match order.
pub fn default_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new(
            "images",
            r"\.(?:png|jpg|jpeg|svg|gif|webp|ico)$",
            StrategyKind::CacheFirst,
            30 * 24 * 60 * 60 * 1000,
        ),
        RuleSpec::new("api", r"/api/", StrategyKind::NetworkFirst, 5 * 60 * 1000),
        RuleSpec::new(
            "static-assets",
            r"\.(?:js|css|woff2?|ttf)$",
            StrategyKind::StaleWhileRevalidate,
            7 * 24 * 60 * 60 * 1000,
        ),
        RuleSpec::new(
            "pages",
            r"(?:/$|\.html$)",
            StrategyKind::NetworkFirst,
            24 * 60 * 60 * 1000,
        ),
    ]
}

struct StrategyRule {
    name: String,
    pattern: Regex,
    strategy: StrategyKind,
    max_age: Duration,
}

/// Outcome of strategy selection for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Name of the matched rule, or `"default"`.
    pub rule: String,
    pub strategy: StrategyKind,
    pub max_age: Duration,
}

pub struct Selector {
    rules: Vec<StrategyRule>,
}

impl Selector {
    /// Compile an ordered rule list. Fails on the first invalid pattern.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self, regex::Error> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            rules.push(StrategyRule {
                name: spec.name.clone(),
                pattern: Regex::new(&spec.pattern)?,
                strategy: spec.strategy,
                max_age: Duration::from_millis(spec.max_age_ms),
            });
        }
        Ok(Self { rules })
    }

    /// First-match-wins selection over the URL path and the full URL string,
    /// so rules can target both extensionless paths and query-qualified
    /// routes.
    pub fn select(&self, url: &Url) -> Decision {
        for rule in &self.rules {
            if rule.pattern.is_match(url.path()) || rule.pattern.is_match(url.as_str()) {
                return Decision {
                    rule: rule.name.clone(),
                    strategy: rule.strategy,
                    max_age: rule.max_age,
                };
            }
        }
        Decision {
            rule: DEFAULT_RULE_NAME.to_string(),
            strategy: StrategyKind::NetworkFirst,
            max_age: Duration::from_millis(DEFAULT_MAX_AGE_MS),
        }
    }
}
