//! The shipped rule engine: a TOML rule document mapping targets to
//! PAC-style proxy lists.
//!
//! ```toml
//! default = "DIRECT"
//!
//! [[rules]]
//! hosts = ["*.corp.example.com", "intranet"]
//! proxy = "PROXY proxy.corp:3128; DIRECT"
//!
//! [[rules]]
//! urls = ["http://*.example.org/*"]
//! proxy = "SOCKS5 127.0.0.1:1080"
//! ```
//!
//! Rules are checked in document order and the first match wins. A rule
//! with both `hosts` and `urls` needs both to match; a rule with neither
//! never matches. Unmatched targets use `default`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, Target, UrlMatcher};
use crate::routing::source::{LoadError, Origin, ResolveError, RoutingSource, SharedSource, SourceLoader};
use crate::upstream::{parse_proxy_list, Candidate};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    #[serde(default = "default_route")]
    default: String,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    #[serde(default)]
    hosts: Vec<String>,
    #[serde(default)]
    urls: Vec<String>,
    proxy: String,
}

fn default_route() -> String {
    "DIRECT".to_string()
}

#[derive(Debug)]
struct CompiledRule {
    matcher: AndMatcher,
    candidates: Vec<Candidate>,
}

/// A parsed rule document.
#[derive(Debug)]
pub struct RuleSet {
    source: String,
    rules: Vec<CompiledRule>,
    default: Vec<Candidate>,
}

impl RuleSet {
    /// Parses and compiles a rule document. Every proxy list is validated up
    /// front so a bad edit fails the load rather than individual requests.
    pub fn parse(source: impl Into<String>) -> Result<Self, LoadError> {
        let source = source.into();
        let document: RuleDocument = toml::from_str(&source)?;

        let default = parse_proxy_list(&document.default).map_err(LoadError::Default)?;

        let rules = document
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let candidates = parse_proxy_list(&entry.proxy)
                    .map_err(|source| LoadError::Rule { index, source })?;
                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                if !entry.hosts.is_empty() {
                    matchers.push(Box::new(HostMatcher::new(&entry.hosts)));
                }
                if !entry.urls.is_empty() {
                    matchers.push(Box::new(UrlMatcher::new(entry.urls)));
                }
                Ok(CompiledRule {
                    matcher: AndMatcher::new(matchers),
                    candidates,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(Self {
            source,
            rules,
            default,
        })
    }

    /// Number of rules, excluding the default.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RoutingSource for RuleSet {
    fn fingerprint(&self) -> &str {
        &self.source
    }

    fn find_proxy(&self, url: &str) -> Result<Vec<Candidate>, ResolveError> {
        let parsed = Url::parse(url).map_err(|e| ResolveError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ResolveError::MissingHost(url.to_string()))?
            .to_ascii_lowercase();

        let target = Target { url, host: &host };
        let candidates = self
            .rules
            .iter()
            .find(|rule| rule.matcher.matches(&target))
            .map(|rule| &rule.candidates)
            .unwrap_or(&self.default);

        Ok(candidates.clone())
    }
}

/// Loads [`RuleSet`]s from a file or an `http(s)` URL.
#[derive(Debug, Clone)]
pub struct RuleLoader {
    origin: Origin,
}

impl RuleLoader {
    pub fn new(origin: Origin) -> Self {
        Self { origin }
    }

    async fn fetch(&self) -> Result<String, LoadError> {
        match &self.origin {
            Origin::Local(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                }),
            Origin::Remote(url) => {
                let fetch_err = |source| LoadError::Fetch {
                    url: url.clone(),
                    source,
                };
                // The rules must never be fetched through a proxy picked by the
                // environment, which may well be this gateway.
                let client = reqwest::Client::builder()
                    .no_proxy()
                    .timeout(FETCH_TIMEOUT)
                    .build()
                    .map_err(fetch_err)?;
                let response = client.get(url.clone()).send().await.map_err(fetch_err)?;
                if !response.status().is_success() {
                    return Err(LoadError::Status {
                        url: url.clone(),
                        status: response.status(),
                    });
                }
                response.text().await.map_err(fetch_err)
            }
        }
    }
}

#[async_trait]
impl SourceLoader for RuleLoader {
    fn origin(&self) -> &Origin {
        &self.origin
    }

    async fn load(&self) -> Result<SharedSource, LoadError> {
        let text = self.fetch().await?;
        let rules = RuleSet::parse(text)?;
        tracing::debug!(origin = %self.origin, rules = rules.len(), "Rule source parsed");
        Ok(Arc::new(rules))
    }
}
