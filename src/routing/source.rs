//! The interface between the gateway and whatever decides where traffic goes.
//!
//! # Responsibilities
//! - `RoutingSource`: a loaded, immutable rule set that maps a URL to an
//!   ordered candidate list
//! - `SourceLoader`: (re)loads a rule set from its configured origin
//! - `Origin`: a local path or a remote `http(s)://` location

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::upstream::{Candidate, ProxySpecError};

/// A resolved rule source.
pub trait RoutingSource: Send + Sync + fmt::Debug {
    /// Identity used to decide whether a reload changed anything.
    fn fingerprint(&self) -> &str;

    /// Returns the candidates for `url`, most preferred first.
    fn find_proxy(&self, url: &str) -> Result<Vec<Candidate>, ResolveError>;
}

/// Shared handle to the active rule source.
pub type SharedSource = Arc<dyn RoutingSource>;

/// Loads a rule source from its origin.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Where sources come from, for logging.
    fn origin(&self) -> &Origin;

    async fn load(&self) -> Result<SharedSource, LoadError>;
}

/// The rule engine could not produce candidates for a URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("url `{0}` has no host")]
    MissingHost(String),
}

/// Fetching or parsing a rule source failed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fetch {url}: {source}")]
    Fetch {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetch {url}: server returned {status}")]
    Status { url: Url, status: reqwest::StatusCode },
    #[error("parse rules: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rule {index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: ProxySpecError,
    },
    #[error("default: {0}")]
    Default(#[source] ProxySpecError),
}

/// Where a rule source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local(PathBuf),
    Remote(Url),
}

impl Origin {
    /// Treats `http://` and `https://` locations as remote, anything else as a path.
    pub fn parse(location: &str) -> Self {
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Origin::Remote(url),
            _ => Origin::Local(PathBuf::from(location)),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local(path) => write!(f, "{}", path.display()),
            Origin::Remote(url) => write!(f, "{url}"),
        }
    }
}
