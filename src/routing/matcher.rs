//! Rule matching logic.
//!
//! # Responsibilities
//! - Match the target host against shell-expression globs (case-insensitive)
//! - Match the full target URL against shell-expression globs
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Globs support `*` (any run, including empty) and `?` (one character),
//!   the same subset PAC's `shExpMatch` offers
//! - No regex, matching is linear in practice

/// The parts of a request target rules can look at.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// The URL exactly as handed to the rule source.
    pub url: &'a str,
    /// Lowercased host, without port.
    pub host: &'a str,
}

/// Trait for matching targets against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the target matches this condition.
    fn matches(&self, target: &Target<'_>) -> bool;
}

/// Matches the target host against any of a set of globs.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    patterns: Vec<String>,
}

impl HostMatcher {
    /// Patterns are normalized to lowercase for case-insensitive matching.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, target: &Target<'_>) -> bool {
        self.patterns.iter().any(|p| glob_match(p, target.host))
    }
}

/// Matches the full URL against any of a set of globs.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    patterns: Vec<String>,
}

impl UrlMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Matcher for UrlMatcher {
    fn matches(&self, target: &Target<'_>) -> bool {
        self.patterns.iter().any(|p| glob_match(p, target.url))
    }
}

/// Combines multiple matchers with AND semantics. Empty never matches.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, target: &Target<'_>) -> bool {
        !self.matchers.is_empty() && self.matchers.iter().all(|m| m.matches(target))
    }
}

/// Shell-expression match of `text` against `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` and the text index it was tried against.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
