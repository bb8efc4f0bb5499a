//! Rewrite engine
//!
//! Decides whether a URL must be moved from `http://` to `https://` for one
//! of the allowlisted origins. The decision is a literal substring
//! replacement, not a structural URL parse: the first allowlisted
//! `http://host[:port]` occurrence anywhere in the URL is corrected, even
//! when it sits inside a query parameter or fragment.

use crate::allowlist::{AllowlistEntry, OriginAllowlist};

/// Outcome of checking a URL against the allowlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteDecision {
    NoChange,
    /// Corrected absolute URL
    Rewritten(String),
}

impl RewriteDecision {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, RewriteDecision::Rewritten(_))
    }

    /// The URL to dispatch: the corrected one, or `original` untouched
    pub fn apply<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            RewriteDecision::NoChange => original,
            RewriteDecision::Rewritten(url) => url,
        }
    }
}

/// Scheme of a URL judged by its literal prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Insecure,
    Secure,
    Other,
}

impl Scheme {
    pub fn of(url: &str) -> Self {
        if url.starts_with("https://") {
            Scheme::Secure
        } else if url.starts_with("http://") {
            Scheme::Insecure
        } else {
            Scheme::Other
        }
    }
}

/// Check `url` against `allowlist` in order; first match wins.
pub fn decide(url: &str, allowlist: &OriginAllowlist) -> RewriteDecision {
    match matching_entry(url, allowlist) {
        Some((_, corrected)) => RewriteDecision::Rewritten(corrected),
        None => RewriteDecision::NoChange,
    }
}

/// Like [`decide`], also reporting which entry matched
pub fn matching_entry<'a>(
    url: &str,
    allowlist: &'a OriginAllowlist,
) -> Option<(&'a AllowlistEntry, String)> {
    allowlist
        .iter()
        .find(|entry| url.contains(entry.insecure_prefix()))
        .map(|entry| {
            let corrected = url.replacen(entry.insecure_prefix(), entry.secure_prefix(), 1);
            (entry, corrected)
        })
}
