//! Origin allowlist
//!
//! The ordered set of `host[:port]` origins this layer treats as its own.
//! Loaded once and shared read-only for the lifetime of the process.

use crate::error::ConfigError;
use std::sync::Arc;

/// Origins compiled into the layer. Order matters: the first entry whose
/// insecure form occurs in a URL wins.
pub const DEFAULT_ORIGINS: &[&str] = &[
    "app.worksledger.io",
    "api.worksledger.io",
    "db.worksledger.io",
    "localhost:3000",
];

/// A single allowlisted origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistEntry {
    origin: String,
    insecure: String,
    secure: String,
}

impl AllowlistEntry {
    fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            insecure: format!("http://{}", origin),
            secure: format!("https://{}", origin),
        }
    }

    /// The bare `host[:port]`
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `http://` + origin
    pub fn insecure_prefix(&self) -> &str {
        &self.insecure
    }

    /// `https://` + origin
    pub fn secure_prefix(&self) -> &str {
        &self.secure
    }
}

/// Immutable, ordered list of allowlisted origins
#[derive(Debug, Clone)]
pub struct OriginAllowlist {
    entries: Arc<[AllowlistEntry]>,
}

impl OriginAllowlist {
    /// Build an allowlist, rejecting entries that are empty or carry a
    /// scheme or path.
    pub fn new<I, S>(origins: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        for (index, origin) in origins.into_iter().enumerate() {
            let origin = origin.as_ref().trim();
            if origin.is_empty() {
                return Err(ConfigError::EmptyOrigin { index });
            }
            if origin.contains("://") || origin.contains('/') {
                return Err(ConfigError::MalformedOrigin {
                    entry: origin.to_string(),
                });
            }
            entries.push(AllowlistEntry::new(origin));
        }

        Ok(Self {
            entries: entries.into(),
        })
    }

    /// The compiled-in list
    pub fn builtin() -> Self {
        Self {
            entries: DEFAULT_ORIGINS.iter().map(|o| AllowlistEntry::new(o)).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllowlistEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.entries.iter().any(|e| e.origin == origin)
    }
}

impl Default for OriginAllowlist {
    fn default() -> Self {
        Self::builtin()
    }
}
