//! Host blacklist.
//!
//! # Responsibilities
//! - Parse the blacklist file (one `host` or `host:port` per line)
//! - Match a target host exactly or as a subdomain of an entry
//! - Publish reloaded lists as whole snapshots
//!
//! # Design Decisions
//! - Hosts are matched case-insensitively, trailing dots ignored
//! - An entry without a port blocks every port of that host
//! - Readers take one snapshot per check; reloads never mutate a snapshot

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::observability::metrics;

/// An immutable set of blocked hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    entries: HashSet<(String, Option<u16>)>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries such as `example.com` or `example.com:8080`.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for entry in entries {
            match parse_entry(entry.as_ref()) {
                Some(parsed) => {
                    list.entries.insert(parsed);
                }
                None => tracing::warn!(entry = entry.as_ref(), "Ignoring invalid blacklist entry"),
            }
        }
        list
    }

    /// Parse blacklist file contents. `#` starts a comment.
    pub fn parse(text: &str) -> Self {
        Self::from_entries(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or("").trim())
                .filter(|line| !line.is_empty()),
        )
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// True if `host` or one of its parent domains is listed for `port`.
    pub fn contains(&self, host: &str, port: u16) -> bool {
        let host = normalize_host(host);
        let mut candidate = host.as_str();
        loop {
            if self.entries.contains(&(candidate.to_string(), None))
                || self.entries.contains(&(candidate.to_string(), Some(port)))
            {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if !parent.is_empty() => candidate = parent,
                _ => return false,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The blacklist currently in force, replaceable while workers read it.
#[derive(Debug)]
pub struct SharedBlacklist {
    current: ArcSwap<Blacklist>,
}

impl SharedBlacklist {
    pub fn new(list: Blacklist) -> Self {
        metrics::record_blacklist_size(list.len());
        Self {
            current: ArcSwap::from_pointee(list),
        }
    }

    /// The snapshot a cycle should use for all of its checks.
    pub fn snapshot(&self) -> Arc<Blacklist> {
        self.current.load_full()
    }

    pub fn replace(&self, list: Blacklist) {
        metrics::record_blacklist_size(list.len());
        self.current.store(Arc::new(list));
    }

    /// Re-read `path` and publish it. The current list stays on failure.
    pub fn reload(&self, path: &Path) -> std::io::Result<()> {
        let list = Blacklist::load(path)?;
        tracing::info!(path = ?path, entries = list.len(), "Blacklist reloaded");
        self.replace(list);
        Ok(())
    }
}

impl Default for SharedBlacklist {
    fn default() -> Self {
        Self::new(Blacklist::new())
    }
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn parse_entry(entry: &str) -> Option<(String, Option<u16>)> {
    let entry = entry.trim();
    let (host, port) = if let Some(rest) = entry.strip_prefix('[') {
        // [v6] or [v6]:port
        let (host, after) = rest.split_once(']')?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(port.parse().ok()?),
            None if after.is_empty() => None,
            None => return None,
        };
        (host, port)
    } else {
        match entry.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => (host, Some(port.parse().ok()?)),
            _ => (entry, None),
        }
    };

    let host = normalize_host(host);
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some((host, port))
}
