//! Permitted-peer matching (spec.md §4.5: a TLS target may restrict
//! which peer certificate subjects it will accept, independent of
//! whatever root CA signed them).

/// A glob-style permitted-peer list. `*` matches any run of characters,
/// mirroring the legacy `PermittedPeer` wildcard syntax.
#[derive(Debug, Clone, Default)]
pub struct PermittedPeers {
    patterns: Vec<String>,
}

impl PermittedPeers {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// An empty list permits any peer (spec.md §4.5: the permitted-peer
    /// check only activates once at least one entry is configured).
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn permits(&self, subject: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns.iter().any(|p| glob_match(p, subject))
    }
}

fn glob_match(pattern: &str, subject: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == subject,
        Some((prefix, suffix)) => {
            subject.len() >= prefix.len() + suffix.len()
                && subject.starts_with(prefix)
                && subject.ends_with(suffix)
        }
    }
}
