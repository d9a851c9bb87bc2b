//! Exact-match library name redirection.

use std::collections::BTreeMap;

/// Built-in redirections.
///
/// The plugin may ask for the non-public graphics core; the public client
/// library exports the same functionality.
pub const BUILTIN_REDIRECTS: &[(&str, &str)] =
    &[("libiGraphicsCore.huawei.so", "libigs_client.so")];

/// Maps a requested library name to the name actually opened.
#[derive(Debug, Clone)]
pub struct NameRedirector {
    table: BTreeMap<String, String>,
}

impl NameRedirector {
    /// Redirector holding only [`BUILTIN_REDIRECTS`].
    pub fn builtin() -> Self {
        let table = BUILTIN_REDIRECTS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        Self { table }
    }

    /// Redirector with no entries; every name maps to itself.
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Add or replace one exact-match entry.
    pub fn with_entry(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.table.insert(from.into(), to.into());
        self
    }

    /// Add every entry of `entries`.
    pub fn with_entries<'a, I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (from, to) in entries {
            self.table.insert(from.clone(), to.clone());
        }
        self
    }

    /// Resolve `requested` to the name to open.
    pub fn redirect<'a>(&'a self, requested: &'a str) -> &'a str {
        match self.table.get(requested) {
            Some(actual) => {
                tracing::info!("Redirecting {} -> {}", requested, actual);
                actual
            }
            None => requested,
        }
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for NameRedirector {
    fn default() -> Self {
        Self::builtin()
    }
}
