use crate::report_source::CacheKey;

const STAGING_MARKER: &str = "__staging_";

/// Physical names of one generation of a key's tables
///
/// The live set uses `<key>` and `<prefix>_<key>`; a staging set appends
/// `__staging_<token>` to every name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSet {
    key: CacheKey,
    suffix: String,
}

impl TableSet {
    pub fn live(key: CacheKey) -> Self {
        Self {
            key,
            suffix: String::new(),
        }
    }

    /// Fresh staging names, unique per call
    pub fn staging(key: CacheKey) -> Self {
        let token = uuid::Uuid::new_v4().simple().to_string();
        Self {
            key,
            suffix: format!("{}{}", STAGING_MARKER, &token[..12]),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_staging(&self) -> bool {
        !self.suffix.is_empty()
    }

    /// The materialized edge-list
    pub fn base(&self) -> String {
        format!("{}{}", self.key, self.suffix)
    }

    pub fn derived(&self, prefix: &str) -> String {
        format!("{}_{}{}", prefix, self.key, self.suffix)
    }

    /// Base table first, then derived tables in `prefixes` order
    pub fn all(&self, prefixes: &[&str]) -> Vec<String> {
        let mut names = vec![self.base()];
        names.extend(prefixes.iter().map(|p| self.derived(p)));
        names
    }

    /// `(staging, live)` pairs for publishing this set
    pub fn publish_pairs(&self, prefixes: &[&str]) -> Vec<(String, String)> {
        let live = TableSet::live(self.key.clone());
        self.all(prefixes).into_iter().zip(live.all(prefixes)).collect()
    }
}
